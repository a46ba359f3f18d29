mod behavior;
mod command;
mod resync;
mod spawn;
mod trim;

pub use behavior::BehaviorSystem;
pub use command::CommandSystem;
pub use resync::ResyncSystem;
pub use spawn::SpawnSystem;
pub use trim::TrimSystem;

use crate::engine::EngineBuilder;

/// Registers the standard set of population systems.
pub fn install_defaults(builder: EngineBuilder) -> EngineBuilder {
    builder
        .with_system(CommandSystem::new())
        .with_system(SpawnSystem::new())
        .with_system(BehaviorSystem::new())
        .with_system(ResyncSystem::new())
        .with_system(TrimSystem::new())
}
