pub mod agent;
pub mod engine;
pub mod entity;
pub mod error;
pub mod generate;
pub mod manager;
pub mod pool;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod spatial;
pub mod systems;
pub mod world;

pub use engine::{Engine, EngineBuilder, EngineSettings, Phase, TickSummary};
pub use entity::{EntityId, Placeable, Transform};
pub use error::ManagerError;
pub use manager::ObjectManager;
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{Command, World};
