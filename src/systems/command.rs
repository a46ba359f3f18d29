use anyhow::Result;
use log::info;

use crate::{
    engine::{Phase, System, SystemContext},
    rng::SystemRng,
    world::{Command, World},
};

use super::spawn::admit;

/// Applies the commands queued on the world since the previous tick.
pub struct CommandSystem;

impl CommandSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommandSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for CommandSystem {
    fn name(&self) -> &str {
        "command"
    }

    fn phase(&self) -> Phase {
        Phase::Admission
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        for command in world.drain_commands() {
            match command {
                Command::Generate(request) => admit(world, request, rng)?,
                Command::RemoveAll => {
                    let removed = world.agents_mut().remove_all()?;
                    world.counters_mut().removed += removed;
                    info!("tick {}: removed all {removed} agents", ctx.tick);
                }
                Command::SetMaxCount(max_count) => {
                    world.agents_mut().set_max_count(max_count);
                    info!("tick {}: max count set to {max_count}", ctx.tick);
                }
            }
        }
        Ok(())
    }
}
