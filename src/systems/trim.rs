use anyhow::Result;
use log::debug;

use crate::{
    engine::{Phase, System, SystemContext},
    rng::SystemRng,
    world::World,
};

/// Evicts the oldest agents while the population exceeds its bound.
pub struct TrimSystem;

impl TrimSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TrimSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for TrimSystem {
    fn name(&self) -> &str {
        "trim"
    }

    fn phase(&self) -> Phase {
        Phase::Maintenance
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let evicted = world.agents_mut().trim_to_capacity()?;
        if !evicted.is_empty() {
            debug!("tick {}: trimmed {} agents", ctx.tick, evicted.len());
        }
        world.counters_mut().evicted += evicted.len();
        if cfg!(debug_assertions) {
            world.agents().check_consistency()?;
        }
        Ok(())
    }
}
