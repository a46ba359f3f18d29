use anyhow::Result;

use crate::{
    engine::{Phase, System, SystemContext},
    rng::SystemRng,
    world::World,
};

/// Moves agents between grid buckets after behavior has moved them.
pub struct ResyncSystem;

impl ResyncSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResyncSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ResyncSystem {
    fn name(&self) -> &str {
        "resync"
    }

    fn phase(&self) -> Phase {
        Phase::Resync
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let moved = world.agents_mut().resync_all()?;
        world.counters_mut().relocated += moved;
        Ok(())
    }
}
