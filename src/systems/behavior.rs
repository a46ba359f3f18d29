use anyhow::Result;

use crate::{
    agent::Lifecycle,
    engine::{Phase, System, SystemContext},
    rng::SystemRng,
    world::World,
};

/// Moves every agent and removes the ones whose lifetime ran out.
pub struct BehaviorSystem;

impl BehaviorSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BehaviorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BehaviorSystem {
    fn name(&self) -> &str {
        "behavior"
    }

    fn phase(&self) -> Phase {
        Phase::Behavior
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let bounds = world.wander_bounds();
        let mut expired = Vec::new();
        for (id, agent) in world.agents_mut().iter_mut() {
            if agent.update(ctx.dt_secs, &bounds, rng) == Lifecycle::Expired {
                expired.push(id);
            }
        }
        for id in expired {
            if world.agents_mut().remove(id)? {
                world.counters_mut().expired += 1;
            }
        }
        Ok(())
    }
}
