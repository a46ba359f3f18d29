use anyhow::Result;
use log::{debug, warn};
use rand::Rng;

use crate::{
    engine::{Phase, System, SystemContext},
    error::ManagerError,
    generate::SpawnRequest,
    rng::SystemRng,
    world::World,
};

/// Generates through the world and books the outcome in the tick counters.
/// Recoverable refusals are counted, defects propagate.
pub(crate) fn admit<R: Rng + ?Sized>(world: &mut World, request: SpawnRequest, rng: &mut R) -> Result<()> {
    let before = world.population();
    match world.generate(request, rng) {
        Ok(id) => {
            let evicted = (before + 1).saturating_sub(world.population());
            let counters = world.counters_mut();
            counters.spawned += 1;
            counters.evicted += evicted;
            debug!("spawned {id}");
        }
        Err(err @ ManagerError::CapacityExceeded { .. }) => {
            debug!("spawn rejected: {err}");
            world.counters_mut().rejected += 1;
        }
        Err(err) if err.is_recoverable() => {
            warn!("spawn rejected: {err}");
            world.counters_mut().rejected += 1;
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

/// Spawns `spawn_per_tick` agents at random positions each tick.
pub struct SpawnSystem;

impl SpawnSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpawnSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for SpawnSystem {
    fn name(&self) -> &str {
        "spawn"
    }

    fn phase(&self) -> Phase {
        Phase::Admission
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        for _ in 0..world.spawn_per_tick() {
            let position = match world.agents().grid() {
                Some(grid) => grid.random_position(rng),
                None => world.wander_bounds().sample(rng),
            };
            admit(world, SpawnRequest::new().position(position), rng)?;
        }
        Ok(())
    }
}
