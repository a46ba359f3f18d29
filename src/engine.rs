use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    rng::{RngManager, SystemRng},
    snapshot::SnapshotWriter,
    world::{TickCounters, World},
};

/// Ordered stages of a tick. Systems run grouped by phase, in registration
/// order within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Driver commands and spawning.
    Admission,
    /// Per-entity movement and expiry.
    Behavior,
    /// Grid membership catches up with movement.
    Resync,
    /// Capacity enforcement against the tick's final population.
    Maintenance,
}

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: PathBuf,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    pub fn build(mut self) -> Engine {
        self.systems.sort_by_key(|system| system.phase());
        Engine {
            rng: RngManager::new(self.settings.seed),
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_ticks,
            ),
            settings: self.settings,
        }
    }
}

pub struct Engine {
    rng: RngManager,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    /// Names of the registered systems in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    pub fn tick(&mut self, world: &mut World) -> Result<TickSummary> {
        let current_tick = world.tick();
        world.take_counters();
        let mut system_reports = Vec::with_capacity(self.systems.len());
        for system in &mut self.systems {
            let start = Instant::now();
            let mut rng_stream = self.rng.stream(system.name());
            let ctx = SystemContext {
                tick: current_tick,
                dt_secs: world.dt_secs(),
                scenario_name: &self.settings.scenario_name,
            };
            system
                .run(&ctx, world, &mut rng_stream)
                .with_context(|| format!("system '{}' failed at tick {current_tick}", system.name()))?;
            system_reports.push(SystemRunReport {
                name: system.name().to_string(),
                phase: system.phase(),
                duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
            });
        }
        world.advance_time();
        let counters = world.take_counters();
        let snapshot_path = self
            .snapshot_writer
            .maybe_write(world, &self.settings.scenario_name)?;

        let summary = TickSummary {
            tick: world.tick(),
            population: world.population(),
            counters,
            system_reports,
            snapshot_path,
        };
        debug!(
            "tick {} population {} {:?}",
            summary.tick, summary.population, summary.counters
        );
        Ok(summary)
    }

    pub fn run(&mut self, world: &mut World, ticks: u64) -> Result<()> {
        self.run_with_hook(world, ticks, |_| {})
    }

    pub fn run_with_hook<F>(&mut self, world: &mut World, ticks: u64, mut hook: F) -> Result<()>
    where
        F: FnMut(&TickSummary),
    {
        info!(
            "running '{}' for {ticks} ticks with systems {:?}",
            self.settings.scenario_name,
            self.system_names()
        );
        for _ in 0..ticks {
            let summary = self.tick(world)?;
            hook(&summary);
        }
        info!(
            "'{}' finished at tick {} with {} agents",
            self.settings.scenario_name,
            world.tick(),
            world.population()
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SystemRunReport {
    pub name: String,
    pub phase: Phase,
    pub duration_ms: f64,
}

#[derive(Clone, Debug)]
pub struct TickSummary {
    pub tick: u64,
    pub population: usize,
    pub counters: TickCounters,
    pub system_reports: Vec<SystemRunReport>,
    pub snapshot_path: Option<PathBuf>,
}

pub struct SystemContext<'a> {
    pub tick: u64,
    pub dt_secs: f32,
    pub scenario_name: &'a str,
}

pub trait System {
    fn name(&self) -> &str;
    fn phase(&self) -> Phase;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}
