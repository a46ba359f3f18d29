use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use gridpop::{
    engine::{EngineBuilder, EngineSettings},
    rng::RngManager,
    scenario::ScenarioLoader,
    systems,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Bounded spatial population runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/swarm_box.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override snapshot interval in ticks
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Populate every grid cell with one agent before the first tick
    #[arg(long)]
    seed_cells: bool,

    /// Log filter, e.g. `debug` or `gridpop=trace` (RUST_LOG wins when set)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let loader = ScenarioLoader::new(".");
    let mut scenario = loader.load(&cli.scenario)?;
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }
    let mut world = scenario.build_world()?;
    let ticks = scenario.ticks(cli.ticks);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_ticks);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    if cli.seed_cells {
        let mut rng = RngManager::new(scenario.seed);
        let seeded = world.seed_every_cell(&mut rng.stream("seed_cells"))?;
        info!("seeded {seeded} agents across the grid");
    }

    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        snapshot_interval_ticks: snapshot_interval,
        snapshot_dir,
    };
    let mut engine = systems::install_defaults(EngineBuilder::new(settings)).build();

    let mut spawned = 0;
    let mut expired = 0;
    let mut evicted = 0;
    engine.run_with_hook(&mut world, ticks, |summary| {
        spawned += summary.counters.spawned;
        expired += summary.counters.expired;
        evicted += summary.counters.evicted;
    })?;
    println!(
        "Scenario '{}' completed for {} ticks. Final population: {} (spawned {}, expired {}, evicted {})",
        scenario.name,
        ticks,
        world.population(),
        spawned,
        expired,
        evicted
    );
    Ok(())
}
