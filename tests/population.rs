use glam::Vec3;
use gridpop::{
    agent::{Agent, AgentTemplate},
    engine::{Engine, EngineBuilder, EngineSettings},
    generate::{Generator, ParamSpec, ParamTable, SpawnRequest},
    manager::{ObjectManager, Resync},
    pool::AdmissionPolicy,
    scenario::Scenario,
    spatial::{Divisions, GridCoord, SpatialGrid},
    systems::{self, BehaviorSystem, CommandSystem, ResyncSystem, SpawnSystem, TrimSystem},
    world::{Command, World},
    Placeable, Transform,
};

const LONG_LIVED: &str = r#"
name: long_lived
seed: 5
dt_secs: 0.1
population:
  max_count: 10
  spawn_per_tick: 4
grid:
  origin: [0.0, 0.0, 0.0]
  extent: [10.0, 10.0, 10.0]
  divisions: [2, 2, 2]
templates:
  - name: cube
params:
  move_speed: { value: 4.0, randomness: 0.5 }
  lifetime_secs: { value: 1000.0 }
"#;

fn engine(seed: u64) -> Engine {
    let settings = EngineSettings {
        scenario_name: "population".into(),
        seed,
        snapshot_interval_ticks: 0,
        snapshot_dir: std::path::PathBuf::from("snapshots_population_tests"),
    };
    systems::install_defaults(EngineBuilder::new(settings)).build()
}

fn long_lived_world() -> World {
    Scenario::from_yaml(LONG_LIVED).unwrap().build_world().unwrap()
}

fn assert_grid_tracks_positions(world: &World) {
    let agents = world.agents();
    agents.check_consistency().unwrap();
    let grid = agents.grid().unwrap();
    for (id, agent) in agents.iter() {
        assert_eq!(agents.coord_of(id), Some(grid.locate(agent.position())));
    }
}

#[test]
fn population_never_exceeds_bound() {
    let mut world = long_lived_world();
    let mut engine = engine(5);
    for _ in 0..30 {
        let summary = engine.tick(&mut world).unwrap();
        assert!(summary.population <= 10);
        assert_grid_tracks_positions(&world);
    }
    assert_eq!(world.population(), 10);
}

#[test]
fn shrinking_bound_trims_oldest_next_tick() {
    let mut world = long_lived_world();
    let mut engine = engine(5);
    engine.run(&mut world, 3).unwrap();
    assert_eq!(world.population(), 10);
    let survivors = world.agents().members()[7..].to_vec();

    world.push_command(Command::SetMaxCount(3));
    assert_eq!(world.population(), 10);
    let summary = engine.tick(&mut world).unwrap();

    assert_eq!(summary.counters.evicted, 7);
    assert_eq!(world.population(), 3);
    assert_eq!(world.agents().members(), survivors.as_slice());
    assert_grid_tracks_positions(&world);
}

#[test]
fn remove_all_then_refill() {
    let mut world = long_lived_world();
    let mut engine = engine(5);
    engine.run(&mut world, 2).unwrap();
    assert_eq!(world.population(), 8);

    world.push_command(Command::RemoveAll);
    world.push_command(Command::Generate(SpawnRequest::new().position(Vec3::splat(9.0))));
    let summary = engine.tick(&mut world).unwrap();
    assert_eq!(summary.counters.removed, 8);
    assert_eq!(summary.counters.spawned, 5);
    assert_eq!(world.population(), 5);
    assert_grid_tracks_positions(&world);
}

#[test]
fn expired_agents_leave_pool_and_grid() {
    let yaml = LONG_LIVED.replace("value: 1000.0", "value: 0.5");
    let mut world = Scenario::from_yaml(&yaml).unwrap().build_world().unwrap();
    world.set_spawn_per_tick(0);
    for i in 0..4 {
        world.push_command(Command::Generate(SpawnRequest::new().position(Vec3::splat(i as f32 * 2.0))));
    }
    let mut engine = engine(1);
    let first = engine.tick(&mut world).unwrap();
    assert_eq!(first.counters.spawned, 4);

    let mut expired = 0;
    engine
        .run_with_hook(&mut world, 10, |summary| expired += summary.counters.expired)
        .unwrap();
    assert_eq!(expired, 4);
    assert!(world.agents().is_empty());
    assert!(world.agents().grid().unwrap().is_empty());
}

#[test]
fn evict_oldest_admission_keeps_newest() {
    let yaml = LONG_LIVED.replace("spawn_per_tick: 4", "spawn_per_tick: 0\n  on_full: evict_oldest");
    let mut world = Scenario::from_yaml(&yaml).unwrap().build_world().unwrap();
    world.agents_mut().set_max_count(2);
    let mut engine = engine(2);
    for x in [1.0, 4.0, 8.0] {
        world.push_command(Command::Generate(SpawnRequest::new().position(Vec3::new(x, 1.0, 1.0))));
    }
    let summary = engine.tick(&mut world).unwrap();
    assert_eq!(summary.counters.spawned, 3);
    assert_eq!(summary.counters.evicted, 1);
    assert_eq!(world.population(), 2);
    let starts: Vec<f32> = world
        .snapshot("evict")
        .agents
        .iter()
        .map(|agent| agent.position.x)
        .collect();
    // Oldest first; both survivors started at x = 4 and x = 8 and moved at most 0.6.
    assert!((starts[0] - 4.0).abs() < 1.0);
    assert!((starts[1] - 8.0).abs() < 1.0);
}

#[test]
fn phases_order_systems_regardless_of_registration() {
    let settings = EngineSettings {
        scenario_name: "order".into(),
        seed: 0,
        snapshot_interval_ticks: 0,
        snapshot_dir: std::path::PathBuf::from("snapshots_order_tests"),
    };
    let engine = EngineBuilder::new(settings)
        .with_system(TrimSystem::new())
        .with_system(ResyncSystem::new())
        .with_system(BehaviorSystem::new())
        .with_system(SpawnSystem::new())
        .with_system(CommandSystem::new())
        .build();
    assert_eq!(
        engine.system_names(),
        vec!["spawn", "command", "behavior", "resync", "trim"]
    );
}

#[test]
fn end_to_end_grid_relocation() {
    let grid = SpatialGrid::new(Vec3::ZERO, Vec3::splat(10.0), Divisions::new(2, 2, 2)).unwrap();
    let mut manager: ObjectManager<Agent> = ObjectManager::with_grid(4, AdmissionPolicy::Reject, grid);
    let params = ParamTable::new().with("lifetime_secs", ParamSpec::fixed(60.0));
    let generator = Generator::new(vec![AgentTemplate::new("cube")], params).unwrap();
    let mut rng = <rand_chacha::ChaCha8Rng as rand::SeedableRng>::seed_from_u64(0);

    let id = generator
        .generate(&mut manager, SpawnRequest::new().position(Vec3::ONE), &mut rng)
        .unwrap();
    assert_eq!(manager.coord_of(id), Some(GridCoord::new(0, 0, 0)));

    manager.get_mut(id).unwrap().set_position(Vec3::splat(9.0));
    assert_eq!(
        manager.resync(id).unwrap(),
        Resync::Moved {
            from: GridCoord::new(0, 0, 0),
            to: GridCoord::new(1, 1, 1)
        }
    );
    assert!(manager.objects_in(GridCoord::new(0, 0, 0)).unwrap().is_empty());
    assert_eq!(manager.objects_in(GridCoord::new(1, 1, 1)).unwrap(), &[id]);
    assert_eq!(manager.get(id).unwrap().transform().scale, Transform::IDENTITY.scale);
}
