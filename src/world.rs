use std::collections::VecDeque;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentTemplate};
use crate::entity::EntityId;
use crate::error::ManagerError;
use crate::generate::{Generator, SpawnRequest};
use crate::manager::ObjectManager;
use crate::spatial::{Aabb, GridCoord};

/// Half-size of the box agents wander in when the manager has no grid.
const DEFAULT_WANDER_RADIUS: f32 = 8.0;

/// Driver requests, applied at the start of the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Generate(SpawnRequest),
    RemoveAll,
    SetMaxCount(usize),
}

/// What happened to the population during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCounters {
    pub spawned: usize,
    pub rejected: usize,
    pub expired: usize,
    pub removed: usize,
    pub relocated: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub coord: GridCoord,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub template: String,
    pub position: Vec3,
    pub cell: Option<GridCoord>,
    pub age_secs: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub scenario: String,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub population: usize,
    pub max_count: usize,
    pub cells: Vec<CellSnapshot>,
    pub agents: Vec<AgentSnapshot>,
}

pub struct World {
    tick: u64,
    dt_secs: f32,
    elapsed_secs: f64,
    agents: ObjectManager<Agent>,
    generator: Generator<Agent>,
    spawn_per_tick: u32,
    wander_bounds: Aabb,
    commands: VecDeque<Command>,
    counters: TickCounters,
}

impl World {
    pub fn new(agents: ObjectManager<Agent>, generator: Generator<Agent>, dt_secs: f32) -> Self {
        let wander_bounds = match agents.grid() {
            Some(grid) => grid.bounds(),
            None => Aabb::from_min_size(
                Vec3::splat(-DEFAULT_WANDER_RADIUS),
                Vec3::splat(2.0 * DEFAULT_WANDER_RADIUS),
            ),
        };
        Self {
            tick: 0,
            dt_secs,
            elapsed_secs: 0.0,
            agents,
            generator,
            spawn_per_tick: 0,
            wander_bounds,
            commands: VecDeque::new(),
            counters: TickCounters::default(),
        }
    }

    pub fn with_spawn_rate(mut self, spawn_per_tick: u32) -> Self {
        self.spawn_per_tick = spawn_per_tick;
        self
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn dt_secs(&self) -> f32 {
        self.dt_secs
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn advance_time(&mut self) {
        self.tick += 1;
        self.elapsed_secs += f64::from(self.dt_secs);
    }

    pub fn agents(&self) -> &ObjectManager<Agent> {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut ObjectManager<Agent> {
        &mut self.agents
    }

    pub fn generator(&self) -> &Generator<Agent> {
        &self.generator
    }

    pub fn population(&self) -> usize {
        self.agents.len()
    }

    pub fn spawn_per_tick(&self) -> u32 {
        self.spawn_per_tick
    }

    pub fn set_spawn_per_tick(&mut self, spawn_per_tick: u32) {
        self.spawn_per_tick = spawn_per_tick;
    }

    pub fn wander_bounds(&self) -> Aabb {
        self.wander_bounds
    }

    pub fn push_command(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn drain_commands(&mut self) -> Vec<Command> {
        self.commands.drain(..).collect()
    }

    pub fn counters(&self) -> TickCounters {
        self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut TickCounters {
        &mut self.counters
    }

    pub(crate) fn take_counters(&mut self) -> TickCounters {
        std::mem::take(&mut self.counters)
    }

    /// Generates one agent through the world's generator.
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        request: SpawnRequest,
        rng: &mut R,
    ) -> Result<EntityId, ManagerError> {
        self.generator.generate(&mut self.agents, request, rng)
    }

    /// Generates one agent at a random position in every cell of the grid,
    /// stopping early once the population is full.
    pub fn seed_every_cell<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize, ManagerError> {
        let coords: Vec<GridCoord> = match self.agents.grid() {
            Some(grid) => grid.occupancy().map(|(coord, _)| coord).collect(),
            None => return Err(ManagerError::config("manager has no spatial grid")),
        };
        let mut seeded = 0;
        for coord in coords {
            let position = self.agents.random_position_in(coord, rng)?;
            match self.generate(SpawnRequest::new().position(position), rng) {
                Ok(_) => seeded += 1,
                Err(ManagerError::CapacityExceeded { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        log::debug!("seeded {seeded} agents, one per cell");
        Ok(seeded)
    }

    pub fn snapshot(&self, scenario: &str) -> WorldSnapshot {
        let cells = self
            .agents
            .grid()
            .map(|grid| {
                grid.occupancy()
                    .filter(|&(_, count)| count > 0)
                    .map(|(coord, count)| CellSnapshot { coord, count })
                    .collect()
            })
            .unwrap_or_default();
        let templates = self.generator.templates();
        let agents = self
            .agents
            .iter()
            .map(|(id, agent)| AgentSnapshot {
                id: id.to_string(),
                template: templates
                    .get(agent.template())
                    .map(|template: &AgentTemplate| template.name.clone())
                    .unwrap_or_default(),
                position: agent.transform().position,
                cell: self.agents.coord_of(id),
                age_secs: agent.age_secs(),
            })
            .collect();
        WorldSnapshot {
            scenario: scenario.to_string(),
            tick: self.tick,
            elapsed_secs: self.elapsed_secs,
            population: self.agents.len(),
            max_count: self.agents.max_count(),
            cells,
            agents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::ParamTable;
    use crate::pool::AdmissionPolicy;
    use crate::spatial::{Divisions, SpatialGrid};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world(max_count: usize) -> World {
        let grid = SpatialGrid::new(Vec3::ZERO, Vec3::splat(9.0), Divisions::uniform(3)).unwrap();
        let agents = ObjectManager::with_grid(max_count, AdmissionPolicy::Reject, grid);
        let generator = Generator::new(vec![AgentTemplate::new("cube")], Agent::default_params()).unwrap();
        World::new(agents, generator, 0.1)
    }

    #[test]
    fn test_seed_every_cell() {
        let mut world = world(100);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert_eq!(world.seed_every_cell(&mut rng).unwrap(), 27);
        let grid = world.agents().grid().unwrap();
        assert!(grid.occupancy().all(|(_, count)| count == 1));
        world.agents().check_consistency().unwrap();
    }

    #[test]
    fn test_seed_every_cell_stops_at_capacity() {
        let mut world = world(10);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert_eq!(world.seed_every_cell(&mut rng).unwrap(), 10);
        assert_eq!(world.population(), 10);
    }

    #[test]
    fn test_seed_requires_grid() {
        let agents = ObjectManager::new(5, AdmissionPolicy::Reject);
        let generator = Generator::new(vec![AgentTemplate::new("cube")], ParamTable::new()).unwrap();
        let mut world = World::new(agents, generator, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(world.seed_every_cell(&mut rng).is_err());
        assert_eq!(world.wander_bounds().center(), Vec3::ZERO);
    }

    #[test]
    fn test_snapshot_lists_occupied_cells() {
        let mut world = world(10);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        world
            .generate(SpawnRequest::new().position(Vec3::splat(0.5)), &mut rng)
            .unwrap();
        world
            .generate(SpawnRequest::new().position(Vec3::splat(1.0)), &mut rng)
            .unwrap();
        world.advance_time();

        let snapshot = world.snapshot("unit");
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.population, 2);
        assert_eq!(
            snapshot.cells,
            vec![CellSnapshot {
                coord: GridCoord::new(0, 0, 0),
                count: 2
            }]
        );
        assert_eq!(snapshot.agents[0].template, "cube");
        assert_eq!(snapshot.agents[1].cell, Some(GridCoord::new(0, 0, 0)));
    }
}
