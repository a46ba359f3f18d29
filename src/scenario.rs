use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;

use crate::{
    agent::{Agent, AgentTemplate},
    error::ManagerError,
    generate::{Generator, ParamTable},
    manager::ObjectManager,
    pool::AdmissionPolicy,
    spatial::{Divisions, SpatialGrid},
    world::World,
};

fn default_dt_secs() -> f32 {
    0.1
}

fn default_ticks() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default = "default_dt_secs")]
    pub dt_secs: f32,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default)]
    pub snapshot_interval_ticks: u64,
    pub population: PopulationConfig,
    #[serde(default)]
    pub grid: Option<GridConfig>,
    pub templates: Vec<AgentTemplate>,
    #[serde(default)]
    pub params: Option<ParamTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopulationConfig {
    pub max_count: usize,
    #[serde(default)]
    pub on_full: AdmissionPolicy,
    #[serde(default)]
    pub spawn_per_tick: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub origin: [f32; 3],
    pub extent: [f32; 3],
    pub divisions: [i32; 3],
}

impl GridConfig {
    pub fn build(&self) -> Result<SpatialGrid, ManagerError> {
        SpatialGrid::new(
            Vec3::from(self.origin),
            Vec3::from(self.extent),
            Divisions::from(self.divisions),
        )
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario = Scenario::from_yaml(&data)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn from_yaml(data: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(data).context("Failed to parse scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.name.trim().is_empty() {
            return Err(ManagerError::config("scenario name is empty"));
        }
        if !(self.dt_secs.is_finite() && self.dt_secs > 0.0) {
            return Err(ManagerError::config(format!(
                "dt_secs must be positive, got {}",
                self.dt_secs
            )));
        }
        if self.templates.is_empty() {
            return Err(ManagerError::config("at least one template is required"));
        }
        if let Some(template) = self.templates.iter().find(|t| !(t.scale.is_finite() && t.scale > 0.0)) {
            return Err(ManagerError::config(format!(
                "template '{}' has a non-positive scale",
                template.name
            )));
        }
        if let Some(params) = &self.params {
            params.validate()?;
        }
        if let Some(grid) = &self.grid {
            grid.build()?;
        }
        Ok(())
    }

    /// Declared parameters, or the agent defaults when none are given.
    pub fn param_table(&self) -> ParamTable {
        self.params.clone().unwrap_or_else(Agent::default_params)
    }

    pub fn build_world(&self) -> Result<World, ManagerError> {
        let population = &self.population;
        let agents = match &self.grid {
            Some(grid) => ObjectManager::with_grid(population.max_count, population.on_full, grid.build()?),
            None => ObjectManager::new(population.max_count, population.on_full),
        };
        let generator = Generator::new(self.templates.clone(), self.param_table())?;
        Ok(World::new(agents, generator, self.dt_secs).with_spawn_rate(population.spawn_per_tick))
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or_else(default_ticks)
    }
}
