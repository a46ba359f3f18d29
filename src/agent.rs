//! Wandering agents with a limited lifetime, the sample population.

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entity::{Placeable, Transform};
use crate::generate::{Generatable, InstanceParams, ParamSpec, ParamTable};
use crate::spatial::Aabb;

pub const MOVE_SPEED: &str = "move_speed";
pub const SPIN_SPEED: &str = "spin_speed";
pub const LIFETIME_SECS: &str = "lifetime_secs";
pub const SCALE: &str = "scale";

fn default_template_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTemplate {
    pub name: String,
    #[serde(default = "default_template_scale")]
    pub scale: f32,
}

impl AgentTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scale: default_template_scale(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Alive,
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    template: usize,
    transform: Transform,
    move_speed: f32,
    /// Degrees per second around each axis.
    spin_speed: f32,
    lifetime_secs: f32,
    age_secs: f32,
    target: Option<Vec3>,
}

impl Agent {
    pub fn new(template: usize, transform: Transform, move_speed: f32, spin_speed: f32, lifetime_secs: f32) -> Self {
        Self {
            template,
            transform,
            move_speed,
            spin_speed,
            lifetime_secs,
            age_secs: 0.0,
            target: None,
        }
    }

    /// Parameter declarations used when a scenario does not provide its own.
    pub fn default_params() -> ParamTable {
        ParamTable::new()
            .with(MOVE_SPEED, ParamSpec::new(1.0, 0.5))
            .with(SPIN_SPEED, ParamSpec::new(1.0, 0.5))
            .with(SCALE, ParamSpec::new(1.0, 0.5))
            .with(LIFETIME_SECS, ParamSpec::new(30.0, 0.5))
    }

    pub fn template(&self) -> usize {
        self.template
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    pub fn move_speed(&self) -> f32 {
        self.move_speed
    }

    pub fn lifetime_secs(&self) -> f32 {
        self.lifetime_secs
    }

    pub fn age_secs(&self) -> f32 {
        self.age_secs
    }

    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    /// Advances the agent by `dt` seconds: ages it, steps toward its target
    /// (picking a new one inside `bounds` on arrival) and spins it.
    pub fn update<R: Rng + ?Sized>(&mut self, dt: f32, bounds: &Aabb, rng: &mut R) -> Lifecycle {
        self.age_secs += dt;
        if self.age_secs >= self.lifetime_secs {
            return Lifecycle::Expired;
        }

        let target = *self.target.get_or_insert_with(|| bounds.sample(rng));
        let (position, arrived) = move_towards(self.transform.position, target, self.move_speed * dt);
        self.transform.position = position;
        if arrived {
            self.target = Some(bounds.sample(rng));
        }

        let angle = (self.spin_speed * dt).to_radians();
        let spin = Quat::from_euler(EulerRot::XYZ, angle, angle, angle);
        self.transform.rotation = (self.transform.rotation * spin).normalize();
        Lifecycle::Alive
    }
}

fn move_towards(from: Vec3, to: Vec3, max_step: f32) -> (Vec3, bool) {
    let delta = to - from;
    let distance = delta.length();
    if distance <= max_step || distance <= f32::EPSILON {
        return (to, true);
    }
    (from + delta / distance * max_step, false)
}

impl Placeable for Agent {
    fn position(&self) -> Vec3 {
        self.transform.position
    }
}

impl Generatable for Agent {
    type Template = AgentTemplate;

    fn instantiate(index: usize, template: &AgentTemplate, transform: Transform, params: &InstanceParams) -> Self {
        let mut transform = transform;
        transform.scale *= template.scale * params.get_or(SCALE, 1.0);
        Agent::new(
            index,
            transform,
            params.get_or(MOVE_SPEED, 1.0),
            params.get_or(SPIN_SPEED, 1.0),
            params.get_or(LIFETIME_SECS, 30.0),
        )
    }
}
