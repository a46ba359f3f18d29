//! Template-driven generation with per-instance parameter randomization

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, Placeable, Transform};
use crate::error::ManagerError;
use crate::manager::ObjectManager;

/// A nominal value and how far an instance may deviate from it, as a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub value: f32,
    #[serde(default)]
    pub randomness: f32,
}

impl ParamSpec {
    pub const fn new(value: f32, randomness: f32) -> Self {
        Self { value, randomness }
    }

    pub const fn fixed(value: f32) -> Self {
        Self::new(value, 0.0)
    }

    pub fn validate(&self, name: &str) -> Result<(), ManagerError> {
        if !self.value.is_finite() {
            return Err(ManagerError::config(format!(
                "parameter '{name}' has a non-finite value"
            )));
        }
        if !(0.0..=1.0).contains(&self.randomness) {
            return Err(ManagerError::config(format!(
                "parameter '{name}' randomness {} is outside [0, 1]",
                self.randomness
            )));
        }
        let (low, high) = self.range();
        if !(low.is_finite() && high.is_finite() && (high - low).is_finite()) {
            return Err(ManagerError::config(format!(
                "parameter '{name}' range overflows for value {}",
                self.value
            )));
        }
        Ok(())
    }

    /// Closed interval `[value * (1 - randomness), value * (1 + randomness)]`,
    /// low end first even for negative values.
    pub fn range(&self) -> (f32, f32) {
        let a = self.value * (1.0 - self.randomness);
        let b = self.value * (1.0 + self.randomness);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let (low, high) = self.range();
        if low < high {
            rng.gen_range(low..=high)
        } else {
            low
        }
    }
}

/// Named parameter declarations, kept sorted so sampling order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamTable(BTreeMap<String, ParamSpec>);

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.insert(name, spec);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: ParamSpec) -> Option<ParamSpec> {
        self.0.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.0.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        self.iter().try_for_each(|(name, spec)| spec.validate(name))
    }

    /// Draws one value per declared parameter.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> InstanceParams {
        InstanceParams(
            self.0
                .iter()
                .map(|(name, spec)| (name.clone(), spec.sample(rng)))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, ParamSpec)> for ParamTable {
    fn from_iter<I: IntoIterator<Item = (S, ParamSpec)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, spec)| (name.into(), spec)).collect())
    }
}

/// Effective parameter values drawn for one instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstanceParams(BTreeMap<String, f32>);

impl InstanceParams {
    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.get(name).copied()
    }

    pub fn get_or(&self, name: &str, default: f32) -> f32 {
        self.get(name).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// What to generate and where. Unset fields fall back to a random template
/// and the identity transform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpawnRequest {
    pub template: Option<usize>,
    pub transform: Transform,
}

impl SpawnRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, index: usize) -> Self {
        self.template = Some(index);
        self
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.transform.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }
}

/// Entity types a [`Generator`] can build from a template.
pub trait Generatable: Placeable + Sized {
    type Template;

    fn instantiate(
        index: usize,
        template: &Self::Template,
        transform: Transform,
        params: &InstanceParams,
    ) -> Self;
}

pub struct Generator<B: Generatable> {
    templates: Vec<B::Template>,
    params: ParamTable,
}

impl<B: Generatable> Generator<B> {
    pub fn new(templates: Vec<B::Template>, params: ParamTable) -> Result<Self, ManagerError> {
        params.validate()?;
        Ok(Self { templates, params })
    }

    pub fn templates(&self) -> &[B::Template] {
        &self.templates
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    fn pick_template<R: Rng + ?Sized>(
        &self,
        requested: Option<usize>,
        rng: &mut R,
    ) -> Result<usize, ManagerError> {
        let available = self.templates.len();
        let index = match requested {
            Some(index) => index,
            None if available > 0 => rng.gen_range(0..available),
            None => 0,
        };
        if index >= available {
            return Err(ManagerError::UnknownTemplate { index, available });
        }
        Ok(index)
    }

    /// Builds one instance and admits it. Capacity is checked before anything
    /// is instantiated or drawn from `rng`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        manager: &mut ObjectManager<B>,
        request: SpawnRequest,
        rng: &mut R,
    ) -> Result<EntityId, ManagerError> {
        if !manager.can_admit() {
            return Err(ManagerError::CapacityExceeded {
                max_count: manager.max_count(),
            });
        }
        let index = self.pick_template(request.template, rng)?;
        let params = self.params.sample(rng);
        let body = B::instantiate(index, &self.templates[index], request.transform, &params);
        manager.add(body)
    }
}
