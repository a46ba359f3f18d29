//! Entity handles and per-entity management records

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ManagerError;
use crate::spatial::GridCoord;

/// Capability held by exactly one manager. Entity handles carry the token of
/// the manager that issued them, and records only accept mutation from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManagerToken(u32);

impl ManagerToken {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Arena handle: slot index, slot generation and issuing manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
    owner: ManagerToken,
}

impl EntityId {
    pub(crate) fn new(index: u32, generation: u32, owner: ManagerToken) -> Self {
        Self {
            index,
            generation,
            owner,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    pub fn owner(self) -> ManagerToken {
        self.owner
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}@m{}", self.index, self.generation, self.owner.0)
    }
}

/// Anything a grid-aware manager can locate.
pub trait Placeable {
    fn position(&self) -> Vec3;
}

impl Placeable for Vec3 {
    fn position(&self) -> Vec3 {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Placeable for Transform {
    fn position(&self) -> Vec3 {
        self.position
    }
}

/// Cell recorded for a placed entity and the grid manager allowed to change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMembership {
    coord: GridCoord,
    owner: ManagerToken,
}

impl GridMembership {
    pub fn coord(&self) -> GridCoord {
        self.coord
    }

    pub fn owner(&self) -> ManagerToken {
        self.owner
    }
}

/// Management record attached to every admitted entity.
#[derive(Debug, Clone)]
pub struct ManagedEntity {
    id: EntityId,
    initialized: bool,
    grid: Option<GridMembership>,
}

impl ManagedEntity {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            initialized: false,
            grid: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Coordinate of the bucket holding this entity, if it has been placed.
    pub fn coord(&self) -> Option<GridCoord> {
        self.grid.map(|membership| membership.coord)
    }

    pub fn membership(&self) -> Option<GridMembership> {
        self.grid
    }

    /// Binds the record to its manager. Succeeds exactly once.
    pub fn initialize(&mut self, token: ManagerToken) -> Result<(), ManagerError> {
        if self.initialized {
            return Err(ManagerError::AlreadyInitialized);
        }
        self.check_owner(token)?;
        self.initialized = true;
        Ok(())
    }

    fn check_owner(&self, token: ManagerToken) -> Result<(), ManagerError> {
        if self.id.owner != token {
            return Err(ManagerError::NotOwned(self.id));
        }
        Ok(())
    }

    /// Records the initial cell (`Unplaced -> Placed`).
    pub(crate) fn place(&mut self, token: ManagerToken, coord: GridCoord) -> Result<(), ManagerError> {
        self.check_owner(token)?;
        if !self.initialized {
            return Err(ManagerError::NotInitialized(self.id));
        }
        self.grid = Some(GridMembership { coord, owner: token });
        Ok(())
    }

    /// Records a new cell for an already placed entity.
    pub(crate) fn move_to(&mut self, token: ManagerToken, coord: GridCoord) -> Result<(), ManagerError> {
        let membership = self.grid.as_mut().ok_or(ManagerError::NotInitialized(self.id))?;
        if membership.owner != token {
            return Err(ManagerError::NotOwned(self.id));
        }
        membership.coord = coord;
        Ok(())
    }
}
