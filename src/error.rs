//! Error taxonomy shared by the pool, the grid and the managers.

use thiserror::Error;

use crate::entity::EntityId;
use crate::spatial::GridCoord;

/// Failures reported by entity management operations.
///
/// Capacity, ownership and initialization failures are returned to the caller,
/// who may retry later (admission usually succeeds again once the next trim
/// has freed room). `NotFound`, `OutOfBounds` and `InvalidConfiguration` mean
/// an invariant is already broken and must not be masked.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    #[error("population is at capacity ({max_count})")]
    CapacityExceeded { max_count: usize },

    #[error("entity {0} is not owned by this manager")]
    NotOwned(EntityId),

    #[error("entity {entity} is not present in cell {coord}")]
    NotFound { entity: EntityId, coord: GridCoord },

    #[error("cell {0} lies outside the grid")]
    OutOfBounds(GridCoord),

    #[error("entity {0} has not been placed on a grid")]
    NotInitialized(EntityId),

    #[error("entity was already initialized")]
    AlreadyInitialized,

    #[error("unknown template index {index} ({available} available)")]
    UnknownTemplate { index: usize, available: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ManagerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ManagerError::InvalidConfiguration(msg.into())
    }

    /// Whether the caller can reasonably retry or ignore this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ManagerError::CapacityExceeded { .. }
                | ManagerError::NotOwned(_)
                | ManagerError::NotInitialized(_)
                | ManagerError::AlreadyInitialized
                | ManagerError::UnknownTemplate { .. }
        )
    }
}
