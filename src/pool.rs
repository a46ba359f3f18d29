//! Live membership and age order of a manager's entities

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::ManagerError;

/// What admission does when the pool is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Refuse the newcomer.
    #[default]
    Reject,
    /// Evict the oldest member to make room.
    EvictOldest,
}

/// Ordered set of live members, oldest first, bounded by `max_count`.
///
/// `max_count` may be lowered below the current population; the owner brings
/// the population back within bounds on its next trim.
#[derive(Debug, Clone)]
pub struct EntityPool {
    max_count: usize,
    policy: AdmissionPolicy,
    members: Vec<EntityId>,
}

impl EntityPool {
    pub fn new(max_count: usize, policy: AdmissionPolicy) -> Self {
        Self {
            max_count,
            policy,
            members: Vec::new(),
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn set_max_count(&mut self, max_count: usize) {
        self.max_count = max_count;
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_count
    }

    /// Whether an admission could succeed, counting eviction under
    /// [`AdmissionPolicy::EvictOldest`].
    pub fn can_admit(&self) -> bool {
        match self.policy {
            AdmissionPolicy::Reject => !self.is_full(),
            AdmissionPolicy::EvictOldest => self.max_count > 0,
        }
    }

    /// Members that must leave before `id` can join, oldest first.
    pub fn admission_victims(&self) -> Result<&[EntityId], ManagerError> {
        if !self.can_admit() {
            return Err(ManagerError::CapacityExceeded {
                max_count: self.max_count,
            });
        }
        let excess = (self.members.len() + 1).saturating_sub(self.max_count);
        Ok(&self.members[..excess])
    }

    /// Appends a new youngest member. Fails without side effects when full.
    pub fn push(&mut self, id: EntityId) -> Result<(), ManagerError> {
        if self.is_full() {
            return Err(ManagerError::CapacityExceeded {
                max_count: self.max_count,
            });
        }
        self.members.push(id);
        Ok(())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Age rank of a member, 0 being the oldest.
    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.members.iter().position(|&member| member == id)
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    /// How many members exceed `max_count`.
    pub fn overflow(&self) -> usize {
        self.members.len().saturating_sub(self.max_count)
    }

    pub fn oldest(&self, count: usize) -> &[EntityId] {
        &self.members[..count.min(self.members.len())]
    }

    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }
}
