//! Object manager - arena of managed entities, capacity pool and optional grid
//!
//! A manager is the sole mutator of its entities. Handles carry the issuing
//! manager's token plus a slot generation, so handles from another manager or
//! from an already removed entity are recognised and refused.

use glam::Vec3;
use log::{debug, error};
use rand::Rng;

use crate::entity::{EntityId, ManagedEntity, ManagerToken, Placeable};
use crate::error::ManagerError;
use crate::pool::{AdmissionPolicy, EntityPool};
use crate::spatial::{Aabb, GridCoord, Neighborhood, SpatialGrid};

struct Entry<T> {
    record: ManagedEntity,
    body: T,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Outcome of re-resolving an entity's cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    Unchanged(GridCoord),
    Moved { from: GridCoord, to: GridCoord },
}

pub struct ObjectManager<T> {
    token: ManagerToken,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    pool: EntityPool,
    grid: Option<SpatialGrid>,
}

impl<T: Placeable> ObjectManager<T> {
    /// Manager without spatial tracking.
    pub fn new(max_count: usize, policy: AdmissionPolicy) -> Self {
        Self {
            token: ManagerToken::next(),
            slots: Vec::new(),
            free: Vec::new(),
            pool: EntityPool::new(max_count, policy),
            grid: None,
        }
    }

    /// Manager that places every entity in `grid` and keeps it there as it moves.
    pub fn with_grid(max_count: usize, policy: AdmissionPolicy, grid: SpatialGrid) -> Self {
        let mut manager = Self::new(max_count, policy);
        manager.grid = Some(grid);
        manager
    }

    pub fn token(&self) -> ManagerToken {
        self.token
    }

    pub fn grid(&self) -> Option<&SpatialGrid> {
        self.grid.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn grid_mut(&mut self) -> Option<&mut SpatialGrid> {
        self.grid.as_mut()
    }

    pub fn pool(&self) -> &EntityPool {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.pool.max_count()
    }

    /// Changes the population bound. A lower bound takes effect at the next
    /// [`ObjectManager::trim_to_capacity`].
    pub fn set_max_count(&mut self, max_count: usize) {
        debug!(
            "max count {} -> {} ({} resident)",
            self.pool.max_count(),
            max_count,
            self.pool.len()
        );
        self.pool.set_max_count(max_count);
    }

    pub fn can_admit(&self) -> bool {
        self.pool.can_admit()
    }

    /// Live entities, oldest first.
    pub fn members(&self) -> &[EntityId] {
        self.pool.members()
    }

    fn entry(&self, id: EntityId) -> Option<&Entry<T>> {
        if id.owner() != self.token {
            return None;
        }
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: EntityId) -> Option<&mut Entry<T>> {
        if id.owner() != self.token {
            return None;
        }
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_mut()
    }

    pub fn owns(&self, id: EntityId) -> bool {
        self.entry(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entry(id).map(|entry| &entry.body)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entry_mut(id).map(|entry| &mut entry.body)
    }

    pub fn record(&self, id: EntityId) -> Option<&ManagedEntity> {
        self.entry(id).map(|entry| &entry.record)
    }

    pub fn coord_of(&self, id: EntityId) -> Option<GridCoord> {
        self.entry(id).and_then(|entry| entry.record.coord())
    }

    /// Live entities in age order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.pool
            .members()
            .iter()
            .filter_map(move |&id| self.get(id).map(|body| (id, body)))
    }

    /// Live entities in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        let token = self.token;
        self.slots.iter_mut().enumerate().filter_map(move |(index, slot)| {
            let generation = slot.generation;
            slot.entry
                .as_mut()
                .map(|entry| (EntityId::new(index as u32, generation, token), &mut entry.body))
        })
    }

    fn vacant_id(&self) -> EntityId {
        match self.free.last() {
            Some(&index) => EntityId::new(index, self.slots[index as usize].generation, self.token),
            None => EntityId::new(self.slots.len() as u32, 0, self.token),
        }
    }

    fn occupy(&mut self, id: EntityId, entry: Entry<T>) {
        let index = id.index() as usize;
        if index == self.slots.len() {
            self.slots.push(Slot {
                generation: id.generation(),
                entry: Some(entry),
            });
        } else {
            self.free.pop();
            self.slots[index].entry = Some(entry);
        }
    }

    /// Admits `body`. When the pool is full the admission is refused, or the
    /// oldest members are evicted first under [`AdmissionPolicy::EvictOldest`].
    pub fn add(&mut self, body: T) -> Result<EntityId, ManagerError> {
        let victims = self.pool.admission_victims()?.to_vec();
        for victim in victims {
            self.remove(victim)?;
            debug!("evicted {victim} to admit a newcomer");
        }

        let id = self.vacant_id();
        let mut record = ManagedEntity::new(id);
        record.initialize(self.token)?;
        let coord = self.grid.as_ref().map(|grid| grid.locate(body.position()));
        if let Some(coord) = coord {
            record.place(self.token, coord)?;
        }

        self.pool.push(id)?;
        if let (Some(grid), Some(coord)) = (self.grid.as_mut(), coord) {
            if let Err(err) = grid.insert(id, coord) {
                self.pool.remove(id);
                return Err(err);
            }
        }
        self.occupy(id, Entry { record, body });
        debug!("admitted {id} at {coord:?} ({}/{})", self.pool.len(), self.pool.max_count());
        Ok(id)
    }

    /// Deregisters `id` from the pool and its bucket and hands the body back.
    /// `Ok(None)` when the handle is foreign or stale.
    pub fn release(&mut self, id: EntityId) -> Result<Option<T>, ManagerError> {
        let Some(coord) = self.entry(id).map(|entry| entry.record.coord()) else {
            return Ok(None);
        };
        if let (Some(grid), Some(coord)) = (self.grid.as_mut(), coord) {
            if let Err(err) = grid.remove(id, coord) {
                error!("grid desync while removing {id}: {err}");
                return Err(err);
            }
        }
        self.pool.remove(id);

        let index = id.index() as usize;
        let slot = &mut self.slots[index];
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        debug!("released {id} ({}/{})", self.pool.len(), self.pool.max_count());
        Ok(entry.map(|entry| entry.body))
    }

    /// Destroys `id`. `Ok(false)` when this manager does not own it.
    pub fn remove(&mut self, id: EntityId) -> Result<bool, ManagerError> {
        Ok(self.release(id)?.is_some())
    }

    /// Removes every member, youngest first.
    pub fn remove_all(&mut self) -> Result<usize, ManagerError> {
        let members: Vec<EntityId> = self.pool.members().iter().rev().copied().collect();
        let mut removed = 0;
        for id in members {
            if self.remove(id)? {
                removed += 1;
            }
        }
        debug_assert!(self.pool.is_empty());
        self.pool.clear();
        Ok(removed)
    }

    /// Evicts the oldest members until the population fits `max_count`.
    pub fn trim_to_capacity(&mut self) -> Result<Vec<EntityId>, ManagerError> {
        let evicted = self.pool.oldest(self.pool.overflow()).to_vec();
        for &id in &evicted {
            self.remove(id)?;
        }
        if !evicted.is_empty() {
            debug!("trimmed {} entities down to {}", evicted.len(), self.pool.max_count());
        }
        Ok(evicted)
    }

    /// Re-resolves the cell of one entity after it may have moved.
    pub fn resync(&mut self, id: EntityId) -> Result<Resync, ManagerError> {
        if id.owner() != self.token {
            return Err(ManagerError::NotOwned(id));
        }
        let grid = self.grid.as_mut().ok_or(ManagerError::NotInitialized(id))?;
        resync_entry(self.token, &mut self.slots, grid, id)
    }

    /// Resyncs every member once, oldest first. Returns how many changed cell.
    pub fn resync_all(&mut self) -> Result<usize, ManagerError> {
        let Some(grid) = self.grid.as_mut() else {
            return Ok(0);
        };
        let mut moved = 0;
        for &id in self.pool.members() {
            if let Resync::Moved { .. } = resync_entry(self.token, &mut self.slots, grid, id)? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Replaces the grid. Only allowed while no entity is resident, since
    /// recorded coordinates would not match the new buckets.
    pub fn rebuild_grid(&mut self, grid: SpatialGrid) -> Result<(), ManagerError> {
        if !self.pool.is_empty() {
            return Err(ManagerError::config(format!(
                "cannot rebuild the grid while {} entities are resident",
                self.pool.len()
            )));
        }
        if !grid.is_empty() {
            return Err(ManagerError::config("replacement grid must be empty"));
        }
        self.grid = Some(grid);
        Ok(())
    }

    fn require_grid(&self) -> Result<&SpatialGrid, ManagerError> {
        self.grid
            .as_ref()
            .ok_or_else(|| ManagerError::config("manager has no spatial grid"))
    }

    pub fn objects_in(&self, coord: GridCoord) -> Result<&[EntityId], ManagerError> {
        self.require_grid()?
            .members(coord)
            .ok_or(ManagerError::OutOfBounds(coord))
    }

    pub fn objects_around(&self, coord: GridCoord) -> Result<Neighborhood<'_>, ManagerError> {
        self.require_grid()?
            .neighbors(coord)
            .ok_or(ManagerError::OutOfBounds(coord))
    }

    fn placed_coord(&self, id: EntityId) -> Result<GridCoord, ManagerError> {
        let record = self.record(id).ok_or(ManagerError::NotOwned(id))?;
        record.coord().ok_or(ManagerError::NotInitialized(id))
    }

    /// Entities sharing a cell with `id`, `id` included.
    pub fn objects_near(&self, id: EntityId) -> Result<&[EntityId], ManagerError> {
        let coord = self.placed_coord(id)?;
        self.objects_in(coord)
    }

    pub fn objects_around_entity(&self, id: EntityId) -> Result<Neighborhood<'_>, ManagerError> {
        let coord = self.placed_coord(id)?;
        self.objects_around(coord)
    }

    pub fn cell_bounds(&self, coord: GridCoord) -> Result<Aabb, ManagerError> {
        self.require_grid()?
            .cell_bounds(coord)
            .ok_or(ManagerError::OutOfBounds(coord))
    }

    pub fn random_position_in<R: Rng + ?Sized>(
        &self,
        coord: GridCoord,
        rng: &mut R,
    ) -> Result<Vec3, ManagerError> {
        Ok(self.cell_bounds(coord)?.sample(rng))
    }

    pub fn random_position_in_grid<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec3, ManagerError> {
        Ok(self.require_grid()?.random_position(rng))
    }

    /// Verifies that every member sits in exactly one bucket, the one its
    /// record names, and that buckets hold nothing else.
    pub fn check_consistency(&self) -> Result<(), ManagerError> {
        let occupied = self.slots.iter().filter(|slot| slot.entry.is_some()).count();
        if occupied != self.pool.len() {
            return Err(ManagerError::config(format!(
                "{occupied} occupied slots for {} pool members",
                self.pool.len()
            )));
        }
        let Some(grid) = self.grid.as_ref() else {
            return Ok(());
        };
        let placements = grid.placements();
        for &id in self.pool.members() {
            let coord = self.placed_coord(id)?;
            if placements.get(&id).map(Vec::as_slice) != Some(&[coord][..]) {
                return Err(ManagerError::NotFound { entity: id, coord });
            }
        }
        if grid.resident_count() != self.pool.len() {
            return Err(ManagerError::config(format!(
                "grid holds {} entries for {} pool members",
                grid.resident_count(),
                self.pool.len()
            )));
        }
        Ok(())
    }
}

fn resync_entry<T: Placeable>(
    token: ManagerToken,
    slots: &mut [Slot<T>],
    grid: &mut SpatialGrid,
    id: EntityId,
) -> Result<Resync, ManagerError> {
    let entry = slots
        .get_mut(id.index() as usize)
        .filter(|slot| slot.generation == id.generation())
        .and_then(|slot| slot.entry.as_mut())
        .ok_or(ManagerError::NotOwned(id))?;
    let from = entry.record.coord().ok_or(ManagerError::NotInitialized(id))?;
    let to = grid.locate(entry.body.position());
    if from == to {
        return Ok(Resync::Unchanged(from));
    }
    if let Err(err) = grid.relocate(id, from, to) {
        error!("grid desync while relocating {id}: {err}");
        return Err(err);
    }
    entry.record.move_to(token, to)?;
    Ok(Resync::Moved { from, to })
}
