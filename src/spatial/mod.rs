//! Spatial model - uniform 3D grid of entity buckets
//!
//! The grid is fixed once built: cell bounds and the 3x3x3 neighbor view of
//! every cell are computed at construction and never recomputed per query.

use std::collections::HashMap;
use std::fmt;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::ManagerError;

/// Upper bound on the number of cells a grid may allocate.
pub const MAX_CELLS: usize = 1 << 24;

/// Integer cell coordinate inside a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Number of cells along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Divisions {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Divisions {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn uniform(n: i32) -> Self {
        Self::new(n, n, n)
    }

    /// Total cell count, `None` when an axis is negative or the product
    /// overflows.
    pub fn cell_count(&self) -> Option<usize> {
        let x = usize::try_from(self.x).ok()?;
        let y = usize::try_from(self.y).ok()?;
        let z = usize::try_from(self.z).ok()?;
        x.checked_mul(y)?.checked_mul(z)
    }

    fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

impl From<[i32; 3]> for Divisions {
    fn from(value: [i32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

/// Axis-aligned box, closed on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_min_size(min: Vec3, size: Vec3) -> Self {
        Self {
            min,
            max: min + size,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Uniform sample inside the box, bounds included.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        Vec3::new(
            rng.gen_range(self.min.x..=self.max.x),
            rng.gen_range(self.min.y..=self.max.y),
            rng.gen_range(self.min.z..=self.max.z),
        )
    }
}

/// Uniform grid partitioning a box of space into `divisions` cells.
///
/// Buckets keep insertion order. Callers must not hold a bucket slice across
/// an insert/remove/relocate on the same grid; the borrow checker enforces
/// this for slices returned by [`SpatialGrid::members`].
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    origin: Vec3,
    extent: Vec3,
    divisions: Divisions,
    cell_size: Vec3,
    cells: Vec<Vec<EntityId>>,
    bounds: Vec<Aabb>,
    neighbors: Vec<Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(origin: Vec3, extent: Vec3, divisions: Divisions) -> Result<Self, ManagerError> {
        if divisions.x < 1 || divisions.y < 1 || divisions.z < 1 {
            return Err(ManagerError::config(format!(
                "grid divisions must be at least 1 on every axis, got ({}, {}, {})",
                divisions.x, divisions.y, divisions.z
            )));
        }
        if !origin.is_finite() {
            return Err(ManagerError::config("grid origin must be finite"));
        }
        if !extent.is_finite() || extent.cmple(Vec3::ZERO).any() {
            return Err(ManagerError::config(format!(
                "grid extent must be positive on every axis, got {extent}"
            )));
        }
        if !(origin + extent).is_finite() {
            return Err(ManagerError::config(format!(
                "grid far corner overflows: origin {origin} + extent {extent}"
            )));
        }

        let cell_size = extent / divisions.as_vec3();
        if !cell_size.is_finite() || cell_size.cmple(Vec3::ZERO).any() {
            return Err(ManagerError::config(format!(
                "grid cell size must be positive on every axis, got {cell_size}"
            )));
        }
        let count = divisions
            .cell_count()
            .filter(|&count| count <= MAX_CELLS)
            .ok_or_else(|| {
                ManagerError::config(format!(
                    "grid divisions ({}, {}, {}) exceed {MAX_CELLS} cells",
                    divisions.x, divisions.y, divisions.z
                ))
            })?;
        let mut grid = Self {
            origin,
            extent,
            divisions,
            cell_size,
            cells: vec![Vec::new(); count],
            bounds: Vec::with_capacity(count),
            neighbors: Vec::with_capacity(count),
        };

        for index in 0..count {
            let coord = grid.coord_of(index);
            let min = origin
                + cell_size * Vec3::new(coord.x as f32, coord.y as f32, coord.z as f32);
            grid.bounds.push(Aabb::from_min_size(min, cell_size));
        }
        for index in 0..count {
            let around = grid.compute_neighbors(grid.coord_of(index));
            grid.neighbors.push(around);
        }
        Ok(grid)
    }

    fn compute_neighbors(&self, center: GridCoord) -> Vec<usize> {
        let mut around = Vec::with_capacity(27);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let coord = GridCoord::new(center.x + dx, center.y + dy, center.z + dz);
                    if let Some(index) = self.index_of(coord) {
                        around.push(index);
                    }
                }
            }
        }
        around
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn extent(&self) -> Vec3 {
        self.extent
    }

    pub fn divisions(&self) -> Divisions {
        self.divisions
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// World-space box covered by the whole grid.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_min_size(self.origin, self.extent)
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        self.index_of(coord).is_some()
    }

    /// Flat bucket index for a coordinate, `None` outside the grid.
    pub fn index_of(&self, coord: GridCoord) -> Option<usize> {
        let d = self.divisions;
        if coord.x < 0 || coord.y < 0 || coord.z < 0 || coord.x >= d.x || coord.y >= d.y || coord.z >= d.z
        {
            return None;
        }
        let (x, y, z) = (coord.x as usize, coord.y as usize, coord.z as usize);
        Some(x + d.x as usize * (y + d.y as usize * z))
    }

    fn coord_of(&self, index: usize) -> GridCoord {
        let dx = self.divisions.x as usize;
        let dy = self.divisions.y as usize;
        GridCoord::new(
            (index % dx) as i32,
            ((index / dx) % dy) as i32,
            (index / (dx * dy)) as i32,
        )
    }

    /// Cell containing `position`. Positions outside the grid map to the
    /// nearest boundary cell.
    pub fn locate(&self, position: Vec3) -> GridCoord {
        let local = (position - self.origin) / self.cell_size;
        GridCoord::new(
            clamp_axis(local.x, self.divisions.x),
            clamp_axis(local.y, self.divisions.y),
            clamp_axis(local.z, self.divisions.z),
        )
    }

    fn bucket_mut(&mut self, coord: GridCoord) -> Result<&mut Vec<EntityId>, ManagerError> {
        let index = self.index_of(coord).ok_or(ManagerError::OutOfBounds(coord))?;
        Ok(&mut self.cells[index])
    }

    /// Appends to the bucket. Duplicate insertion is the caller's problem.
    pub fn insert(&mut self, entity: EntityId, coord: GridCoord) -> Result<(), ManagerError> {
        self.bucket_mut(coord)?.push(entity);
        Ok(())
    }

    pub fn remove(&mut self, entity: EntityId, coord: GridCoord) -> Result<(), ManagerError> {
        let bucket = self.bucket_mut(coord)?;
        let position = bucket
            .iter()
            .position(|&member| member == entity)
            .ok_or(ManagerError::NotFound { entity, coord })?;
        bucket.remove(position);
        Ok(())
    }

    /// Moves an entity between two buckets. Nothing changes on failure.
    pub fn relocate(
        &mut self,
        entity: EntityId,
        from: GridCoord,
        to: GridCoord,
    ) -> Result<(), ManagerError> {
        if !self.contains(to) {
            return Err(ManagerError::OutOfBounds(to));
        }
        self.remove(entity, from)?;
        self.insert(entity, to)
    }

    /// Live members of one cell, oldest placement first.
    pub fn members(&self, coord: GridCoord) -> Option<&[EntityId]> {
        self.index_of(coord).map(|index| self.cells[index].as_slice())
    }

    /// The precomputed 3x3x3 block around `coord`, itself included, clipped
    /// to the grid.
    pub fn neighbors(&self, coord: GridCoord) -> Option<Neighborhood<'_>> {
        let index = self.index_of(coord)?;
        Some(Neighborhood {
            cells: &self.cells,
            around: self.neighbors[index].iter(),
        })
    }

    pub fn neighbor_coords(&self, coord: GridCoord) -> Option<Vec<GridCoord>> {
        let index = self.index_of(coord)?;
        Some(self.neighbors[index].iter().map(|&i| self.coord_of(i)).collect())
    }

    pub fn cell_bounds(&self, coord: GridCoord) -> Option<Aabb> {
        self.index_of(coord).map(|index| self.bounds[index])
    }

    pub fn random_position_in<R: Rng + ?Sized>(&self, coord: GridCoord, rng: &mut R) -> Option<Vec3> {
        self.cell_bounds(coord).map(|bounds| bounds.sample(rng))
    }

    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        self.bounds().sample(rng)
    }

    /// Every cell with its current member count, in index order.
    pub fn occupancy(&self) -> impl Iterator<Item = (GridCoord, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, bucket)| (self.coord_of(index), bucket.len()))
    }

    pub fn resident_count(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    /// Every resident with the coordinates of the buckets holding it,
    /// gathered in one pass over the grid.
    pub fn placements(&self) -> HashMap<EntityId, Vec<GridCoord>> {
        let mut placements: HashMap<EntityId, Vec<GridCoord>> = HashMap::new();
        for (index, bucket) in self.cells.iter().enumerate() {
            let coord = self.coord_of(index);
            for &entity in bucket {
                placements.entry(entity).or_default().push(coord);
            }
        }
        placements
    }
}

fn clamp_axis(local: f32, divisions: i32) -> i32 {
    let cell = local.floor();
    if cell.is_nan() {
        return 0;
    }
    cell.clamp(0.0, (divisions - 1) as f32) as i32
}

/// Bucket slices making up the neighborhood of one cell.
pub struct Neighborhood<'a> {
    cells: &'a [Vec<EntityId>],
    around: std::slice::Iter<'a, usize>,
}

impl<'a> Neighborhood<'a> {
    /// Flattened view over every entity in the neighborhood.
    pub fn entities(self) -> impl Iterator<Item = EntityId> + 'a {
        self.flat_map(|bucket| bucket.iter().copied())
    }
}

impl<'a> Iterator for Neighborhood<'a> {
    type Item = &'a [EntityId];

    fn next(&mut self) -> Option<Self::Item> {
        let cells = self.cells;
        self.around.next().map(|&index| cells[index].as_slice())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.around.size_hint()
    }
}

impl ExactSizeIterator for Neighborhood<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ManagerToken;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn grid(divisions: i32, extent: f32) -> SpatialGrid {
        SpatialGrid::new(Vec3::ZERO, Vec3::splat(extent), Divisions::uniform(divisions)).unwrap()
    }

    fn ids(count: u32) -> Vec<EntityId> {
        let token = ManagerToken::next();
        (0..count).map(|i| EntityId::new(i, 0, token)).collect()
    }

    #[test]
    fn test_rejects_degenerate_configuration() {
        let zero_div = SpatialGrid::new(Vec3::ZERO, Vec3::ONE, Divisions::new(2, 0, 2));
        assert!(matches!(zero_div, Err(ManagerError::InvalidConfiguration(_))));

        let negative_div = SpatialGrid::new(Vec3::ZERO, Vec3::ONE, Divisions::new(-1, 1, 1));
        assert!(matches!(negative_div, Err(ManagerError::InvalidConfiguration(_))));

        let flat = SpatialGrid::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0), Divisions::uniform(1));
        assert!(matches!(flat, Err(ManagerError::InvalidConfiguration(_))));

        let inverted = SpatialGrid::new(Vec3::ZERO, Vec3::new(1.0, -3.0, 1.0), Divisions::uniform(1));
        assert!(matches!(inverted, Err(ManagerError::InvalidConfiguration(_))));

        let huge = SpatialGrid::new(Vec3::ZERO, Vec3::ONE, Divisions::uniform(i32::MAX));
        assert!(matches!(huge, Err(ManagerError::InvalidConfiguration(_))));
        let too_many = SpatialGrid::new(Vec3::ZERO, Vec3::ONE, Divisions::new(4096, 4096, 2));
        assert!(matches!(too_many, Err(ManagerError::InvalidConfiguration(_))));

        let far_corner = SpatialGrid::new(Vec3::splat(3e38), Vec3::splat(3e38), Divisions::uniform(1));
        assert!(matches!(far_corner, Err(ManagerError::InvalidConfiguration(_))));
        let near_limit = SpatialGrid::new(Vec3::splat(-3e38), Vec3::splat(3e38), Divisions::uniform(1)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(near_limit.random_position(&mut rng).is_finite());
    }

    #[test]
    fn test_cell_count_overflow() {
        assert_eq!(Divisions::new(2, 3, 4).cell_count(), Some(24));
        assert_eq!(Divisions::uniform(i32::MAX).cell_count(), None);
        assert_eq!(Divisions::new(-1, 2, 2).cell_count(), None);
    }

    #[test]
    fn test_cell_size_and_bounds() {
        let grid = SpatialGrid::new(
            Vec3::new(-4.0, 0.0, 2.0),
            Vec3::new(8.0, 4.0, 6.0),
            Divisions::new(4, 2, 3),
        )
        .unwrap();
        assert_eq!(grid.cell_count(), 24);
        assert_eq!(grid.cell_size(), Vec3::new(2.0, 2.0, 2.0));

        let bounds = grid.cell_bounds(GridCoord::new(1, 1, 2)).unwrap();
        assert_eq!(bounds.min, Vec3::new(-2.0, 2.0, 6.0));
        assert_eq!(bounds.max, Vec3::new(0.0, 4.0, 8.0));
        assert_eq!(bounds.center(), Vec3::new(-1.0, 3.0, 7.0));
        assert!(grid.cell_bounds(GridCoord::new(4, 0, 0)).is_none());
    }

    #[test]
    fn test_index_roundtrip() {
        let grid = SpatialGrid::new(Vec3::ZERO, Vec3::ONE, Divisions::new(3, 4, 5)).unwrap();
        for index in 0..grid.cell_count() {
            let coord = grid.coord_of(index);
            assert_eq!(grid.index_of(coord), Some(index));
        }
    }

    #[test]
    fn test_locate_inside_stays_in_range() {
        let grid = SpatialGrid::new(
            Vec3::new(-5.0, 1.0, 0.5),
            Vec3::new(10.0, 3.0, 7.0),
            Divisions::new(7, 3, 5),
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..2_000 {
            let p = grid.random_position(&mut rng);
            let coord = grid.locate(p);
            assert!(grid.contains(coord), "{p} located to {coord}");
            let bounds = grid.cell_bounds(coord).unwrap();
            let slack = Vec3::splat(1e-4);
            let padded = Aabb {
                min: bounds.min - slack,
                max: bounds.max + slack,
            };
            assert!(padded.contains(p), "{p} not inside cell {coord}");
        }
    }

    #[test]
    fn test_locate_clamps_outside_positions() {
        let grid = grid(4, 8.0);
        assert_eq!(grid.locate(Vec3::new(-100.0, 3.0, 3.0)), GridCoord::new(0, 1, 1));
        assert_eq!(grid.locate(Vec3::new(8.0, 8.0, 8.0)), GridCoord::new(3, 3, 3));
        assert_eq!(grid.locate(Vec3::new(1e9, -1e9, 5.0)), GridCoord::new(3, 0, 2));
        assert_eq!(grid.locate(Vec3::splat(f32::NAN)), GridCoord::new(0, 0, 0));
        assert_eq!(grid.locate(Vec3::splat(f32::INFINITY)), GridCoord::new(3, 3, 3));
    }

    #[test]
    fn test_neighbor_counts() {
        let grid = grid(3, 3.0);
        assert_eq!(grid.neighbors(GridCoord::new(1, 1, 1)).unwrap().len(), 27);
        assert_eq!(grid.neighbors(GridCoord::new(0, 0, 0)).unwrap().len(), 8);
        assert_eq!(grid.neighbors(GridCoord::new(1, 0, 0)).unwrap().len(), 12);
        assert_eq!(grid.neighbors(GridCoord::new(1, 1, 0)).unwrap().len(), 18);
        assert!(grid.neighbors(GridCoord::new(3, 1, 1)).is_none());

        let single = grid_with(Divisions::uniform(1));
        assert_eq!(single.neighbors(GridCoord::new(0, 0, 0)).unwrap().len(), 1);
    }

    fn grid_with(divisions: Divisions) -> SpatialGrid {
        SpatialGrid::new(Vec3::ZERO, Vec3::ONE, divisions).unwrap()
    }

    #[test]
    fn test_neighbor_coords_are_unique_and_adjacent() {
        let grid = grid_with(Divisions::new(4, 3, 2));
        for (coord, _) in grid.occupancy().collect::<Vec<_>>() {
            let around = grid.neighbor_coords(coord).unwrap();
            let unique: HashSet<_> = around.iter().copied().collect();
            assert_eq!(unique.len(), around.len());
            assert!(unique.contains(&coord));
            for other in around {
                assert!((other.x - coord.x).abs() <= 1);
                assert!((other.y - coord.y).abs() <= 1);
                assert!((other.z - coord.z).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_neighbor_view_is_live() {
        let mut grid = grid(3, 3.0);
        let ids = ids(3);
        grid.insert(ids[0], GridCoord::new(0, 0, 0)).unwrap();
        grid.insert(ids[1], GridCoord::new(1, 1, 1)).unwrap();
        grid.insert(ids[2], GridCoord::new(2, 2, 2)).unwrap();

        let near_corner: Vec<_> = grid.neighbors(GridCoord::new(0, 0, 0)).unwrap().entities().collect();
        assert_eq!(near_corner, vec![ids[0], ids[1]]);

        let near_center: HashSet<_> = grid.neighbors(GridCoord::new(1, 1, 1)).unwrap().entities().collect();
        assert_eq!(near_center.len(), 3);

        grid.remove(ids[1], GridCoord::new(1, 1, 1)).unwrap();
        let near_corner: Vec<_> = grid.neighbors(GridCoord::new(0, 0, 0)).unwrap().entities().collect();
        assert_eq!(near_corner, vec![ids[0]]);
    }

    #[test]
    fn test_relocate_moves_between_buckets() {
        let mut grid = grid(2, 2.0);
        let ids = ids(2);
        let a = GridCoord::new(0, 0, 0);
        let b = GridCoord::new(1, 0, 0);
        grid.insert(ids[0], a).unwrap();
        grid.insert(ids[1], a).unwrap();

        grid.relocate(ids[0], a, b).unwrap();
        assert_eq!(grid.members(a).unwrap(), &[ids[1]]);
        assert_eq!(grid.members(b).unwrap(), &[ids[0]]);
        assert_eq!(grid.resident_count(), 2);
    }

    #[test]
    fn test_relocate_and_remove_report_desync() {
        let mut grid = grid(2, 2.0);
        let ids = ids(1);
        let a = GridCoord::new(0, 0, 0);
        let b = GridCoord::new(1, 1, 1);

        let err = grid.relocate(ids[0], a, b).unwrap_err();
        assert_eq!(err, ManagerError::NotFound { entity: ids[0], coord: a });
        assert!(grid.is_empty());

        let err = grid.remove(ids[0], b).unwrap_err();
        assert_eq!(err, ManagerError::NotFound { entity: ids[0], coord: b });

        grid.insert(ids[0], a).unwrap();
        let err = grid.relocate(ids[0], a, GridCoord::new(2, 0, 0)).unwrap_err();
        assert_eq!(err, ManagerError::OutOfBounds(GridCoord::new(2, 0, 0)));
        assert_eq!(grid.members(a).unwrap(), &[ids[0]]);
    }

    #[test]
    fn test_random_positions_stay_in_bounds() {
        let grid = SpatialGrid::new(Vec3::new(3.0, -2.0, 0.0), Vec3::new(6.0, 4.0, 2.0), Divisions::new(3, 2, 1))
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let cell = GridCoord::new(2, 1, 0);
        let bounds = grid.cell_bounds(cell).unwrap();
        for _ in 0..500 {
            let p = grid.random_position_in(cell, &mut rng).unwrap();
            assert!(bounds.contains(p));
            assert!(grid.bounds().contains(grid.random_position(&mut rng)));
        }
        assert!(grid.random_position_in(GridCoord::new(0, 2, 0), &mut rng).is_none());
    }

    #[test]
    fn test_placements_collect_every_bucket() {
        let mut grid = grid(2, 10.0);
        let [a, b]: [EntityId; 2] = ids(2).try_into().unwrap();
        grid.insert(a, GridCoord::new(0, 0, 0)).unwrap();
        grid.insert(b, GridCoord::new(1, 0, 1)).unwrap();
        grid.insert(b, GridCoord::new(0, 1, 0)).unwrap();

        let placements = grid.placements();
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[&a], vec![GridCoord::new(0, 0, 0)]);
        let mut doubled = placements[&b].clone();
        doubled.sort();
        assert_eq!(doubled, vec![GridCoord::new(0, 1, 0), GridCoord::new(1, 0, 1)]);
        assert!(self::grid(1, 1.0).placements().is_empty());
    }
}
