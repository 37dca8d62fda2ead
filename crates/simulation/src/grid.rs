//! Dense corridor grid: pure storage plus indexing helpers.
//!
//! The grid owns the static per-cell fields stamped at attach time
//! (conductance tensors, region and road-class maps, sink falloff) and the
//! sparse iteration lists derived from them. No algorithmic decisions live
//! here; the solvers read these arrays and keep their own state.

use bevy::prelude::*;

/// 8-neighborhood offsets, cardinals first. The proximity-capture scan
/// indexes this table through a shuffled slot order, so the table order
/// itself must stay fixed.
pub const NEIGHBOR8_OFFSETS: [(i64, i64); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

/// Off-road vs. staging-lot classification of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Corridor,
    Lot,
}

/// Road classification used for edge-cost shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoadClass {
    Highway,
    City,
}

/// The N×N corridor grid. All dense arrays are indexed `idx = y * n + x`.
#[derive(Resource)]
pub struct CorridorGrid {
    /// Grid side length in cells.
    pub n: usize,
    /// Cell side length in meters.
    pub cell_size: f32,
    /// World coordinates of the grid's (0,0) cell corner, meters.
    pub origin_x: f32,
    pub origin_y: f32,

    /// Anisotropic conductance tensor, cells²/s. Static during a run.
    pub k_xx: Vec<f32>,
    pub k_yy: Vec<f32>,
    pub k_xy: Vec<f32>,
    /// Dimensionless sink falloff; cells with `g_sink > 0` drain cleared mass.
    pub g_sink: Vec<f32>,
    pub region: Vec<Region>,
    pub road_class: Vec<RoadClass>,

    /// Traversable cells in stable (row-major) order. Includes lot cells so
    /// cleared mass can egress.
    pub road_cells: Vec<u32>,
    pub lot_cells: Vec<u32>,
    pub sink_cells: Vec<u32>,
    /// Cell → lot index, or -1.
    pub cell_to_lot: Vec<i32>,
    /// Cell → industrial-park index, or -1.
    pub cell_to_park: Vec<i32>,
}

impl Default for CorridorGrid {
    fn default() -> Self {
        Self::new(0, 1.0, 0.0, 0.0)
    }
}

impl CorridorGrid {
    pub fn new(n: usize, cell_size: f32, origin_x: f32, origin_y: f32) -> Self {
        let len = n * n;
        Self {
            n,
            cell_size,
            origin_x,
            origin_y,
            k_xx: vec![0.0; len],
            k_yy: vec![0.0; len],
            k_xy: vec![0.0; len],
            g_sink: vec![0.0; len],
            region: vec![Region::Corridor; len],
            road_class: vec![RoadClass::Highway; len],
            road_cells: Vec::new(),
            lot_cells: Vec::new(),
            sink_cells: Vec::new(),
            cell_to_lot: vec![-1; len],
            cell_to_park: vec![-1; len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n * self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.n + x
    }

    #[inline]
    pub fn xy(&self, idx: usize) -> (usize, usize) {
        (idx % self.n, idx / self.n)
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.n && (y as usize) < self.n
    }

    /// World meters → cell index, or `None` outside the window.
    pub fn world_to_cell(&self, wx: f32, wy: f32) -> Option<usize> {
        let gx = ((wx - self.origin_x) / self.cell_size).floor() as i64;
        let gy = ((wy - self.origin_y) / self.cell_size).floor() as i64;
        if self.in_bounds(gx, gy) {
            Some(self.idx(gx as usize, gy as usize))
        } else {
            None
        }
    }

    /// Center of a cell in world meters.
    pub fn cell_center(&self, idx: usize) -> Vec2 {
        let (x, y) = self.xy(idx);
        Vec2::new(
            self.origin_x + (x as f32 + 0.5) * self.cell_size,
            self.origin_y + (y as f32 + 0.5) * self.cell_size,
        )
    }

    /// A cell is traversable when its conductance clears the road threshold
    /// or it belongs to a lot (lot cells stay walkable for egress).
    #[inline]
    pub fn traversable(&self, idx: usize, k_threshold: f32) -> bool {
        self.k_xx[idx].max(self.k_yy[idx]) > k_threshold || self.region[idx] == Region::Lot
    }

    /// Up to 4 cardinal neighbors of `idx`. Use `&result[..count]`.
    pub fn neighbors4(&self, idx: usize) -> ([usize; 4], usize) {
        let (x, y) = self.xy(idx);
        let mut result = [0usize; 4];
        let mut count = 0;
        if x > 0 {
            result[count] = idx - 1;
            count += 1;
        }
        if x + 1 < self.n {
            result[count] = idx + 1;
            count += 1;
        }
        if y > 0 {
            result[count] = idx - self.n;
            count += 1;
        }
        if y + 1 < self.n {
            result[count] = idx + self.n;
            count += 1;
        }
        (result, count)
    }

    /// Up to 8 neighbors of `idx`, cardinals first. Use `&result[..count]`.
    pub fn neighbors8(&self, idx: usize) -> ([usize; 8], usize) {
        let mut result = [0usize; 8];
        let mut count = 0;
        for (dx, dy) in NEIGHBOR8_OFFSETS {
            if let Some(nb) = self.offset_neighbor(idx, dx, dy) {
                result[count] = nb;
                count += 1;
            }
        }
        (result, count)
    }

    /// Neighbor of `idx` at a grid offset, or `None` off the edge.
    #[inline]
    pub fn offset_neighbor(&self, idx: usize, dx: i64, dy: i64) -> Option<usize> {
        let (x, y) = self.xy(idx);
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        if self.in_bounds(nx, ny) {
            Some(self.idx(nx as usize, ny as usize))
        } else {
            None
        }
    }

    /// Chebyshev distance between two cells, in cells.
    pub fn chebyshev(&self, a: usize, b: usize) -> i64 {
        let (ax, ay) = self.xy(a);
        let (bx, by) = self.xy(b);
        let dx = (ax as i64 - bx as i64).abs();
        let dy = (ay as i64 - by as i64).abs();
        dx.max(dy)
    }

    /// Recompute the sparse iteration lists from the dense maps. Called once
    /// at attach, after the collaborator's rasterized context is applied.
    pub fn rebuild_sparse_lists(&mut self, k_threshold: f32) {
        self.road_cells.clear();
        self.lot_cells.clear();
        self.sink_cells.clear();
        for idx in 0..self.len() {
            if self.traversable(idx, k_threshold) {
                self.road_cells.push(idx as u32);
            }
            if self.region[idx] == Region::Lot {
                self.lot_cells.push(idx as u32);
            }
            if self.g_sink[idx] > 0.0 {
                self.sink_cells.push(idx as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_16() -> CorridorGrid {
        CorridorGrid::new(16, 10.0, -80.0, -80.0)
    }

    #[test]
    fn test_coord_roundtrip() {
        let grid = grid_16();
        for idx in [0usize, 17, 120, 255] {
            let center = grid.cell_center(idx);
            assert_eq!(grid.world_to_cell(center.x, center.y), Some(idx));
        }
    }

    #[test]
    fn test_world_to_cell_out_of_bounds() {
        let grid = grid_16();
        assert_eq!(grid.world_to_cell(-81.0, 0.0), None);
        assert_eq!(grid.world_to_cell(0.0, 81.0), None);
    }

    #[test]
    fn test_neighbor_counts() {
        let grid = grid_16();
        assert_eq!(grid.neighbors4(grid.idx(0, 0)).1, 2);
        assert_eq!(grid.neighbors4(grid.idx(8, 8)).1, 4);
        assert_eq!(grid.neighbors8(grid.idx(0, 0)).1, 3);
        assert_eq!(grid.neighbors8(grid.idx(8, 8)).1, 8);
        assert_eq!(grid.neighbors8(grid.idx(15, 15)).1, 3);
    }

    #[test]
    fn test_traversable_via_conductance_or_lot() {
        let mut grid = grid_16();
        let road = grid.idx(3, 3);
        let lot = grid.idx(5, 5);
        let bare = grid.idx(7, 7);
        grid.k_xx[road] = 1.0;
        grid.region[lot] = Region::Lot;
        assert!(grid.traversable(road, 1.0e-6));
        assert!(grid.traversable(lot, 1.0e-6));
        assert!(!grid.traversable(bare, 1.0e-6));
    }

    #[test]
    fn test_sparse_lists_stable_order() {
        let mut grid = grid_16();
        for x in 2..6 {
            let idx = grid.idx(x, 4);
            grid.k_xx[idx] = 1.0;
        }
        let lot = grid.idx(6, 4);
        grid.region[lot] = Region::Lot;
        let sink = grid.idx(2, 4);
        grid.g_sink[sink] = 1.0;
        grid.rebuild_sparse_lists(1.0e-6);

        // Row-major ordering: road cells ascend.
        let sorted = {
            let mut v = grid.road_cells.clone();
            v.sort_unstable();
            v
        };
        assert_eq!(grid.road_cells, sorted);
        assert_eq!(grid.road_cells.len(), 5); // 4 road + 1 lot cell
        assert_eq!(grid.lot_cells, vec![lot as u32]);
        assert_eq!(grid.sink_cells, vec![sink as u32]);
    }
}
