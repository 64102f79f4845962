//! Uniform-cell spatial hash shared by the repulsion and collision passes.
//!
//! Rebuilt fresh every iteration from current positions; distant nodes
//! contribute negligible force, so only the 3x3 cell neighborhood around a
//! node is ever examined.

use rustc_hash::FxHashMap;

use crate::geom::Point;

/// Cells never shrink below this, even for tiny nodes.
pub const MIN_CELL_SIZE: f64 = 110.0;
pub const CELL_RADIUS_FACTOR: f64 = 2.8;

#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: FxHashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    pub fn cell_size_for(max_radius: f64) -> f64 {
        (CELL_RADIUS_FACTOR * max_radius).max(MIN_CELL_SIZE)
    }

    pub fn build(positions: &[Point], cell_size: f64) -> Self {
        let mut cells: FxHashMap<(i64, i64), Vec<usize>> = FxHashMap::default();
        for (idx, p) in positions.iter().enumerate() {
            cells.entry(cell_of(*p, cell_size)).or_default().push(idx);
        }
        Self { cell_size, cells }
    }

    /// Visits every node index bucketed in the 3x3 neighborhood around `p`,
    /// including the node's own bucket (callers filter self-pairs).
    pub fn visit_neighborhood(&self, p: Point, mut visit: impl FnMut(usize)) {
        let (cx, cy) = cell_of(p, self.cell_size);
        for gx in (cx - 1)..=(cx + 1) {
            for gy in (cy - 1)..=(cy + 1) {
                if let Some(bucket) = self.cells.get(&(gx, gy)) {
                    for &idx in bucket {
                        visit(idx);
                    }
                }
            }
        }
    }
}

fn cell_of(p: Point, cell_size: f64) -> (i64, i64) {
    ((p.x / cell_size).floor() as i64, (p.y / cell_size).floor() as i64)
}
