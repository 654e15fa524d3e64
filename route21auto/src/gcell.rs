//!
//! # GCell Grid
//!
//! The rectangular partition of the routing area used for density and
//! capacity bookkeeping. Cut lines come from the global-routing solution;
//! each cell is the half-open rectangle `[x_i, x_{i+1}) × [y_j, y_{j+1})`.
//!

// Std-Lib
use std::collections::BTreeSet;

// Crates.io
use log::warn;
use serde::{Deserialize, Serialize};

// Local Imports
use crate::config::Configuration;
use crate::error::{AutoError, AutoResult};
use route21db::{BoundBox, DbUnits, Dir, EntityId, Point, Span};

/// # GCell
///
/// One grid cell: geometry, per-depth occupation, the segments crossing
/// it, and the capacities of its east (horizontal) and north (vertical)
/// edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GCell {
    /// Flat index in the grid
    pub index: usize,
    pub row: u32,
    pub col: u32,
    /// Closed-box geometry; occupancy tests treat the high edges as open
    pub bbox: BoundBox,
    /// Per-depth wire density, 0.0 ..= 1.0 and beyond when overloaded
    pub densities: Vec<f64>,
    /// Per-depth feedthrough counts
    pub feedthroughs: Vec<u32>,
    /// Remaining capacity of the east edge
    pub h_capacity: u32,
    /// Remaining capacity of the north edge
    pub v_capacity: u32,
    /// Routing-pad count
    pub rp_count: u32,
    /// Segments currently registered in this gcell
    pub segments: BTreeSet<EntityId>,
}
impl GCell {
    /// Highest per-depth density
    pub fn max_density(&self) -> f64 {
        self.densities.iter().cloned().fold(0.0, f64::max)
    }
    /// Saturation test against the configured thresholds
    pub fn is_saturated(&self, config: &Configuration) -> bool {
        self.max_density() >= config.saturate_ratio || self.rp_count > config.saturate_rp
    }
    /// The extent of this gcell along `dir`
    pub fn side(&self, dir: Dir) -> Span {
        self.bbox.side(dir)
    }
}

/// # GCell Grid
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GCellGrid {
    /// Vertical cut lines, ascending; columns = len - 1
    xs: Vec<DbUnits>,
    /// Horizontal cut lines, ascending; rows = len - 1
    ys: Vec<DbUnits>,
    rows: u32,
    cols: u32,
    gcells: Vec<GCell>,
}
impl GCellGrid {
    /// Build the grid from the global router's cut-line arrays.
    /// Each edge starts at the given per-direction capacity.
    pub fn new(
        mut v_cut_lines: Vec<DbUnits>,
        mut h_cut_lines: Vec<DbUnits>,
        depths: usize,
        h_edge_capacity: u32,
        v_edge_capacity: u32,
    ) -> AutoResult<Self> {
        v_cut_lines.sort();
        v_cut_lines.dedup();
        h_cut_lines.sort();
        h_cut_lines.dedup();
        if v_cut_lines.len() < 2 || h_cut_lines.len() < 2 {
            return AutoError::fail("A gcell grid needs at least two cut lines per axis");
        }
        let cols = (v_cut_lines.len() - 1) as u32;
        let rows = (h_cut_lines.len() - 1) as u32;
        let mut gcells = Vec::with_capacity((rows * cols) as usize);
        for row in 0..rows {
            for col in 0..cols {
                let bbox = BoundBox::new(
                    v_cut_lines[col as usize],
                    h_cut_lines[row as usize],
                    v_cut_lines[col as usize + 1],
                    h_cut_lines[row as usize + 1],
                );
                gcells.push(GCell {
                    index: gcells.len(),
                    row,
                    col,
                    bbox,
                    densities: vec![0.0; depths],
                    feedthroughs: vec![0; depths],
                    h_capacity: h_edge_capacity,
                    v_capacity: v_edge_capacity,
                    rp_count: 0,
                    segments: BTreeSet::new(),
                });
            }
        }
        Ok(Self {
            xs: v_cut_lines,
            ys: h_cut_lines,
            rows,
            cols,
            gcells,
        })
    }
    pub fn rows(&self) -> u32 {
        self.rows
    }
    pub fn columns(&self) -> u32 {
        self.cols
    }
    pub fn len(&self) -> usize {
        self.gcells.len()
    }
    pub fn is_empty(&self) -> bool {
        self.gcells.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&GCell> {
        self.gcells.get(index)
    }
    pub fn get_mut(&mut self, index: usize) -> Option<&mut GCell> {
        self.gcells.get_mut(index)
    }
    /// The overall grid extent
    pub fn bounding_box(&self) -> BoundBox {
        BoundBox::new(
            self.xs[0],
            self.ys[0],
            self.xs[self.xs.len() - 1],
            self.ys[self.ys.len() - 1],
        )
    }
    fn flat(&self, row: u32, col: u32) -> usize {
        (row * self.cols + col) as usize
    }
    /// Index of the interval containing `v` in the half-open graduation
    fn graduation(cuts: &[DbUnits], v: DbUnits) -> Option<usize> {
        if v < cuts[0] || v >= cuts[cuts.len() - 1] {
            return None;
        }
        // Binary search for the last cut <= v
        match cuts.binary_search(&v) {
            Ok(i) => Some(i.min(cuts.len() - 2)),
            Err(i) => Some(i - 1),
        }
    }
    /// The gcell containing `point`, honoring half-open cell bounds
    pub fn gcell_at(&self, point: Point) -> Option<&GCell> {
        let col = Self::graduation(&self.xs, point.x)?;
        let row = Self::graduation(&self.ys, point.y)?;
        self.gcells.get(self.flat(row as u32, col as u32))
    }
    /// Index-valued variant of [GCellGrid::gcell_at]
    pub fn index_at(&self, point: Point) -> Option<usize> {
        self.gcell_at(point).map(|g| g.index)
    }
    /// Visit the gcells a wire along `dir` at `axis`, spanning `span`,
    /// crosses — in row-major order.
    pub fn along(&self, dir: Dir, axis: DbUnits, span: Span) -> Vec<usize> {
        let mut out = Vec::new();
        let (u_cuts, v_cuts) = match dir {
            Dir::Horiz => (&self.xs, &self.ys),
            Dir::Vert => (&self.ys, &self.xs),
        };
        let cross = match Self::graduation(v_cuts, axis) {
            Some(i) => i,
            None => return out,
        };
        for i in 0..u_cuts.len() - 1 {
            let cell_span = Span::new(u_cuts[i], u_cuts[i + 1]);
            if cell_span.vmin > span.vmax {
                break;
            }
            if !cell_span.intersects(&span) {
                continue;
            }
            let (row, col) = match dir {
                Dir::Horiz => (cross as u32, i as u32),
                Dir::Vert => (i as u32, cross as u32),
            };
            out.push(self.flat(row, col));
        }
        out
    }
    /// Adjust the capacity of one edge of `index` by `delta`, clamping at
    /// zero. Over-reserving past zero is reported as [AutoError::Overflow].
    pub fn increase_edge_capacity(
        &mut self,
        index: usize,
        dir: Dir,
        delta: i64,
    ) -> AutoResult<()> {
        let gcell = self
            .gcells
            .get_mut(index)
            .ok_or_else(|| AutoError::msg("Edge capacity on unknown gcell"))?;
        let capacity = match dir {
            Dir::Horiz => &mut gcell.h_capacity,
            Dir::Vert => &mut gcell.v_capacity,
        };
        let next = *capacity as i64 + delta;
        if next < 0 {
            *capacity = 0;
            return Err(AutoError::Overflow {
                message: format!("Edge capacity over-reserved on gcell {}", index),
            });
        }
        *capacity = next as u32;
        Ok(())
    }
    /// True when any edge's remaining capacity sits below its reserve
    pub fn check_edge_overflow(&self, h_reserved: u32, v_reserved: u32) -> bool {
        let mut overflow = false;
        for gcell in &self.gcells {
            if gcell.h_capacity < h_reserved || gcell.v_capacity < v_reserved {
                warn!(
                    "Edge overflow on gcell [{},{}]: h={} v={}",
                    gcell.col, gcell.row, gcell.h_capacity, gcell.v_capacity
                );
                overflow = true;
            }
        }
        overflow
    }
    /// Recompute saturation over the whole grid; returns how many gcells
    /// sit above the configured thresholds.
    pub fn update_density(&mut self, config: &Configuration) -> usize {
        self.gcells
            .iter()
            .filter(|g| g.is_saturated(config))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GCellGrid {
        GCellGrid::new(
            vec![DbUnits(0), DbUnits(100), DbUnits(200), DbUnits(300)],
            vec![DbUnits(0), DbUnits(50), DbUnits(100)],
            2,
            4,
            4,
        )
        .unwrap()
    }

    #[test]
    fn half_open_cells() {
        let g = grid();
        assert_eq!(g.rows(), 2);
        assert_eq!(g.columns(), 3);
        // Interior point
        let c = g.gcell_at(Point::new(150, 25)).unwrap();
        assert_eq!((c.row, c.col), (0, 1));
        // On a cut line: belongs to the upper cell
        let c = g.gcell_at(Point::new(100, 50)).unwrap();
        assert_eq!((c.row, c.col), (1, 1));
        // Outside
        assert!(g.gcell_at(Point::new(300, 10)).is_none());
    }
    #[test]
    fn walk_along_a_wire() {
        let g = grid();
        // A horizontal wire at y=25 from x=50 to x=250 crosses all three columns
        let cells = g.along(Dir::Horiz, DbUnits(25), Span::new(50, 250));
        assert_eq!(cells.len(), 3);
        let cols: Vec<u32> = cells.iter().map(|i| g.get(*i).unwrap().col).collect();
        assert_eq!(cols, vec![0, 1, 2]);
    }
    #[test]
    fn edge_capacity_clamps() {
        let mut g = grid();
        g.increase_edge_capacity(0, Dir::Horiz, -3).unwrap();
        assert_eq!(g.get(0).unwrap().h_capacity, 1);
        // Over-reserving clamps at zero and errs
        assert!(g.increase_edge_capacity(0, Dir::Horiz, -5).is_err());
        assert_eq!(g.get(0).unwrap().h_capacity, 0);
        assert!(g.check_edge_overflow(1, 0));
    }
}
