//!
//! # Geometric Primitives
//!
//! [Point]s, [Span]s, [BoundBox]es and [Transform]s, all in database units,
//! plus the rectilinear-polygon decomposition helper used when loading
//! orthogonal shapes into the extractor.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::error::{DbError, DbResult};
use crate::units::DbUnits;

/// # Point in two-dimensional layout-space
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Point {
    pub x: DbUnits,
    pub y: DbUnits,
}
impl Point {
    /// Create a new [Point] from (x,y) coordinates
    pub fn new(x: impl Into<DbUnits>, y: impl Into<DbUnits>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }
    /// Create a new [Point] which serves as an offset in direction `dir`
    pub fn offset(val: DbUnits, dir: Dir) -> Self {
        match dir {
            Dir::Horiz => Self { x: val, y: DbUnits(0) },
            Dir::Vert => Self { x: DbUnits(0), y: val },
        }
    }
    /// Create a new point shifted by `p` in both dimensions
    pub fn shift(&self, p: &Point) -> Point {
        Point {
            x: p.x + self.x,
            y: p.y + self.y,
        }
    }
    /// Get the coordinate associated with direction `dir`
    pub fn coord(&self, dir: Dir) -> DbUnits {
        match dir {
            Dir::Horiz => self.x,
            Dir::Vert => self.y,
        }
    }
}

/// Direction Enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Dir {
    Horiz,
    Vert,
}
impl Dir {
    /// Whichever direction we are, return the other one.
    pub fn other(&self) -> Self {
        match self {
            Self::Horiz => Self::Vert,
            Self::Vert => Self::Horiz,
        }
    }
}

/// # One-Dimensional Closed Interval
///
/// `vmin` and `vmax` bound the interval on the axis at hand.
/// Intersection is *closed* on both ends: two spans sharing only an endpoint
/// do intersect. An inverted pair represents the empty span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Span {
    pub vmin: DbUnits,
    pub vmax: DbUnits,
}
impl Span {
    /// Create a new [Span]. Order of the two bounds is normalised.
    pub fn new(a: impl Into<DbUnits>, b: impl Into<DbUnits>) -> Self {
        let (a, b) = (a.into(), b.into());
        Self {
            vmin: a.min(b),
            vmax: a.max(b),
        }
    }
    /// Create the empty [Span]
    pub fn empty() -> Self {
        Self {
            vmin: DbUnits::MAX,
            vmax: DbUnits::MIN,
        }
    }
    /// Boolean indication of emptiness
    pub fn is_empty(&self) -> bool {
        self.vmin > self.vmax
    }
    /// Interval length. Zero for empty and degenerate spans.
    pub fn size(&self) -> DbUnits {
        if self.is_empty() {
            return DbUnits(0);
        }
        self.vmax - self.vmin
    }
    /// Boolean indication of whether `v` lies inside (closed bounds)
    pub fn contains(&self, v: DbUnits) -> bool {
        self.vmin <= v && v <= self.vmax
    }
    /// Closed-interval intersection test
    pub fn intersects(&self, other: &Span) -> bool {
        !self.is_empty() && !other.is_empty() && self.vmin <= other.vmax && other.vmin <= self.vmax
    }
    /// Compute the intersection with `other`. Empty spans propagate.
    pub fn intersection(&self, other: &Span) -> Span {
        if !self.intersects(other) {
            return Span::empty();
        }
        Span {
            vmin: self.vmin.max(other.vmin),
            vmax: self.vmax.min(other.vmax),
        }
    }
    /// Compute the union-hull with `other`
    pub fn merge(&self, other: &Span) -> Span {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Span {
            vmin: self.vmin.min(other.vmin),
            vmax: self.vmax.max(other.vmax),
        }
    }
}

/// # Rectangular Bounding Box
///
/// Points `p0` and `p1` represent opposite corners of a bounding rectangle.
/// `p0` is always closest to negative-infinity, in both x and y,
/// and `p1` is always closest to positive-infinity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BoundBox {
    pub p0: Point,
    pub p1: Point,
}
impl BoundBox {
    /// Create a new [BoundBox] from its four coordinates.
    /// Order along each axis is normalised.
    pub fn new(
        x0: impl Into<DbUnits>,
        y0: impl Into<DbUnits>,
        x1: impl Into<DbUnits>,
        y1: impl Into<DbUnits>,
    ) -> Self {
        Self::from_points(Point::new(x0, y0), Point::new(x1, y1))
    }
    /// Create a new [BoundBox] from two points
    pub fn from_points(p0: Point, p1: Point) -> Self {
        Self {
            p0: Point::new(p0.x.min(p1.x), p0.y.min(p1.y)),
            p1: Point::new(p0.x.max(p1.x), p0.y.max(p1.y)),
        }
    }
    /// Create a new [BoundBox] from a single [Point], having zero area.
    pub fn from_point(pt: Point) -> Self {
        Self { p0: pt, p1: pt }
    }
    /// Create an empty, otherwise invalid [BoundBox]
    pub fn empty() -> Self {
        Self {
            p0: Point::new(DbUnits::MAX, DbUnits::MAX),
            p1: Point::new(DbUnits::MIN, DbUnits::MIN),
        }
    }
    /// Boolean indication of whether a box is empty
    pub fn is_empty(&self) -> bool {
        self.p0.x > self.p1.x || self.p0.y > self.p1.y
    }
    /// Boolean indication of whether [Point] `pt` lies inside our box.
    pub fn contains(&self, pt: &Point) -> bool {
        self.p0.x <= pt.x && self.p1.x >= pt.x && self.p0.y <= pt.y && self.p1.y >= pt.y
    }
    /// Closed-interval overlap test on both axes. Empty boxes never intersect.
    pub fn intersects(&self, other: &BoundBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.p0.x <= other.p1.x
            && other.p0.x <= self.p1.x
            && self.p0.y <= other.p1.y
            && other.p0.y <= self.p1.y
    }
    /// Compute the intersection with `bbox`. Empty boxes propagate through.
    pub fn intersection(&self, bbox: &BoundBox) -> BoundBox {
        let pmin = Point::new(self.p0.x.max(bbox.p0.x), self.p0.y.max(bbox.p0.y));
        let pmax = Point::new(self.p1.x.min(bbox.p1.x), self.p1.y.min(bbox.p1.y));
        if pmin.x > pmax.x || pmin.y > pmax.y {
            return BoundBox::empty();
        }
        BoundBox { p0: pmin, p1: pmax }
    }
    /// Compute the union-hull with `bbox`.
    pub fn union(&self, bbox: &BoundBox) -> BoundBox {
        if self.is_empty() {
            return *bbox;
        }
        if bbox.is_empty() {
            return *self;
        }
        BoundBox {
            p0: Point::new(self.p0.x.min(bbox.p0.x), self.p0.y.min(bbox.p0.y)),
            p1: Point::new(self.p1.x.max(bbox.p1.x), self.p1.y.max(bbox.p1.y)),
        }
    }
    /// Expand in all directions by `delta`
    pub fn expand(&mut self, delta: DbUnits) {
        self.p0.x -= delta;
        self.p0.y -= delta;
        self.p1.x += delta;
        self.p1.y += delta;
    }
    /// Get the box's size as an (x,y) tuple
    pub fn size(&self) -> (DbUnits, DbUnits) {
        (self.p1.x - self.p0.x, self.p1.y - self.p0.y)
    }
    /// Get the center [Point]
    pub fn center(&self) -> Point {
        Point::new(
            (self.p0.x + self.p1.x) / 2,
            (self.p0.y + self.p1.y) / 2,
        )
    }
    /// Get the extent along direction `dir` as a [Span]
    pub fn side(&self, dir: Dir) -> Span {
        match dir {
            Dir::Horiz => Span::new(self.p0.x, self.p1.x),
            Dir::Vert => Span::new(self.p0.y, self.p1.y),
        }
    }
}

/// # Orientation
///
/// One of the eight axis-preserving placements of an instance:
/// four quarter-turn rotations, optionally preceded by a mirror about
/// the y-axis (x ⇒ -x).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Orient {
    /// Counter-clockwise quarter turns, 0..=3
    pub quarters: u8,
    /// Mirror about the y-axis, applied before rotation
    pub mirrored: bool,
}
impl Orient {
    /// The identity orientation
    pub fn identity() -> Self {
        Self::default()
    }
    /// Apply to a [Point] interpreted as a vector (no translation)
    pub fn apply(&self, pt: Point) -> Point {
        let mut x = pt.x;
        let y = pt.y;
        if self.mirrored {
            x = -x;
        }
        match self.quarters % 4 {
            0 => Point { x, y },
            1 => Point { x: -y, y: x },
            2 => Point { x: -x, y: -y },
            3 => Point { x: y, y: -x },
            _ => unreachable!(),
        }
    }
    /// Compose with another orientation; `self` is applied *after* `first`.
    pub fn compose(&self, first: &Orient) -> Orient {
        let quarters = if self.mirrored {
            (self.quarters + 4 - first.quarters) % 4
        } else {
            (self.quarters + first.quarters) % 4
        };
        Orient {
            quarters,
            mirrored: self.mirrored ^ first.mirrored,
        }
    }
}

/// # Placement Transform
///
/// Orientation followed by translation. Composition order matches the
/// instance hierarchy: the parent's transform is applied after the child's.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transform {
    pub orient: Orient,
    pub offset: Point,
}
impl Transform {
    /// The identity transform
    pub fn identity() -> Self {
        Self::default()
    }
    /// A pure translation
    pub fn shift(offset: Point) -> Self {
        Self {
            orient: Orient::identity(),
            offset,
        }
    }
    /// Apply to a [Point]
    pub fn apply(&self, pt: Point) -> Point {
        self.orient.apply(pt).shift(&self.offset)
    }
    /// Apply to a [BoundBox]; the result is re-normalised.
    pub fn apply_box(&self, bb: &BoundBox) -> BoundBox {
        if bb.is_empty() {
            return *bb;
        }
        BoundBox::from_points(self.apply(bb.p0), self.apply(bb.p1))
    }
    /// Compose with `first`; `self` is applied *after* `first`.
    pub fn compose(&self, first: &Transform) -> Transform {
        Transform {
            orient: self.orient.compose(&first.orient),
            offset: self.orient.apply(first.offset).shift(&self.offset),
        }
    }
}

/// # Rectilinear Decomposition
///
/// Slice a closed orthogonal polygon into axis-aligned rectangles, one
/// horizontal slab per distinct y-band. The vertex list must alternate
/// horizontal and vertical edges; the closing edge from the last vertex back
/// to the first is implied.
///
/// Diagonal edges and outlines that touch themselves at a corner are
/// refused: both break the even-crossing pairing the slicer relies on.
pub fn decompose_rectilinear(pts: &[Point]) -> DbResult<Vec<BoundBox>> {
    if pts.len() < 4 {
        return DbError::fail("Rectilinear outline requires at least four vertices");
    }
    // Validate: every edge axis-aligned, no repeated vertex (self-touching corner).
    for i in 0..pts.len() {
        let a = &pts[i];
        let b = &pts[(i + 1) % pts.len()];
        if a.x != b.x && a.y != b.y {
            return DbError::fail(format!(
                "Rectilinear outline has a non-Manhattan edge at vertex {}",
                i
            ));
        }
        if a == b {
            return DbError::fail(format!("Rectilinear outline has a null edge at vertex {}", i));
        }
        for j in (i + 1)..pts.len() {
            if pts[i] == pts[j] {
                return DbError::fail(format!(
                    "Rectilinear outline touches itself at {:?}",
                    pts[i]
                ));
            }
        }
    }
    // Collect the distinct y-cuts, ascending.
    let mut ys: Vec<DbUnits> = pts.iter().map(|p| p.y).collect();
    ys.sort();
    ys.dedup();

    let mut boxes = Vec::new();
    for band in ys.windows(2) {
        let (ylo, yhi) = (band[0], band[1]);
        // Vertical edges crossing this band, by x ascending.
        let mut xs = Vec::new();
        for i in 0..pts.len() {
            let a = &pts[i];
            let b = &pts[(i + 1) % pts.len()];
            if a.x != b.x {
                continue;
            }
            let edge = Span::new(a.y, b.y);
            if edge.vmin <= ylo && yhi <= edge.vmax {
                xs.push(a.x);
            }
        }
        xs.sort();
        if xs.len() % 2 != 0 {
            return DbError::fail("Rectilinear outline is not closed");
        }
        // Parity fill: successive pairs bound the interior.
        for pair in xs.chunks(2) {
            boxes.push(BoundBox::new(pair[0], ylo, pair[1], yhi));
        }
    }
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_laws() {
        let a = Span::new(0, 10);
        let b = Span::new(10, 20);
        let c = Span::new(11, 20);
        assert!(a.intersects(&b)); // Closed ends: touching endpoints intersect
        assert!(!a.intersects(&c));
        assert!(Span::empty().intersection(&a).is_empty());
        assert_eq!(a.merge(&c), Span::new(0, 20));
    }
    #[test]
    fn empty_box_propagates() {
        let bb = BoundBox::new(0, 0, 10, 10);
        assert!(BoundBox::empty().intersection(&bb).is_empty());
        assert_eq!(BoundBox::empty().union(&bb), bb);
    }
    #[test]
    fn transform_composition() {
        let r90 = Transform {
            orient: Orient {
                quarters: 1,
                mirrored: false,
            },
            offset: Point::new(100, 0),
        };
        let shift = Transform::shift(Point::new(10, 20));
        let composed = r90.compose(&shift);
        // Composed apply must equal sequential application
        let pt = Point::new(3, 4);
        assert_eq!(composed.apply(pt), r90.apply(shift.apply(pt)));
    }
    #[test]
    fn decompose_ell() {
        // An L: 100x20 bar with a 20x40 riser on its right end
        let pts = [
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 60),
            Point::new(80, 60),
            Point::new(80, 20),
            Point::new(0, 20),
        ];
        let boxes = decompose_rectilinear(&pts).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], BoundBox::new(0, 0, 100, 20));
        assert_eq!(boxes[1], BoundBox::new(80, 20, 100, 60));
    }
    #[test]
    fn decompose_rejects_diagonal() {
        let pts = [
            Point::new(0, 0),
            Point::new(10, 10),
            Point::new(10, 20),
            Point::new(0, 20),
        ];
        assert!(decompose_rectilinear(&pts).is_err());
    }
    #[test]
    fn decompose_rejects_self_touch() {
        // Bow-tie touching itself at (10, 10)
        let pts = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(20, 10),
            Point::new(20, 20),
            Point::new(10, 20),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert!(decompose_rectilinear(&pts).is_err());
    }
}
