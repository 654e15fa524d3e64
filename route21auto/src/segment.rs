//!
//! # AutoSegments
//!
//! The augmented wire segments of the routing database. An [AutoSegment]
//! carries the full flag set driving canonicalisation, terminal ranking,
//! spin tracking and ripup ordering, plus its optimal-axis interval and
//! dogleg lineage. Endpoint contacts are strong references by id; the
//! engine's lookup table resolves them.
//!

// Std-Lib
use std::cmp::Ordering;

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use route21db::{DbUnits, Dir, EntityId, Lifecycle, Span};

/// # Segment Flags
///
/// Exactly one of {`HORIZONTAL`, vertical (flag clear)}; exactly one of
/// {`SPIN_TOP`, `SPIN_BOTTOM`, neither}; exactly one of {`CANONICAL`,
/// secondary (flag clear)} per segment, and exactly one `CANONICAL` per
/// aligned chain.
#[derive(
    Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct SegFlags(pub u32);
impl SegFlags {
    pub const CREATED: SegFlags = SegFlags(1 << 0);
    pub const INVALIDATED: SegFlags = SegFlags(1 << 1);
    pub const INVALIDATED_SOURCE: SegFlags = SegFlags(1 << 2);
    pub const INVALIDATED_TARGET: SegFlags = SegFlags(1 << 3);
    pub const INVALIDATED_LAYER: SegFlags = SegFlags(1 << 4);
    pub const HORIZONTAL: SegFlags = SegFlags(1 << 5);
    pub const SOURCE_TERMINAL: SegFlags = SegFlags(1 << 6);
    pub const TARGET_TERMINAL: SegFlags = SegFlags(1 << 7);
    pub const WEAK_TERMINAL_1: SegFlags = SegFlags(1 << 8);
    pub const WEAK_TERMINAL_2: SegFlags = SegFlags(1 << 9);
    pub const STRONG_TERMINAL: SegFlags = SegFlags(1 << 10);
    pub const CANONICAL: SegFlags = SegFlags(1 << 11);
    pub const GLOBAL: SegFlags = SegFlags(1 << 12);
    pub const WEAK_GLOBAL: SegFlags = SegFlags(1 << 13);
    pub const NOT_ALIGNED: SegFlags = SegFlags(1 << 14);
    pub const NOT_SOURCE_ALIGNED: SegFlags = SegFlags(1 << 15);
    pub const NOT_TARGET_ALIGNED: SegFlags = SegFlags(1 << 16);
    pub const SLACKENED: SegFlags = SegFlags(1 << 17);
    pub const REDUCED: SegFlags = SegFlags(1 << 18);
    pub const FIXED: SegFlags = SegFlags(1 << 19);
    pub const USER_DEFINED: SegFlags = SegFlags(1 << 20);
    pub const AXIS_SET: SegFlags = SegFlags(1 << 21);
    pub const UNSET_AXIS: SegFlags = SegFlags(1 << 22);
    pub const SPIN_TOP: SegFlags = SegFlags(1 << 23);
    pub const SPIN_BOTTOM: SegFlags = SegFlags(1 << 24);
    pub const SOURCE_TOP: SegFlags = SegFlags(1 << 25);
    pub const SOURCE_BOTTOM: SegFlags = SegFlags(1 << 26);
    pub const TARGET_TOP: SegFlags = SegFlags(1 << 27);
    pub const TARGET_BOTTOM: SegFlags = SegFlags(1 << 28);
    pub const DOGLEG: SegFlags = SegFlags(1 << 29);

    /// All the invalidation flags cleared by revalidation
    pub const INVALIDATED_ANY: SegFlags = SegFlags(
        Self::INVALIDATED.0
            | Self::INVALIDATED_SOURCE.0
            | Self::INVALIDATED_TARGET.0
            | Self::INVALIDATED_LAYER.0
            | Self::CREATED.0,
    );
    /// The spin pair
    pub const DEPTH_SPIN: SegFlags = SegFlags(Self::SPIN_TOP.0 | Self::SPIN_BOTTOM.0);

    pub fn contains(&self, other: SegFlags) -> bool {
        (self.0 & other.0) == other.0
    }
    pub fn intersects(&self, other: SegFlags) -> bool {
        (self.0 & other.0) != 0
    }
    pub fn set(&mut self, other: SegFlags) {
        self.0 |= other.0;
    }
    pub fn unset(&mut self, other: SegFlags) {
        self.0 &= !other.0;
    }
}
impl std::ops::BitOr for SegFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::fmt::Debug for SegFlags {
    /// One letter per raised flag, in a fixed order
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (flag, c) in [
            (Self::FIXED, 'F'),
            (Self::CANONICAL, 'C'),
            (Self::HORIZONTAL, 'h'),
            (Self::GLOBAL, 'g'),
            (Self::WEAK_GLOBAL, 'w'),
            (Self::STRONG_TERMINAL, 'T'),
            (Self::WEAK_TERMINAL_1, '1'),
            (Self::WEAK_TERMINAL_2, '2'),
            (Self::NOT_ALIGNED, 'A'),
            (Self::SLACKENED, 'S'),
            (Self::REDUCED, 'r'),
            (Self::SPIN_TOP, 't'),
            (Self::SPIN_BOTTOM, 'b'),
            (Self::DOGLEG, 'd'),
            (Self::INVALIDATED, 'i'),
        ] {
            write!(f, "{}", if self.contains(flag) { c } else { '-' })?;
        }
        Ok(())
    }
}

/// # AutoSegment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSegment {
    /// Base-entity identifier
    pub id: EntityId,
    /// Owning net
    pub net: EntityId,
    /// State flags
    pub flags: SegFlags,
    /// Routing depth (gauge index of the layer)
    pub depth: u8,
    /// The off-direction coordinate the wire sits on
    pub axis: DbUnits,
    /// Source contact (strong reference by id)
    pub source: EntityId,
    /// Target contact (strong reference by id)
    pub target: EntityId,
    /// Low endpoint along the travel direction
    pub source_position: DbUnits,
    /// High endpoint along the travel direction
    pub target_position: DbUnits,
    /// Optimal axis interval, recomputed per revalidation
    pub optimal: Span,
    /// User-imposed axis constraints
    pub user_constraints: Span,
    /// Originating segment of a dogleg break
    pub parent: Option<EntityId>,
    /// Reduced perpandicular neighbours
    pub reduceds: u32,
    /// Lifecycle state
    pub state: Lifecycle,
}
impl AutoSegment {
    /// Travel direction
    pub fn dir(&self) -> Dir {
        if self.flags.contains(SegFlags::HORIZONTAL) {
            Dir::Horiz
        } else {
            Dir::Vert
        }
    }
    pub fn is_horizontal(&self) -> bool {
        self.flags.contains(SegFlags::HORIZONTAL)
    }
    pub fn is_canonical(&self) -> bool {
        self.flags.contains(SegFlags::CANONICAL)
    }
    pub fn is_global(&self) -> bool {
        self.flags.contains(SegFlags::GLOBAL)
    }
    pub fn is_fixed(&self) -> bool {
        self.flags.contains(SegFlags::FIXED)
    }
    pub fn is_invalidated(&self) -> bool {
        self.flags.contains(SegFlags::INVALIDATED)
    }
    pub fn is_not_aligned(&self) -> bool {
        self.flags.contains(SegFlags::NOT_ALIGNED)
    }
    pub fn is_reduced(&self) -> bool {
        self.flags.contains(SegFlags::REDUCED)
    }
    pub fn is_strong_terminal(&self) -> bool {
        self.flags.contains(SegFlags::STRONG_TERMINAL)
    }
    pub fn is_spin_top(&self) -> bool {
        self.flags.contains(SegFlags::SPIN_TOP)
    }
    pub fn is_spin_bottom(&self) -> bool {
        self.flags.contains(SegFlags::SPIN_BOTTOM)
    }
    pub fn is_spin_top_or_bottom(&self) -> bool {
        self.flags.intersects(SegFlags::DEPTH_SPIN)
    }
    pub fn has_unset_axis(&self) -> bool {
        self.flags.contains(SegFlags::UNSET_AXIS)
    }
    /// The wire's extent along its travel direction
    pub fn span_u(&self) -> Span {
        Span::new(self.source_position, self.target_position)
    }
    /// Wire length
    pub fn length(&self) -> DbUnits {
        (self.target_position - self.source_position).abs()
    }
    /// Low coordinate along the travel direction
    pub fn source_u(&self) -> DbUnits {
        self.source_position.min(self.target_position)
    }
    /// The other endpoint's contact id
    pub fn opposite(&self, anchor: EntityId) -> Option<EntityId> {
        if anchor == self.source {
            Some(self.target)
        } else if anchor == self.target {
            Some(self.source)
        } else {
            None
        }
    }
}

/// Total order for canonical-chain dumps and ripup scheduling:
/// (depth asc, source-u asc, length desc, axis asc, id asc).
pub fn compare_by_depth_length(lhs: &AutoSegment, rhs: &AutoSegment) -> Ordering {
    lhs.depth
        .cmp(&rhs.depth)
        .then(lhs.source_u().cmp(&rhs.source_u()))
        .then(rhs.length().cmp(&lhs.length()))
        .then(lhs.axis.cmp(&rhs.axis))
        .then(lhs.id.cmp(&rhs.id))
}

/// Total order for per-track walks: (depth asc, axis asc, source-u asc,
/// id asc).
pub fn compare_by_depth_axis(lhs: &AutoSegment, rhs: &AutoSegment) -> Ordering {
    lhs.depth
        .cmp(&rhs.depth)
        .then(lhs.axis.cmp(&rhs.axis))
        .then(lhs.source_u().cmp(&rhs.source_u()))
        .then(lhs.id.cmp(&rhs.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u64, depth: u8, source: i64, target: i64, axis: i64) -> AutoSegment {
        AutoSegment {
            id: EntityId(id),
            net: EntityId(0),
            flags: SegFlags::HORIZONTAL,
            depth,
            axis: DbUnits(axis),
            source: EntityId(0),
            target: EntityId(0),
            source_position: DbUnits(source),
            target_position: DbUnits(target),
            optimal: Span::empty(),
            user_constraints: Span::new(DbUnits::MIN, DbUnits::MAX),
            parent: None,
            reduceds: 0,
            state: Lifecycle::Alive,
        }
    }

    #[test]
    fn depth_length_order() {
        let a = seg(1, 0, 0, 100, 50); // Longest first among equals
        let b = seg(2, 0, 0, 50, 50);
        let c = seg(3, 1, 0, 100, 50); // Deeper sorts later
        let mut v = vec![&c, &b, &a];
        v.sort_by(|l, r| compare_by_depth_length(l, r));
        assert_eq!(
            v.iter().map(|s| s.id.0).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
    #[test]
    fn flags_render() {
        let mut flags = SegFlags::HORIZONTAL;
        flags.set(SegFlags::CANONICAL);
        assert_eq!(format!("{:?}", flags), "-Ch------------");
    }
}
