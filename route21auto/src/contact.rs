//!
//! # AutoContacts
//!
//! The augmented contacts of the routing database. An [AutoContact] knows
//! its gcell, its topology class (recomputed from its slave segments on
//! every net invalidation), and the constraint area its position may move
//! within. Slave references are weak back-references by id, resolved
//! through the engine's lookup table.
//!

// Std-Lib
use std::collections::BTreeSet;

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use route21db::{BoundBox, Dir, EntityId, LayerKey, Lifecycle, Point, Span};

/// # Contact Topology Classes
///
/// What the slave-segment arrangement around the contact looks like after
/// revalidation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContactTopology {
    /// Anchors a terminal (routing-pad) connection
    Terminal,
    /// One horizontal and one vertical slave
    Turn,
    /// Two horizontals and one vertical
    HTee,
    /// Two verticals and one horizontal
    VTee,
    /// Two horizontals and two verticals
    Cross,
    /// Via with its lone slave leaving from the bottom layer
    SrcVia,
    /// Via with its lone slave arriving on the top layer
    TgtVia,
}
impl Default for ContactTopology {
    fn default() -> Self {
        ContactTopology::Turn
    }
}

/// # Contact State Flags
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct ContactFlags(pub u32);
impl ContactFlags {
    pub const CREATED: ContactFlags = ContactFlags(1 << 0);
    pub const INVALIDATED: ContactFlags = ContactFlags(1 << 1);
    /// Anchors an external terminal; geometry may not leave the pad area
    pub const TERMINAL: ContactFlags = ContactFlags(1 << 2);
    /// Pinned by the user or a pre-route; never moved
    pub const FIXED: ContactFlags = ContactFlags(1 << 3);

    pub fn contains(&self, other: ContactFlags) -> bool {
        (self.0 & other.0) == other.0
    }
    pub fn set(&mut self, other: ContactFlags) {
        self.0 |= other.0;
    }
    pub fn unset(&mut self, other: ContactFlags) {
        self.0 &= !other.0;
    }
}
impl std::ops::BitOr for ContactFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// # AutoContact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoContact {
    /// Base-entity identifier
    pub id: EntityId,
    /// Owning net
    pub net: EntityId,
    /// Index of the gcell this contact lives in
    pub gcell: usize,
    /// Contact layer
    pub layer: LayerKey,
    /// Current position
    pub position: Point,
    /// Topology class, valid after revalidation
    pub topology: ContactTopology,
    /// Lowest routing depth among the slave segments
    pub min_depth: u8,
    /// Highest routing depth among the slave segments
    pub max_depth: u8,
    /// State flags
    pub flags: ContactFlags,
    /// Lifecycle state
    pub state: Lifecycle,
    /// Slave segments, weak back-references by id
    pub slaves: BTreeSet<EntityId>,
    /// Area the position is allowed to move within
    pub constraint: BoundBox,
}
impl AutoContact {
    pub fn is_terminal(&self) -> bool {
        self.flags.contains(ContactFlags::TERMINAL)
            || matches!(self.topology, ContactTopology::Terminal)
    }
    pub fn is_turn(&self) -> bool {
        matches!(self.topology, ContactTopology::Turn)
    }
    pub fn is_tee(&self) -> bool {
        matches!(self.topology, ContactTopology::HTee | ContactTopology::VTee)
    }
    pub fn is_cross(&self) -> bool {
        matches!(self.topology, ContactTopology::Cross)
    }
    pub fn is_fixed(&self) -> bool {
        self.flags.contains(ContactFlags::FIXED)
    }
    /// A contact may be destroyed once its last slave segment is gone
    pub fn can_destroy(&self) -> bool {
        self.slaves.is_empty()
    }
    /// The constraint interval along direction `dir`
    pub fn u_constraints(&self, dir: Dir) -> Span {
        self.constraint.side(dir)
    }
    /// Whether the aligned chain of `dir`-segments continues through this
    /// contact: it does on tees of the matching arm and on crosses.
    pub fn continues_chain(&self, dir: Dir) -> bool {
        match (self.topology, dir) {
            (ContactTopology::HTee, Dir::Horiz) => true,
            (ContactTopology::VTee, Dir::Vert) => true,
            (ContactTopology::Cross, _) => true,
            _ => false,
        }
    }
}
