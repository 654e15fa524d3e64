//!
//! # Equipotentials
//!
//! An [Equipotential] is the payload carried by a union-find root: the
//! set of component occurrences electrically connected through per-layer
//! overlap, the multiset of nets they belong to, and the classification
//! derived from those nets once the sweep has finished.
//!

// Std-Lib
use std::collections::{BTreeMap, BTreeSet};

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use crate::error::{ExtractError, ExtractResult};
use route21db::{BoundBox, Cell, EntityId, NetDir, NetType, Occurrence};

/// Index of an [Equipotential] inside its [EquiPool]
pub type EquiId = u32;

/// # Equipotential State Flags
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct EquiFlags(pub u32);
impl EquiFlags {
    /// No contributing net is visible at the top level
    pub const BURIED: EquiFlags = EquiFlags(1 << 0);
    /// At least one contributing net is external
    pub const EXTERNAL: EquiFlags = EquiFlags(1 << 1);
    /// Carries a supply or clock net
    pub const GLOBAL: EquiFlags = EquiFlags(1 << 2);
    /// Classified as power
    pub const POWER: EquiFlags = EquiFlags(1 << 3);
    /// Classified as ground
    pub const GROUND: EquiFlags = EquiFlags(1 << 4);
    /// Power and ground both contribute
    pub const HAS_FUSED: EquiFlags = EquiFlags(1 << 5);
    /// Folded into another equipotential; detached from all indices
    pub const MERGED: EquiFlags = EquiFlags(1 << 6);

    pub fn contains(&self, other: EquiFlags) -> bool {
        (self.0 & other.0) == other.0
    }
    pub fn set(&mut self, other: EquiFlags) {
        self.0 |= other.0;
    }
    /// Compact rendering for traces, one letter per raised flag
    pub fn as_string(&self) -> String {
        let mut s = String::new();
        for (flag, c) in [
            (Self::BURIED, 'b'),
            (Self::EXTERNAL, 'e'),
            (Self::GLOBAL, 'g'),
            (Self::POWER, 'P'),
            (Self::GROUND, 'G'),
            (Self::HAS_FUSED, 'f'),
            (Self::MERGED, 'm'),
        ] {
            s.push(if self.contains(flag) { c } else { '-' });
        }
        s
    }
}

/// # Short-Circuit Evidence
///
/// Two distinct externally-driven nets found in the same equipotential,
/// with the bounding-box intersection that witnessed their fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortCircuit {
    pub net_a: EntityId,
    pub net_b: EntityId,
    pub witness: BoundBox,
}

/// # Equipotential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipotential {
    /// Index in the owning pool
    pub id: EquiId,
    /// Union of all contributing tile boxes
    pub bbox: BoundBox,
    /// Contributing nets: id ⇒ (external occurrence count, internal count)
    pub nets: BTreeMap<EntityId, (u32, u32)>,
    /// Contributing component occurrences
    pub components: BTreeSet<Occurrence>,
    /// Contributing child equipotentials, as occurrences of their
    /// representative components
    pub childs: BTreeSet<Occurrence>,
    /// Canonical name, fixed by [Equipotential::consolidate]
    pub name: String,
    /// Merged net type
    pub ntype: NetType,
    /// Or-merged direction
    pub direction: NetDir,
    /// State flags
    pub flags: EquiFlags,
    /// Short-circuit evidence records
    pub shorts: Vec<ShortCircuit>,
}
impl Default for Equipotential {
    fn default() -> Self {
        Self {
            id: 0,
            bbox: BoundBox::empty(),
            nets: BTreeMap::new(),
            components: BTreeSet::new(),
            childs: BTreeSet::new(),
            name: String::new(),
            ntype: NetType::default(),
            direction: NetDir::default(),
            flags: EquiFlags::default(),
            shorts: Vec::new(),
        }
    }
}
impl Equipotential {
    pub fn is_merged(&self) -> bool {
        self.flags.contains(EquiFlags::MERGED)
    }
    pub fn is_supply(&self) -> bool {
        self.flags.contains(EquiFlags::POWER) || self.flags.contains(EquiFlags::GROUND)
    }
    pub fn has_shorts(&self) -> bool {
        !self.shorts.is_empty()
    }
    /// The lex-smallest external contributing net, if any
    fn smallest_external(&self, cell: &Cell) -> Option<EntityId> {
        self.nets
            .iter()
            .filter(|(_, (ext, _))| *ext > 0)
            .filter_map(|(id, _)| cell.net(*id).map(|n| (n.name.clone(), *id)))
            .min()
            .map(|(_, id)| id)
    }
    /// Fold one occurrence into this equipotential. Joining an
    /// externally-driven net to a different one already present records
    /// short-circuit evidence, witnessed by the box overlap.
    pub fn add(
        &mut self,
        occurrence: Occurrence,
        bbox: &BoundBox,
        net: EntityId,
        external: bool,
        child_equi: bool,
    ) {
        if external {
            let prior = self
                .nets
                .iter()
                .find(|(id, (ext, _))| **id != net && *ext > 0)
                .map(|(id, _)| *id);
            if let Some(other) = prior {
                self.record_short(net, other, self.bbox.intersection(bbox));
            }
        }
        self.bbox = self.bbox.union(bbox);
        let entry = self.nets.entry(net).or_insert((0, 0));
        if external {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
        if child_equi {
            self.childs.insert(occurrence);
        } else {
            self.components.insert(occurrence);
        }
    }
    /// Append a [ShortCircuit] record, once per net pair
    fn record_short(&mut self, a: EntityId, b: EntityId, witness: BoundBox) {
        let (net_a, net_b) = (a.min(b), a.max(b));
        if self
            .shorts
            .iter()
            .any(|s| s.net_a == net_a && s.net_b == net_b)
        {
            return;
        }
        self.shorts.push(ShortCircuit {
            net_a,
            net_b,
            witness,
        });
    }
    /// Finalise name, type, direction and flags from the contributing nets.
    /// Run once per equipotential after the sweep completes.
    pub fn consolidate(&mut self, cell: &Cell) -> ExtractResult<()> {
        let mut has_power = false;
        let mut has_ground = false;
        let mut has_clock = false;
        let mut external = false;
        for (id, (ext, _)) in &self.nets {
            // Deep nets live in sub-cells and do not classify the parent
            let net = match cell.net(*id) {
                Some(net) => net,
                None => continue,
            };
            match net.ntype {
                NetType::Power => has_power = true,
                NetType::Ground => has_ground = true,
                NetType::Clock => has_clock = true,
                _ => (),
            }
            self.direction |= net.direction;
            if *ext > 0 {
                external = true;
            }
        }
        self.ntype = if has_power {
            NetType::Power
        } else if has_ground {
            NetType::Ground
        } else if has_clock {
            NetType::Clock
        } else {
            NetType::Logical
        };
        if has_power {
            self.flags.set(EquiFlags::POWER);
        }
        if has_ground {
            self.flags.set(EquiFlags::GROUND);
        }
        if has_power && has_ground {
            self.flags.set(EquiFlags::HAS_FUSED);
        }
        if self.ntype.is_supply() || has_clock {
            self.flags.set(EquiFlags::GLOBAL);
        }
        if external {
            self.flags.set(EquiFlags::EXTERNAL);
        } else {
            self.flags.set(EquiFlags::BURIED);
        }
        self.name = match self.smallest_external(cell) {
            Some(id) => cell.net(id).unwrap().name.clone(),
            None => format!("tmp_equi_{}", self.id),
        };
        Ok(())
    }
}

/// # Equipotential Pool
///
/// Arena of all equipotentials of one extraction run. Merged entries stay
/// in place, flagged [EquiFlags::MERGED], so ids remain stable.
#[derive(Debug, Default)]
pub struct EquiPool {
    equis: Vec<Equipotential>,
}
impl EquiPool {
    pub fn new() -> Self {
        Self::default()
    }
    /// Allocate a fresh, empty equipotential
    pub fn alloc(&mut self) -> EquiId {
        let id = self.equis.len() as EquiId;
        self.equis.push(Equipotential {
            id,
            bbox: BoundBox::empty(),
            ..Default::default()
        });
        id
    }
    pub fn get(&self, id: EquiId) -> &Equipotential {
        &self.equis[id as usize]
    }
    pub fn get_mut(&mut self, id: EquiId) -> &mut Equipotential {
        &mut self.equis[id as usize]
    }
    /// Iterate over all live (non-merged) equipotentials, id-ascending
    pub fn live(&self) -> impl Iterator<Item = &Equipotential> {
        self.equis.iter().filter(|e| !e.is_merged())
    }
    pub fn len(&self) -> usize {
        self.equis.len()
    }
    pub fn is_empty(&self) -> bool {
        self.equis.is_empty()
    }
    /// Fold `victim` into `survivor`. When both sides already carry
    /// distinct externally-driven nets, record short-circuit evidence on
    /// the survivor.
    pub fn merge(&mut self, survivor: EquiId, victim: EquiId, cell: &Cell) -> ExtractResult<()> {
        if survivor == victim {
            return Ok(());
        }
        let (a, b) = (survivor as usize, victim as usize);
        let (head, tail) = if a < b {
            let (h, t) = self.equis.split_at_mut(b);
            (&mut h[a], &mut t[0])
        } else {
            let (h, t) = self.equis.split_at_mut(a);
            (&mut t[0], &mut h[b])
        };
        if tail.is_merged() {
            return Err(ExtractError::bug(
                "Merging an equipotential that was already merged",
            ));
        }
        // Short evidence: one externally-driven net on each side, differing.
        let ext_a = head.smallest_external(cell);
        let ext_b = tail.smallest_external(cell);
        if let (Some(na), Some(nb)) = (ext_a, ext_b) {
            if na != nb {
                let witness = head.bbox.intersection(&tail.bbox);
                head.record_short(na, nb, witness);
            }
        }
        head.bbox = head.bbox.union(&tail.bbox);
        for (net, (ext, int)) in &tail.nets {
            let entry = head.nets.entry(*net).or_insert((0, 0));
            entry.0 += ext;
            entry.1 += int;
        }
        head.components.append(&mut tail.components);
        head.childs.append(&mut tail.childs);
        for s in tail.shorts.drain(..) {
            head.record_short(s.net_a, s.net_b, s.witness);
        }
        tail.flags.set(EquiFlags::MERGED);
        Ok(())
    }
}
