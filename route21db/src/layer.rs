//!
//! # Layer Model
//!
//! Mask layers come in three flavors: *basic* layers owning a single bit of
//! the technology-wide [LayerMask], *regular* conducting layers wrapping one
//! basic layer with routing design-rules, and *via* layers spanning a
//! (bottom, cut, top) triple of basic layers.
//!
//! All connectivity questions reduce to mask algebra: a layer `contains`
//! another when its mask is a superset, and two layers `intersect` when
//! their masks share any bit.
//!

// Std-Lib
use std::collections::HashMap;

// Crates.io
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

// Local Imports
use crate::error::{DbError, DbResult};
use crate::units::{DbUnits, Int, UnitScale};

// Create key-types for each internal type stored in [SlotMap]s
new_key_type! {
    /// Keys for [Layer] entries
    pub struct LayerKey;
}

/// # Basic-Layer Bit-Set
///
/// One bit per basic layer of the technology. Symbolic layers carry the
/// union of the basic-layer bits they are made of.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct LayerMask(pub u64);
impl LayerMask {
    /// The empty mask
    pub fn empty() -> Self {
        Self(0)
    }
    /// A single-bit mask for basic-layer `index`
    pub fn from_bit(index: u8) -> Self {
        Self(1u64 << index)
    }
    /// Boolean indication of emptiness
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
    /// Superset test: do we cover every bit of `other`?
    pub fn contains(&self, other: &LayerMask) -> bool {
        (self.0 & other.0) == other.0
    }
    /// Non-empty-intersection test
    pub fn intersects(&self, other: &LayerMask) -> bool {
        (self.0 & other.0) != 0
    }
    /// Iterate over the set bit-indices, ascending
    pub fn iter_bits(&self) -> impl Iterator<Item = u8> + '_ {
        (0..64u8).filter(move |b| self.0 & (1u64 << b) != 0)
    }
}
impl std::ops::BitOr for LayerMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitAnd for LayerMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}
impl std::ops::BitOrAssign for LayerMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// # Layer-Kind Enumeration
///
/// The structural part of a [Layer]: what it is made of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LayerKind {
    /// An atomic mask layer, owning bit `index` of the [LayerMask] space
    Basic { index: u8 },
    /// A conducting layer over a single basic layer
    Regular { basic: LayerKey },
    /// A via layer spanning a (bottom, cut, top) basic-layer triple
    Via {
        bottom: LayerKey,
        cut: LayerKey,
        top: LayerKey,
        /// Metal enclosure of the cut, per side
        bottom_enclosure: DbUnits,
        top_enclosure: DbUnits,
    },
}

/// # Layer
///
/// A technology mask layer: structural kind, mask bits, extraction mask,
/// and the design-rules the router and extractor consult.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Layer {
    /// Layer Name
    pub name: String,
    /// Basic-layer bits this layer is made of
    pub mask: LayerMask,
    /// Subset of `mask` participating in connectivity extraction
    pub extract_mask: LayerMask,
    /// Minimal drawn width/height
    pub minimal_size: DbUnits,
    /// Minimal same-layer spacing
    pub minimal_spacing: DbUnits,
    /// Minimal drawn area, in squared database units
    pub minimal_area: Int,
    /// Wire-end extension past the axis endpoint
    pub extension_cap: DbUnits,
    /// Structural kind
    pub kind: LayerKind,
}
impl Layer {
    /// Superset test on masks: does this layer physically include `other`?
    pub fn contains(&self, other: &Layer) -> bool {
        self.mask.contains(&other.mask)
    }
    /// Shared-mask-bit test
    pub fn intersects(&self, other: &Layer) -> bool {
        self.mask.intersects(&other.mask)
    }
    /// The top basic layer of a via, if we are one
    pub fn top(&self) -> Option<LayerKey> {
        match self.kind {
            LayerKind::Via { top, .. } => Some(top),
            _ => None,
        }
    }
    /// The bottom basic layer of a via, if we are one
    pub fn bottom(&self) -> Option<LayerKey> {
        match self.kind {
            LayerKind::Via { bottom, .. } => Some(bottom),
            _ => None,
        }
    }
    /// Metal enclosure of the via cut on the side of basic layer `sub`
    pub fn enclosure(&self, sub: LayerKey) -> DbUnits {
        match self.kind {
            LayerKind::Via {
                bottom,
                top,
                bottom_enclosure,
                top_enclosure,
                ..
            } => {
                if sub == bottom {
                    bottom_enclosure
                } else if sub == top {
                    top_enclosure
                } else {
                    DbUnits(0)
                }
            }
            _ => DbUnits(0),
        }
    }
}

/// # Layer Set & Manager
///
/// Keep track of active layers, and index them by name and by mask.
/// Symbolic (non-basic) layers are unique per basic-layer set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layers {
    pub slots: SlotMap<LayerKey, Layer>,
    names: HashMap<String, LayerKey>,
    masks: HashMap<u64, LayerKey>,
    /// Next free basic-layer bit
    next_bit: u8,
}
impl Layers {
    /// Add a [Layer] to our slot-map, name-map and mask-map.
    /// Fails on name collisions, and on mask collisions among symbolic layers.
    pub fn add(&mut self, layer: Layer) -> DbResult<LayerKey> {
        if self.names.contains_key(&layer.name) {
            return DbError::fail(format!("Duplicate layer name \"{}\"", layer.name));
        }
        if !matches!(layer.kind, LayerKind::Basic { .. })
            && self.masks.contains_key(&layer.mask.0)
        {
            return DbError::fail(format!(
                "Duplicate symbolic layer for mask {:?} (\"{}\")",
                layer.mask, layer.name
            ));
        }
        let name = layer.name.clone();
        let mask = layer.mask;
        let symbolic = !matches!(layer.kind, LayerKind::Basic { .. });
        let key = self.slots.insert(layer);
        self.names.insert(name, key);
        if symbolic {
            self.masks.insert(mask.0, key);
        }
        Ok(key)
    }
    /// Get a reference to [Layer] from [LayerKey] `key`
    pub fn get(&self, key: LayerKey) -> Option<&Layer> {
        self.slots.get(key)
    }
    /// Get a reference to the [LayerKey] for layer-name `name`
    pub fn keyname(&self, name: impl Into<String>) -> Option<LayerKey> {
        self.names.get(&name.into()).copied()
    }
    /// Get a reference to [Layer] named `name`
    pub fn name(&self, name: &str) -> Option<&Layer> {
        let key = self.names.get(name)?;
        self.slots.get(*key)
    }
}

/// # Technology
///
/// The process description: unit scale plus the layer registry, with
/// convenience constructors for each [LayerKind].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Technology {
    /// Technology Name
    pub name: String,
    /// Database-unit scale factors
    pub scale: UnitScale,
    /// Layer Definitions
    pub layers: Layers,
}
impl Technology {
    /// Create a new and empty technology
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scale: UnitScale::default(),
            layers: Layers::default(),
        }
    }
    /// Add a basic layer, allocating its mask bit
    pub fn add_basic(&mut self, name: impl Into<String>) -> DbResult<LayerKey> {
        let index = self.layers.next_bit;
        if index >= 64 {
            return Err(DbError::Overflow {
                message: "Basic-layer mask space exhausted".to_string(),
            });
        }
        self.layers.next_bit += 1;
        let mask = LayerMask::from_bit(index);
        self.layers.add(Layer {
            name: name.into(),
            mask,
            extract_mask: mask,
            minimal_size: DbUnits(0),
            minimal_spacing: DbUnits(0),
            minimal_area: 0,
            extension_cap: DbUnits(0),
            kind: LayerKind::Basic { index },
        })
    }
    /// Add a regular conducting layer over basic layer `basic`
    pub fn add_regular(
        &mut self,
        name: impl Into<String>,
        basic: LayerKey,
        minimal_size: DbUnits,
        minimal_spacing: DbUnits,
        extension_cap: DbUnits,
    ) -> DbResult<LayerKey> {
        let bmask = self
            .layers
            .get(basic)
            .ok_or_else(|| DbError::msg("Invalid basic layer"))?
            .mask;
        self.layers.add(Layer {
            name: name.into(),
            mask: bmask,
            extract_mask: bmask,
            minimal_size,
            minimal_spacing,
            minimal_area: 0,
            extension_cap,
            kind: LayerKind::Regular { basic },
        })
    }
    /// Add a via layer over the (bottom, cut, top) basic triple
    pub fn add_via(
        &mut self,
        name: impl Into<String>,
        bottom: LayerKey,
        cut: LayerKey,
        top: LayerKey,
        minimal_size: DbUnits,
        enclosure: DbUnits,
    ) -> DbResult<LayerKey> {
        let mut mask = LayerMask::empty();
        for key in [bottom, cut, top] {
            mask |= self
                .layers
                .get(key)
                .ok_or_else(|| DbError::msg("Invalid via sub-layer"))?
                .mask;
        }
        self.layers.add(Layer {
            name: name.into(),
            mask,
            extract_mask: mask,
            minimal_size,
            minimal_spacing: DbUnits(0),
            minimal_area: 0,
            extension_cap: DbUnits(0),
            kind: LayerKind::Via {
                bottom,
                cut,
                top,
                bottom_enclosure: enclosure,
                top_enclosure: enclosure,
            },
        })
    }
    /// Get the basic-layer bit index of `key`, if it names a basic layer
    pub fn basic_index(&self, key: LayerKey) -> Option<u8> {
        match self.layers.get(key)?.kind {
            LayerKind::Basic { index } => Some(index),
            _ => None,
        }
    }
    /// Look up the [UnitScale]-converted physical value of `nano` nanometers
    pub fn nano(&self, nano: Int) -> DbUnits {
        self.scale.from_physical(nano, crate::units::Units::Nano)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_algebra() {
        let m1 = LayerMask::from_bit(0);
        let m2 = LayerMask::from_bit(1);
        let via = m1 | m2;
        assert!(via.contains(&m1));
        assert!(via.intersects(&m2));
        assert!(!m1.intersects(&m2));
        assert_eq!(via.iter_bits().collect::<Vec<_>>(), vec![0, 1]);
    }
    #[test]
    fn technology_layers() -> DbResult<()> {
        let mut tech = Technology::new("unit");
        let metal1 = tech.add_basic("METAL1")?;
        let cut12 = tech.add_basic("CUT12")?;
        let metal2 = tech.add_basic("METAL2")?;
        let via12 = tech.add_via("VIA12", metal1, cut12, metal2, DbUnits(2), DbUnits(1))?;

        let m1 = tech.layers.get(metal1).unwrap();
        let v12 = tech.layers.get(via12).unwrap();
        assert!(v12.contains(m1));
        assert!(v12.intersects(m1));
        assert!(!m1.contains(v12));
        assert_eq!(v12.top(), Some(metal2));
        assert_eq!(v12.enclosure(metal1), DbUnits(1));

        // A second symbolic layer on the same mask set must be refused
        assert!(tech
            .add_via("VIA12b", metal1, cut12, metal2, DbUnits(2), DbUnits(1))
            .is_err());
        Ok(())
    }
}
