//!
//! # Entities & Components
//!
//! Every database object carries an [EntityId], minted from a process-wide
//! monotone counter. Geometric components are a tagged variant
//! [ComponentShape] under a common [Component] header; the per-variant
//! behavior the rest of the toolbox needs is the small [Footprint]
//! capability, dispatched without boxing via `enum_dispatch`.
//!

// Std-Lib
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

// Crates.io
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

// Local Imports
use crate::error::{DbError, DbResult};
use crate::geom::{BoundBox, Point};
use crate::layer::{LayerKey, Technology};
use crate::units::DbUnits;

/// # Entity Identifier
///
/// Unique across the process, monotonically assigned, stable for the
/// lifetime of the entity.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct EntityId(pub u64);

/// Process-wide id counter. Zero is reserved as a niche/invalid value.
static ENTITY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl EntityId {
    /// Mint the next [EntityId]. Saturation of the counter is fatal:
    /// the database can no longer produce unique identities.
    pub fn alloc() -> DbResult<EntityId> {
        let id = ENTITY_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        if id == u64::MAX {
            return Err(DbError::Overflow {
                message: "Entity-id counter saturated".to_string(),
            });
        }
        Ok(EntityId(id))
    }
}

/// # Entity Lifecycle States
///
/// Creation and destruction hooks are modelled as explicit states;
/// mutations are legal only while [Lifecycle::Alive].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Lifecycle {
    Uninit,
    Alive,
    Destroying,
    Dead,
}
impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Uninit
    }
}

/// # Property Value
///
/// Generic attachments published onto nets and components, e.g. the
/// equipotential indices produced by extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PropValue {
    Int(i64),
    Str(String),
    IdList(Vec<u64>),
}
/// Property attachment map. Ordered for deterministic iteration.
pub type Properties = BTreeMap<String, PropValue>;

///
/// # Footprint Capability
///
/// The behavior the extractor and router need from every component variant:
/// its drawn bounding box.
///
#[enum_dispatch]
pub trait Footprint {
    /// Axis-aligned bounding box of the drawn shape
    fn bounding_box(&self) -> BoundBox;
}

/// A horizontal wire segment at axis `y`, spanning `x_source ..= x_target`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Horizontal {
    pub y: DbUnits,
    pub width: DbUnits,
    pub x_source: DbUnits,
    pub x_target: DbUnits,
}
impl Footprint for Horizontal {
    fn bounding_box(&self) -> BoundBox {
        BoundBox::new(
            self.x_source,
            self.y - self.width / 2,
            self.x_target,
            self.y + self.width / 2,
        )
    }
}

/// A vertical wire segment at axis `x`, spanning `y_source ..= y_target`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vertical {
    pub x: DbUnits,
    pub width: DbUnits,
    pub y_source: DbUnits,
    pub y_target: DbUnits,
}
impl Footprint for Vertical {
    fn bounding_box(&self) -> BoundBox {
        BoundBox::new(
            self.x - self.width / 2,
            self.y_source,
            self.x + self.width / 2,
            self.y_target,
        )
    }
}

/// A contact (via) cut centred at `at`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub at: Point,
    pub width: DbUnits,
    pub height: DbUnits,
}
impl Footprint for Contact {
    fn bounding_box(&self) -> BoundBox {
        BoundBox::new(
            self.at.x - self.width / 2,
            self.at.y - self.height / 2,
            self.at.x + self.width / 2,
            self.at.y + self.height / 2,
        )
    }
}

/// A rectangular pad
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pad {
    pub bbox: BoundBox,
}
impl Footprint for Pad {
    fn bounding_box(&self) -> BoundBox {
        self.bbox
    }
}

/// An orthogonal polygon, stored as its vertex ring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rectilinear {
    pub points: Vec<Point>,
}
impl Footprint for Rectilinear {
    fn bounding_box(&self) -> BoundBox {
        let mut bb = BoundBox::empty();
        for pt in &self.points {
            bb = bb.union(&BoundBox::from_point(*pt));
        }
        bb
    }
}

/// An external connection point of a cell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pin {
    pub at: Point,
    pub width: DbUnits,
    pub height: DbUnits,
}
impl Footprint for Pin {
    fn bounding_box(&self) -> BoundBox {
        BoundBox::new(
            self.at.x - self.width / 2,
            self.at.y - self.height / 2,
            self.at.x + self.width / 2,
            self.at.y + self.height / 2,
        )
    }
}

/// A virtual terminal standing in for a deep external net connection,
/// materialised before routing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingPad {
    pub bbox: BoundBox,
}
impl Footprint for RoutingPad {
    fn bounding_box(&self) -> BoundBox {
        self.bbox
    }
}

/// # Component Shape Variants
#[enum_dispatch(Footprint)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComponentShape {
    Horizontal(Horizontal),
    Vertical(Vertical),
    Contact(Contact),
    Pad(Pad),
    Rectilinear(Rectilinear),
    Pin(Pin),
    RoutingPad(RoutingPad),
}

/// # Component
///
/// Common header over every geometric variant: identity, owning net,
/// layer, and the shape itself. The owning [crate::cell::Cell] stores
/// components by id; the net stores the ids of its components, and each
/// component stores its net id (arena + index, no back-pointers).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Component {
    /// Entity Identifier
    pub id: EntityId,
    /// Owning net id
    pub net: EntityId,
    /// Layer (Reference)
    pub layer: LayerKey,
    /// Shape
    pub shape: ComponentShape,
    /// Property attachments
    pub props: Properties,
}
impl Component {
    /// Bounding box of the drawn shape
    pub fn bounding_box(&self) -> BoundBox {
        self.shape.bounding_box()
    }
    /// Bounding box of the part of this component drawn on basic layer
    /// `basic`: a via's metal plates extend past its cut by the per-side
    /// enclosure.
    pub fn bounding_box_on(&self, tech: &Technology, basic: LayerKey) -> BoundBox {
        let mut bb = self.shape.bounding_box();
        if let Some(layer) = tech.layers.get(self.layer) {
            let enclosure = layer.enclosure(basic);
            if enclosure > DbUnits(0) {
                bb.expand(enclosure);
            }
        }
        bb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_monotone() {
        let a = EntityId::alloc().unwrap();
        let b = EntityId::alloc().unwrap();
        assert!(a < b);
    }
    #[test]
    fn footprints() {
        let h = Horizontal {
            y: DbUnits(10),
            width: DbUnits(4),
            x_source: DbUnits(0),
            x_target: DbUnits(100),
        };
        assert_eq!(h.bounding_box(), BoundBox::new(0, 8, 100, 12));

        let shape = ComponentShape::from(h);
        assert_eq!(shape.bounding_box(), BoundBox::new(0, 8, 100, 12));
    }
}
