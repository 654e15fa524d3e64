//!
//! # Cells, Instances & Libraries
//!
//! A [Cell] exclusively owns its nets, components and instances, all stored
//! in entity-id-keyed ordered maps so that every walk over them is
//! deterministic. Cross-references run through ids: nets list their
//! component ids, components name their net id.
//!

// Std-Lib
use std::collections::{BTreeMap, HashMap};

// Local Imports
use crate::entity::{Component, ComponentShape, EntityId, Properties};
use crate::error::{DbError, DbResult};
use crate::geom::{BoundBox, Transform};
use crate::layer::LayerKey;
use crate::net::Net;
use crate::utils::{Ptr, PtrList};

/// Instance of another Cell
#[derive(Debug, Clone)]
pub struct Instance {
    /// Entity Identifier
    pub id: EntityId,
    /// Instance Name
    pub inst_name: String,
    /// Cell Definition Reference
    pub cell: Ptr<Cell>,
    /// Placement of `cell` into the parent's coordinates
    pub transform: Transform,
}

/// # Cell
///
/// Owner of nets, components and sub-instances.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Entity Identifier
    pub id: EntityId,
    /// Cell Name
    pub name: String,
    /// Abutment (placement) box
    pub abutment: BoundBox,
    /// Nets, by entity id
    pub nets: BTreeMap<EntityId, Net>,
    /// Net name (and alias) index
    net_names: HashMap<String, EntityId>,
    /// Components, by entity id
    pub components: BTreeMap<EntityId, Component>,
    /// Sub-instances, by entity id
    pub instances: BTreeMap<EntityId, Instance>,
}
impl Default for Cell {
    fn default() -> Self {
        Self {
            id: EntityId::default(),
            name: String::new(),
            abutment: BoundBox::empty(),
            nets: BTreeMap::new(),
            net_names: HashMap::new(),
            components: BTreeMap::new(),
            instances: BTreeMap::new(),
        }
    }
}
impl Cell {
    /// Create a new and empty [Cell]
    pub fn new(name: impl Into<String>) -> DbResult<Self> {
        Ok(Self {
            id: EntityId::alloc()?,
            name: name.into(),
            abutment: BoundBox::empty(),
            ..Default::default()
        })
    }
    /// Add a new [Net] named `name`.
    /// The name must not collide with any existing primary name or alias.
    pub fn add_net(&mut self, name: impl Into<String>) -> DbResult<EntityId> {
        let name = name.into();
        if self.net_names.contains_key(&name) {
            return DbError::fail(format!("Duplicate net name \"{}\"", name));
        }
        let net = Net::new(name.clone())?;
        let id = net.id;
        self.net_names.insert(name, id);
        self.nets.insert(id, net);
        Ok(id)
    }
    /// Get a reference to the [Net] with id `id`
    pub fn net(&self, id: EntityId) -> Option<&Net> {
        self.nets.get(&id)
    }
    /// Get a mutable reference to the [Net] with id `id`
    pub fn net_mut(&mut self, id: EntityId) -> Option<&mut Net> {
        self.nets.get_mut(&id)
    }
    /// Get a reference to the [Net] named (or aliased) `name`
    pub fn net_named(&self, name: &str) -> Option<&Net> {
        let id = self.net_names.get(name)?;
        self.nets.get(id)
    }
    /// Add a [Component] with `shape` on `layer`, owned by net `net`
    pub fn add_component(
        &mut self,
        net: EntityId,
        layer: LayerKey,
        shape: impl Into<ComponentShape>,
    ) -> DbResult<EntityId> {
        if !self.nets.contains_key(&net) {
            return DbError::fail("Component references an unknown net");
        }
        let id = EntityId::alloc()?;
        self.components.insert(
            id,
            Component {
                id,
                net,
                layer,
                shape: shape.into(),
                props: Properties::new(),
            },
        );
        self.nets.get_mut(&net).unwrap().components.insert(id);
        Ok(id)
    }
    /// Remove component `id`, detaching it from its owning net
    pub fn remove_component(&mut self, id: EntityId) -> DbResult<()> {
        let comp = self
            .components
            .remove(&id)
            .ok_or_else(|| DbError::msg("Removing unknown component"))?;
        if let Some(net) = self.nets.get_mut(&comp.net) {
            net.components.remove(&id);
        }
        Ok(())
    }
    /// Destroy net `id`, cascading removal of all its components
    pub fn destroy_net(&mut self, id: EntityId) -> DbResult<()> {
        let net = self
            .nets
            .remove(&id)
            .ok_or_else(|| DbError::msg("Destroying unknown net"))?;
        self.net_names.remove(&net.name);
        for alias in &net.aliases {
            self.net_names.remove(alias);
        }
        for comp in &net.components {
            self.components.remove(comp);
        }
        Ok(())
    }
    /// Merge net `victim` into net `survivor`: or-merge directions, re-home
    /// components, and keep the victim's names as aliases of the survivor.
    pub fn merge_nets(&mut self, survivor: EntityId, victim: EntityId) -> DbResult<()> {
        if survivor == victim {
            return DbError::fail("Cannot merge a net with itself");
        }
        let victim_net = self
            .nets
            .remove(&victim)
            .ok_or_else(|| DbError::msg("Merging unknown net"))?;
        let surv = self
            .nets
            .get_mut(&survivor)
            .ok_or_else(|| DbError::msg("Merging into unknown net"))?;
        surv.absorb(&victim_net)?;
        // Re-point the name index and the component headers
        self.net_names.insert(victim_net.name.clone(), survivor);
        for alias in &victim_net.aliases {
            self.net_names.insert(alias.clone(), survivor);
        }
        for comp_id in &victim_net.components {
            if let Some(comp) = self.components.get_mut(comp_id) {
                comp.net = survivor;
            }
        }
        Ok(())
    }
    /// Add an [Instance] of `cell` placed by `transform`
    pub fn add_instance(
        &mut self,
        inst_name: impl Into<String>,
        cell: Ptr<Cell>,
        transform: Transform,
    ) -> DbResult<EntityId> {
        let id = EntityId::alloc()?;
        self.instances.insert(
            id,
            Instance {
                id,
                inst_name: inst_name.into(),
                cell,
                transform,
            },
        );
        Ok(id)
    }
    /// Compute the bounding box: the union of all component boxes and all
    /// (transformed) sub-instance boxes. Falls back to the abutment box
    /// for fully-abstract cells.
    pub fn bounding_box(&self) -> DbResult<BoundBox> {
        let mut bb = BoundBox::empty();
        for comp in self.components.values() {
            bb = bb.union(&comp.bounding_box());
        }
        for inst in self.instances.values() {
            let guard = inst.cell.read()?;
            let sub = guard.bounding_box()?;
            bb = bb.union(&inst.transform.apply_box(&sub));
        }
        if bb.is_empty() {
            bb = self.abutment;
        }
        Ok(bb)
    }
}

/// # Cell Library
///
/// A collection of cell definitions.
#[derive(Debug, Clone, Default)]
pub struct Library {
    /// Library Name
    pub name: String,
    /// Cell Definitions
    pub cells: PtrList<Cell>,
}
impl Library {
    /// Create a new and empty Library
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: PtrList::new(),
        }
    }
    /// Iterate over the cell definitions
    pub fn cells_of(&self) -> impl Iterator<Item = &Ptr<Cell>> {
        self.cells.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Horizontal;
    use crate::units::DbUnits;

    #[test]
    fn cell_store() -> DbResult<()> {
        let mut cell = Cell::new("unit")?;
        let net = cell.add_net("n1")?;
        assert!(cell.add_net("n1").is_err());

        let comp = cell.add_component(
            net,
            LayerKey::default(),
            Horizontal {
                y: DbUnits(10),
                width: DbUnits(2),
                x_source: DbUnits(0),
                x_target: DbUnits(50),
            },
        )?;
        assert!(cell.net(net).unwrap().components.contains(&comp));

        cell.remove_component(comp)?;
        assert!(cell.components.is_empty());
        assert!(cell.net(net).unwrap().components.is_empty());
        Ok(())
    }
    #[test]
    fn net_merge_re_homes_components() -> DbResult<()> {
        let mut cell = Cell::new("unit")?;
        let a = cell.add_net("a")?;
        let b = cell.add_net("b")?;
        let comp = cell.add_component(
            b,
            LayerKey::default(),
            Horizontal {
                y: DbUnits(0),
                width: DbUnits(2),
                x_source: DbUnits(0),
                x_target: DbUnits(10),
            },
        )?;
        cell.merge_nets(a, b)?;
        assert_eq!(cell.components[&comp].net, a);
        assert_eq!(cell.net_named("b").unwrap().id, a);
        Ok(())
    }
}
