//!
//! # Extraction Engine
//!
//! Drives the sweep line over one cell or a whole hierarchy, consolidates
//! the resulting equipotentials, publishes them as properties onto the
//! contributing nets and components, and assembles the caller-facing
//! [EquipotentialReport].
//!

// Std-Lib
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Crates.io
use log::info;
use serde::{Deserialize, Serialize};

// Local Imports
use crate::equi::{EquiId, Equipotential, ShortCircuit};
use crate::error::{ExtractError, ExtractResult};
use crate::sweep::SweepLine;
use route21db::utils::{DepOrder, DepOrderer, Ptr};
use route21db::{Cell, EntityId, LayerKey, Occurrence, PropValue, Technology};

/// Property key under which a net's equipotential ids are published
pub const EQUI_NET_PROP: &str = "equipotentials";
/// Property key under which a component's equipotential id is published
pub const EQUI_COMP_PROP: &str = "equipotential";

/// # Equipotential Report
///
/// The complete outcome of one extraction run. Always produced, even for
/// shorted or open designs: the violations live in `short_circuits` and
/// `open_nets`, not in the error channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquipotentialReport {
    /// All live equipotentials, id-ascending
    pub equipotentials: Vec<Equipotential>,
    /// Nets split across several equipotentials
    pub open_nets: Vec<EntityId>,
    /// All short-circuit evidence, in equipotential order
    pub short_circuits: Vec<ShortCircuit>,
    /// Per-net equipotential membership
    pub per_net: BTreeMap<EntityId, Vec<EquiId>>,
}
impl EquipotentialReport {
    /// Whether the run found neither shorts nor opens
    pub fn is_clean(&self) -> bool {
        self.open_nets.is_empty() && self.short_circuits.is_empty()
    }
}

/// Per-cell cache of a finished child extraction: component id ⇒ the
/// representative component id of its equipotential.
type ChildMap = HashMap<EntityId, EntityId>;

/// # Extractor
///
/// Owns the extracted-layer list, the cooperative interrupt flag, and the
/// child-equipotential caches of already-extracted sub-cells.
pub struct Extractor {
    /// Basic layers to extract, in depth order
    extracteds: Vec<LayerKey>,
    /// Cooperative cancellation flag
    pub interrupt: Arc<AtomicBool>,
    /// Caches of extracted sub-cells, by cell pointer
    child_caches: HashMap<Ptr<Cell>, ChildMap>,
}
impl Extractor {
    pub fn new(extracteds: Vec<LayerKey>) -> Self {
        Self {
            extracteds,
            interrupt: Arc::new(AtomicBool::new(false)),
            child_caches: HashMap::new(),
        }
    }
    /// Raise the cooperative interrupt flag
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    /// # Flat Extraction
    ///
    /// Sweep `cell` and publish its equipotentials. Sub-instances are
    /// tiled through hierarchy queries; already-extracted child cells
    /// contribute child-equi references instead of raw sub-tiles.
    pub fn extract(
        &mut self,
        tech: &Technology,
        cell: &mut Cell,
    ) -> ExtractResult<EquipotentialReport> {
        info!("Extracting cell \"{}\"", cell.name);
        let caches = &self.child_caches;
        let lookup = |occ: &Occurrence| -> Option<Occurrence> {
            child_equi_lookup(caches, cell, occ)
        };

        let mut sweep = SweepLine::new(cell, tech, self.extracteds.clone(), &self.interrupt);
        sweep.load_tiles(&lookup)?;
        sweep.run()?;
        let SweepLine { mut equis, .. } = sweep;

        // Consolidate every surviving equipotential
        let live_ids: Vec<EquiId> = equis.live().map(|e| e.id).collect();
        for id in live_ids {
            equis.get_mut(id).consolidate(cell)?;
        }

        // Assemble the report
        let mut report = EquipotentialReport::default();
        for equi in equis.live() {
            report.equipotentials.push(equi.clone());
            for short in &equi.shorts {
                report.short_circuits.push(short.clone());
            }
            for net in equi.nets.keys() {
                // Only this cell's own nets participate in the open scan
                if cell.nets.contains_key(net) {
                    report.per_net.entry(*net).or_default().push(equi.id);
                }
            }
        }
        for (net, equis_of) in &report.per_net {
            if equis_of.len() > 1 {
                report.open_nets.push(*net);
            }
        }

        self.publish(cell, &report)?;
        info!(
            "Extracted \"{}\": {} equipotentials, {} shorts, {} opens",
            cell.name,
            report.equipotentials.len(),
            report.short_circuits.len(),
            report.open_nets.len()
        );
        Ok(report)
    }

    /// # Hierarchical Extraction
    ///
    /// Extract every cell instantiated under `top`, children first, caching
    /// each finished cell so its parent sweeps merge against child-equi
    /// references. Returns the top cell's report.
    pub fn extract_hierarchy(
        &mut self,
        tech: &Technology,
        top: &Ptr<Cell>,
    ) -> ExtractResult<EquipotentialReport> {
        let ordered = CellDepOrder::order(&[top.clone()])
            .map_err(|_| ExtractError::msg("Cycle in cell instance graph"))?;
        let mut last = None;
        for cell_ptr in ordered {
            let report = {
                let mut guard = cell_ptr.write().map_err(route21db::DbError::from)?;
                self.extract(tech, &mut guard)?
            };
            // Cache the child map: component ⇒ equipotential representative
            let mut child_map = ChildMap::new();
            for equi in &report.equipotentials {
                let rep = equi
                    .components
                    .iter()
                    .filter(|occ| occ.path.is_empty())
                    .map(|occ| occ.entity)
                    .min();
                if let Some(rep) = rep {
                    for occ in &equi.components {
                        if occ.path.is_empty() {
                            child_map.insert(occ.entity, rep);
                        }
                    }
                }
            }
            self.child_caches.insert(cell_ptr.clone(), child_map);
            last = Some(report);
        }
        last.ok_or_else(|| ExtractError::msg("Empty hierarchy"))
    }

    /// Publish equipotential membership as properties on every
    /// contributing net and top-level component.
    fn publish(&self, cell: &mut Cell, report: &EquipotentialReport) -> ExtractResult<()> {
        for (net, equis_of) in &report.per_net {
            if let Some(net) = cell.nets.get_mut(net) {
                net.props.insert(
                    EQUI_NET_PROP.to_string(),
                    PropValue::IdList(equis_of.iter().map(|id| *id as u64).collect()),
                );
            }
        }
        for equi in &report.equipotentials {
            for occ in &equi.components {
                if !occ.path.is_empty() {
                    continue;
                }
                if let Some(comp) = cell.components.get_mut(&occ.entity) {
                    comp.props
                        .insert(EQUI_COMP_PROP.to_string(), PropValue::Int(equi.id as i64));
                }
            }
        }
        Ok(())
    }
}

/// Resolve a deep occurrence to its child-equi representative, if its leaf
/// cell has already been extracted.
fn child_equi_lookup(
    caches: &HashMap<Ptr<Cell>, ChildMap>,
    cell: &Cell,
    occ: &Occurrence,
) -> Option<Occurrence> {
    // Walk down to the leaf cell pointer
    let mut current = cell.instances.get(occ.path.0.first()?)?.cell.clone();
    for inst_id in &occ.path.0[1..] {
        let next = {
            let guard = current.read().ok()?;
            guard.instances.get(inst_id)?.cell.clone()
        };
        current = next;
    }
    let map = caches.get(&current)?;
    let rep = map.get(&occ.entity)?;
    Some(Occurrence::new(occ.path.clone(), *rep))
}

/// Children-first ordering over the cell instance graph
struct CellDepOrder;
impl DepOrder for CellDepOrder {
    type Item = Ptr<Cell>;
    type Error = ExtractError;

    fn process(item: &Self::Item, orderer: &mut DepOrderer<Self>) -> Result<(), Self::Error> {
        let children: Vec<Ptr<Cell>> = {
            let guard = item.read().map_err(route21db::DbError::from)?;
            guard.instances.values().map(|i| i.cell.clone()).collect()
        };
        for child in children {
            orderer.push(&child)?;
        }
        Ok(())
    }
    fn fail() -> Result<(), Self::Error> {
        Err(ExtractError::msg("Cycle in cell instance graph"))
    }
}
