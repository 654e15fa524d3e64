//!
//! # Sweep Line
//!
//! The extraction core: tiles are loaded from the hierarchy queries, their
//! left/right edges sorted into one event stream, and a vertical sweep
//! walks it left to right. One interval tree per extracted basic layer
//! holds the y-spans of the tiles currently cut by the sweep; every overlap
//! found on insertion unions the two tiles' families.
//!

// Std-Lib
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

// Crates.io
use log::{debug, info, warn};

// Local Imports
use crate::equi::EquiPool;
use crate::error::{ExtractError, ExtractResult};
use crate::interval_tree::IntervalTree;
use crate::tile::{RootFlags, TileId, TilePool};
use route21db::geom::Span;
use route21db::query;
use route21db::utils::{ErrorHelper, Unwrapper};
use route21db::{Cell, ComponentShape, DbUnits, LayerKey, Occurrence, Technology, Transform};

/// Which side of a tile an event marks. [EdgeKind::Left] sorts first at
/// equal x, so insertions at a coordinate precede removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeKind {
    Left,
    Right,
}

/// One sweep event. The derived ordering — (x, edge kind, tile id) — is the
/// total order the determinism guarantees rest on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SweepEvent {
    pub x: DbUnits,
    pub kind: EdgeKind,
    pub tile: TileId,
}

/// # Sweep Line
pub struct SweepLine<'a> {
    cell: &'a Cell,
    tech: &'a Technology,
    /// Basic layers to extract
    extracteds: Vec<LayerKey>,
    /// Cooperative cancellation flag, polled each event
    interrupt: &'a AtomicBool,
    /// All tiles of this run
    pub pool: TilePool,
    /// All equipotentials of this run
    pub equis: EquiPool,
    /// Edge events, sorted before the run
    events: Vec<SweepEvent>,
    /// Active y-spans, one tree per extracted basic layer
    trees: BTreeMap<LayerKey, IntervalTree<TileId>>,
    /// Recoverable defects: skipped shapes and the like
    pub diagnostics: Vec<ExtractError>,
}
impl ErrorHelper for SweepLine<'_> {
    type Error = ExtractError;
    /// Failures name the cell being swept.
    fn err(&self, msg: impl Into<String>) -> Self::Error {
        ExtractError::msg(format!("{} (sweeping \"{}\")", msg.into(), self.cell.name))
    }
}
impl<'a> SweepLine<'a> {
    pub fn new(
        cell: &'a Cell,
        tech: &'a Technology,
        extracteds: Vec<LayerKey>,
        interrupt: &'a AtomicBool,
    ) -> Self {
        Self {
            cell,
            tech,
            extracteds,
            interrupt,
            pool: TilePool::new(),
            equis: EquiPool::new(),
            events: Vec::new(),
            trees: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Register one tile and its two edge events
    fn add_tile(
        &mut self,
        occurrence: Occurrence,
        basic: LayerKey,
        bbox: route21db::BoundBox,
        net: route21db::EntityId,
        external: bool,
        child_equi: bool,
        parent: Option<TileId>,
    ) -> Option<TileId> {
        if bbox.is_empty() || bbox.p0.x == bbox.p1.x || bbox.p0.y == bbox.p1.y {
            debug!("Skipping degenerate tile box {:?}", bbox);
            return None;
        }
        let id = self
            .pool
            .create(occurrence, basic, bbox, net, external, child_equi, parent);
        self.events.push(SweepEvent {
            x: bbox.p0.x,
            kind: EdgeKind::Left,
            tile: id,
        });
        self.events.push(SweepEvent {
            x: bbox.p1.x,
            kind: EdgeKind::Right,
            tile: id,
        });
        Some(id)
    }

    /// # Tile Loading
    ///
    /// Query every component under the cell whose layer mask intersects an
    /// extracted basic layer, and tile it: one tile per (component, basic
    /// layer) pair, several pre-merged tiles for multi-box rectilinears.
    ///
    /// `child_equi` substitutes the occurrence of an already-extracted
    /// sub-instance component by its child-equipotential representative.
    pub fn load_tiles(
        &mut self,
        child_equi: &dyn Fn(&Occurrence) -> Option<Occurrence>,
    ) -> ExtractResult<()> {
        let area = self.cell.bounding_box()?;
        let mut union_mask = route21db::LayerMask::empty();
        for basic in &self.extracteds {
            self.trees.insert(*basic, IntervalTree::new());
            let layer = self
                .tech
                .layers
                .get(*basic)
                .unwrapper(self, "Unknown extracted layer")?;
            union_mask |= layer.mask & layer.extract_mask;
        }

        for occ in query::components_under(self.cell, &area, self.tech, union_mask)? {
            let (comp, transform) = query::resolve_component(self.cell, &occ)?;
            self.tile_component(&occ, &comp, &transform, child_equi)?;
        }
        self.events.sort();
        info!(
            "Loaded {} tiles ({} events) over {} layers",
            self.pool.len(),
            self.events.len(),
            self.extracteds.len()
        );
        Ok(())
    }

    /// Tile a single component occurrence: one tile per extracted basic
    /// layer its mask covers, several for multi-box rectilinears — all
    /// pre-merged under the first tile, so one source shape is one
    /// union-find family before the sweep begins.
    fn tile_component(
        &mut self,
        occ: &Occurrence,
        comp: &route21db::Component,
        transform: &Transform,
        child_equi: &dyn Fn(&Occurrence) -> Option<Occurrence>,
    ) -> ExtractResult<()> {
        // Tag deep occurrences with their child-equi representative
        let (tile_occ, is_child) = if !occ.path.is_empty() {
            match child_equi(occ) {
                Some(rep) => (rep, true),
                None => (occ.clone(), false),
            }
        } else {
            (occ.clone(), false)
        };
        let (net, external) = self.net_of(occ, comp)?;
        // Deep nets are never externally visible at this level
        let external = external && occ.path.is_empty();

        let comp_layer = self
            .tech
            .layers
            .get(comp.layer)
            .unwrapper(self, "Component on unknown layer")?
            .clone();

        let mut root: Option<TileId> = None;
        for basic in self.extracteds.clone() {
            let basic_layer = self
                .tech
                .layers
                .get(basic)
                .unwrapper(self, "Unknown extracted layer")?;
            if !comp_layer
                .mask
                .intersects(&(basic_layer.mask & basic_layer.extract_mask))
            {
                continue;
            }

            if let ComponentShape::Rectilinear(rect) = &comp.shape {
                let boxes = match route21db::geom::decompose_rectilinear(&rect.points) {
                    Ok(boxes) => boxes,
                    Err(e) => {
                        // Recoverable: skip the shape, keep extracting.
                        warn!("Skipping shape {:?}: {}", comp.id, e);
                        self.diagnostics.push(ExtractError::Rectilinear {
                            message: format!("{}", e),
                        });
                        return Ok(());
                    }
                };
                for bb in boxes {
                    let placed = transform.apply_box(&bb);
                    let id = self.add_tile(
                        tile_occ.clone(),
                        basic,
                        placed,
                        net,
                        external,
                        is_child,
                        root,
                    );
                    if root.is_none() {
                        root = id;
                    }
                }
                continue;
            }

            let bbox = transform.apply_box(&comp.bounding_box_on(self.tech, basic));
            let id = self.add_tile(tile_occ.clone(), basic, bbox, net, external, is_child, root);
            if root.is_none() {
                root = id;
            }
        }
        Ok(())
    }

    /// Resolve the owning net (id, external) of a component occurrence
    fn net_of(
        &self,
        occ: &Occurrence,
        comp: &route21db::Component,
    ) -> ExtractResult<(route21db::EntityId, bool)> {
        if occ.path.is_empty() {
            let net = self
                .cell
                .net(comp.net)
                .ok_or_else(|| ExtractError::bug("Component on unknown net"))?;
            return Ok((net.id, net.external));
        }
        // Deep component: its net lives in the leaf cell; the id alone is
        // enough for bookkeeping at this level.
        Ok((comp.net, false))
    }

    /// # Sweep Run
    ///
    /// Process the sorted event stream: left edges union against every
    /// overlap in their layer's tree then insert, right edges remove.
    /// Then fold every union-find family into its root equipotential.
    pub fn run(&mut self) -> ExtractResult<()> {
        for i in 0..self.events.len() {
            if self.interrupt.load(Ordering::Relaxed) {
                // Commit what keeps invariants, then bail out.
                self.pool.destroy_queued();
                return Err(ExtractError::Interrupted);
            }
            let event = self.events[i];
            let tile = self.pool.get(event.tile);
            let span = Span::new(tile.bbox.p0.y, tile.bbox.p1.y);
            let basic = tile.basic;
            let tree = self
                .trees
                .get_mut(&basic)
                .ok_or_else(|| ExtractError::bug("Missing interval tree for layer"))?;
            match event.kind {
                EdgeKind::Left => {
                    for hit in tree.overlaps(span) {
                        self.pool
                            .merge(event.tile, hit.payload, &mut self.equis, self.cell)?;
                    }
                    tree.insert(span, event.tile);
                }
                EdgeKind::Right => {
                    tree.remove(span, event.tile);
                    self.pool.dec_ref(event.tile);
                }
            }
        }
        self.merge_equipotentials()?;
        Ok(())
    }

    /// Fold every tile into its root's equipotential, compressing paths and
    /// reclaiming the non-roots as we go.
    fn merge_equipotentials(&mut self) -> ExtractResult<()> {
        self.pool.time_tick();
        for id in self.pool.ids().collect::<Vec<_>>() {
            if self.interrupt.load(Ordering::Relaxed) {
                self.pool.destroy_queued();
                return Err(ExtractError::Interrupted);
            }
            if self.pool.get(id).is_dead() {
                continue;
            }
            self.pool.root(
                id,
                RootFlags::COMPRESS | RootFlags::MERGE_EQUI | RootFlags::MAKE_LEAF_EQUI,
                &mut self.equis,
                self.cell,
            )?;
            self.pool.destroy_queued();
        }
        Ok(())
    }
}
