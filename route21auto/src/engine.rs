//!
//! # Routing Engine
//!
//! Owner of the auto-topology arenas: every [AutoContact] and
//! [AutoSegment] lives in an id-ordered map here, and all cross-references
//! between them travel through these lookup tables — segments hold their
//! endpoint contact ids, contacts hold their slave segment ids back.
//!
//! All mutations require the engine's session to be open; see the session
//! module for the transactional pipeline.
//!

// Std-Lib
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

// Crates.io
use log::{error, warn};

// Local Imports
use crate::config::Configuration;
use crate::contact::{AutoContact, ContactFlags, ContactTopology};
use crate::error::{AutoError, AutoResult};
use crate::gauge::{PitchKind, RoutingGauge};
use crate::gcell::GCellGrid;
use crate::observer::{ObserverQueue, SegmentEvent};
use crate::segment::{AutoSegment, SegFlags};
use crate::session::SessionState;
use route21db::utils::{ErrorHelper, Ptr};
use route21db::{
    Cell, DbUnits, Dir, EntityId, LayerKind, Lifecycle, Point, Span, Technology,
};

/// # Global Router Oracle
///
/// The optional collaborator supplying the gcell cut lines and edge
/// capacity adjustments from a pre-computed global-routing solution.
pub trait GlobalRouterOracle {
    fn horizontal_cut_lines(&self) -> Vec<DbUnits>;
    fn vertical_cut_lines(&self) -> Vec<DbUnits>;
    /// Capacity override for the edge leaving `gcell` in direction `dir`
    fn edge_capacity(&self, gcell: usize, dir: Dir) -> Option<u32>;
}

/// # AutoEngine
pub struct AutoEngine {
    /// The routed cell
    pub cell: Ptr<Cell>,
    /// Its entity id, the session-ownership token
    pub cell_id: EntityId,
    /// Technology the layers resolve against
    pub tech: Technology,
    /// Routing gauge
    pub gauge: RoutingGauge,
    /// Knobs
    pub config: Configuration,
    /// Capacity / density grid
    pub grid: GCellGrid,
    /// Contact arena, id-ordered
    pub(crate) contacts: BTreeMap<EntityId, AutoContact>,
    /// Segment arena, id-ordered
    pub(crate) segments: BTreeMap<EntityId, AutoSegment>,
    /// Observer notifications, drained at phase boundaries
    pub observers: ObserverQueue,
    /// The open-session slot
    pub(crate) session: Option<SessionState>,
    /// Raised when revalidation detected an invariant breach
    pub needs_repair: bool,
    /// Cooperative cancellation flag
    pub interrupt: Arc<AtomicBool>,
    /// Recoverable defects collected during the session
    pub diagnostics: Vec<AutoError>,
}
impl ErrorHelper for AutoEngine {
    type Error = AutoError;
    /// Failures name the owner cell of the routing state.
    fn err(&self, msg: impl Into<String>) -> Self::Error {
        AutoError::msg(format!("{} (on cell {:?})", msg.into(), self.cell_id))
    }
}
impl AutoEngine {
    /// Create an engine over `cell`, building the gcell grid from the
    /// global router's cut lines.
    pub fn new(
        cell: Ptr<Cell>,
        tech: Technology,
        gauge: RoutingGauge,
        mut config: Configuration,
        oracle: &dyn GlobalRouterOracle,
    ) -> AutoResult<Self> {
        config.resolve(&tech, &gauge)?;
        let grid = {
            // Default capacities derive from the gauge when the oracle
            // does not adjust them per edge.
            let slice = {
                let h = oracle.horizontal_cut_lines();
                if h.len() >= 2 {
                    h[1] - h[0]
                } else {
                    DbUnits(0)
                }
            };
            let (h_cap, v_cap) = config.edge_capacities(&gauge, slice)?;
            let mut grid = GCellGrid::new(
                oracle.vertical_cut_lines(),
                oracle.horizontal_cut_lines(),
                gauge.depth() as usize,
                h_cap,
                v_cap,
            )?;
            for index in 0..grid.len() {
                for dir in [Dir::Horiz, Dir::Vert] {
                    if let Some(capacity) = oracle.edge_capacity(index, dir) {
                        let gcell = grid.get_mut(index).unwrap();
                        match dir {
                            Dir::Horiz => gcell.h_capacity = capacity,
                            Dir::Vert => gcell.v_capacity = capacity,
                        }
                    }
                }
            }
            grid
        };
        let cell_id = cell.read().map_err(route21db::DbError::from)?.id;
        Ok(Self {
            cell,
            cell_id,
            tech,
            gauge,
            config,
            grid,
            contacts: BTreeMap::new(),
            segments: BTreeMap::new(),
            observers: ObserverQueue::new(),
            session: None,
            needs_repair: false,
            interrupt: Arc::new(AtomicBool::new(false)),
            diagnostics: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Lookup & linkage

    /// The single mapping from base entities to their auto wrappers
    pub fn lookup_segment(&self, id: EntityId) -> Option<&AutoSegment> {
        self.segments.get(&id)
    }
    pub fn lookup_contact(&self, id: EntityId) -> Option<&AutoContact> {
        self.contacts.get(&id)
    }
    pub(crate) fn segment(&self, id: EntityId) -> AutoResult<&AutoSegment> {
        self.unwrap(self.segments.get(&id), format!("Unknown segment {:?}", id))
    }
    pub(crate) fn segment_mut(&mut self, id: EntityId) -> AutoResult<&mut AutoSegment> {
        self.segments
            .get_mut(&id)
            .ok_or_else(|| AutoError::msg(format!("Unknown segment {:?}", id)))
    }
    pub(crate) fn contact(&self, id: EntityId) -> AutoResult<&AutoContact> {
        self.unwrap(self.contacts.get(&id), format!("Unknown contact {:?}", id))
    }
    pub(crate) fn contact_mut(&mut self, id: EntityId) -> AutoResult<&mut AutoContact> {
        self.contacts
            .get_mut(&id)
            .ok_or_else(|| AutoError::msg(format!("Unknown contact {:?}", id)))
    }
    /// Register a freshly built wrapper. Double-linking is a caller bug.
    pub fn link_contact(&mut self, contact: AutoContact) -> AutoResult<()> {
        if self.contacts.contains_key(&contact.id) {
            return self.fail(format!("Contact {:?} already linked", contact.id));
        }
        self.contacts.insert(contact.id, contact);
        Ok(())
    }
    pub fn link_segment(&mut self, segment: AutoSegment) -> AutoResult<()> {
        if self.segments.contains_key(&segment.id) {
            return self.fail(format!("Segment {:?} already linked", segment.id));
        }
        self.segments.insert(segment.id, segment);
        Ok(())
    }
    /// Deregister; unlinking something never linked fails.
    pub fn unlink_contact(&mut self, id: EntityId) -> AutoResult<AutoContact> {
        self.contacts
            .remove(&id)
            .ok_or_else(|| AutoError::msg(format!("Unlinking unknown contact {:?}", id)))
    }
    pub fn unlink_segment(&mut self, id: EntityId) -> AutoResult<AutoSegment> {
        self.segments
            .remove(&id)
            .ok_or_else(|| AutoError::msg(format!("Unlinking unknown segment {:?}", id)))
    }

    // ------------------------------------------------------------------
    // Factories

    /// Create an [AutoContact] on `net`, inside the gcell containing `at`
    pub fn create_contact(
        &mut self,
        net: EntityId,
        at: Point,
        depth: u8,
    ) -> AutoResult<EntityId> {
        self.require_session("create_contact")?;
        let gcell = self.unwrap(self.grid.index_at(at), "Contact outside the gcell grid")?;
        let layer = self.gauge.contact_layer(depth)?;
        let constraint = self.grid.get(gcell).unwrap().bbox;
        let id = EntityId::alloc()?;
        self.link_contact(AutoContact {
            id,
            net,
            gcell,
            layer,
            position: at,
            topology: ContactTopology::default(),
            min_depth: depth,
            max_depth: depth.saturating_add(1).min(self.config.allowed_depth),
            flags: ContactFlags::CREATED,
            state: Lifecycle::Alive,
            slaves: BTreeSet::new(),
            constraint,
        })?;
        self.invalidate_contact(id)?;
        self.invalidate_net(net)?;
        Ok(id)
    }

    /// Create an [AutoSegment] between two contacts, at routing depth
    /// `depth`. The gauge fixes its direction; the source contact fixes
    /// its axis.
    pub fn create_segment(
        &mut self,
        net: EntityId,
        source: EntityId,
        target: EntityId,
        depth: u8,
    ) -> AutoResult<EntityId> {
        self.require_session("create_segment")?;
        if source == target {
            return Err(AutoError::BadAnchor {
                message: format!("Source and target are the same contact {:?}", source),
            });
        }
        let dir = self.gauge.direction(depth)?;
        let (src, tgt) = match (self.contacts.get(&source), self.contacts.get(&target)) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                return Err(AutoError::BadAnchor {
                    message: "Missing endpoint contact".to_string(),
                })
            }
        };
        let axis = src.position.coord(dir.other());
        let target_axis = tgt.position.coord(dir.other());
        if axis != target_axis && src.is_fixed() && tgt.is_fixed() {
            return Err(AutoError::MisAligned {
                segment: EntityId::default(),
                source_axis: axis,
                target_axis,
            });
        }
        let source_position = src.position.coord(dir);
        let target_position = tgt.position.coord(dir);
        let source_terminal = src.is_terminal();
        let target_terminal = tgt.is_terminal();

        let id = EntityId::alloc()?;
        let mut flags = SegFlags::CREATED;
        flags.set(SegFlags::UNSET_AXIS);
        if dir == Dir::Horiz {
            flags.set(SegFlags::HORIZONTAL);
        }
        if source_terminal {
            flags.set(SegFlags::SOURCE_TERMINAL);
        }
        if target_terminal {
            flags.set(SegFlags::TARGET_TERMINAL);
        }
        let mut segment = AutoSegment {
            id,
            net,
            flags,
            depth,
            axis,
            source,
            target,
            source_position,
            target_position,
            optimal: Span::empty(),
            user_constraints: Span::new(DbUnits::MIN, DbUnits::MAX),
            parent: None,
            reduceds: 0,
            state: Lifecycle::Alive,
        };
        if self.is_global_span(&segment) {
            segment.flags.set(SegFlags::GLOBAL);
        }
        self.link_segment(segment)?;
        self.contact_mut(source)?.slaves.insert(id);
        self.contact_mut(target)?.slaves.insert(id);
        self.invalidate_segment(id)?;
        self.invalidate_contact(source)?;
        self.invalidate_contact(target)?;
        self.invalidate_net(net)?;
        self.observers.notify(id, SegmentEvent::Create);
        Ok(id)
    }

    /// Record a routing-pad landing in the gcell containing `at`.
    /// Feeds the per-gcell RP-saturation bookkeeping.
    pub fn register_routing_pad(&mut self, at: Point) -> AutoResult<usize> {
        let index = self.unwrap(self.grid.index_at(at), "Routing pad outside the gcell grid")?;
        self.grid.get_mut(index).unwrap().rp_count += 1;
        Ok(index)
    }

    /// Global test: crosses more than one gcell along its direction, or
    /// exceeds the configured length threshold.
    fn is_global_span(&self, segment: &AutoSegment) -> bool {
        if self.config.global_length_threshold > DbUnits(0)
            && segment.length() >= self.config.global_length_threshold
        {
            return true;
        }
        self.grid
            .along(segment.dir(), segment.axis, segment.span_u())
            .len()
            > 1
    }

    // ------------------------------------------------------------------
    // Topology walks

    /// Every segment aligned with `seed`: the maximal collinear chain
    /// reachable through tee and cross contacts, excluding `seed` itself.
    /// Aligned members must share the seed's layer; a depth clash is a
    /// [AutoError::LayerMismatch].
    pub fn aligneds(&self, seed: EntityId) -> AutoResult<Vec<EntityId>> {
        let seg = self.segment(seed)?;
        let dir = seg.dir();
        let depth = seg.depth;
        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([seed]);
        let mut frontier = vec![seed];
        while let Some(current) = frontier.pop() {
            let current_seg = self.segment(current)?;
            for anchor in [current_seg.source, current_seg.target] {
                let contact = self.contact(anchor)?;
                if !contact.continues_chain(dir) {
                    continue;
                }
                for slave in &contact.slaves {
                    if seen.contains(slave) {
                        continue;
                    }
                    let other = self.segment(*slave)?;
                    if other.dir() != dir {
                        continue;
                    }
                    if other.depth != depth {
                        return Err(AutoError::LayerMismatch { segment: *slave });
                    }
                    seen.insert(*slave);
                    chain.push(*slave);
                    frontier.push(*slave);
                }
            }
        }
        Ok(chain)
    }

    /// Every perpandicular segment anchored on `seed`'s endpoints
    pub fn perpandiculars(&self, seed: EntityId) -> AutoResult<Vec<EntityId>> {
        let seg = self.segment(seed)?;
        let dir = seg.dir();
        let mut out = Vec::new();
        for anchor in [seg.source, seg.target] {
            let contact = self.contact(anchor)?;
            for slave in &contact.slaves {
                if *slave == seed {
                    continue;
                }
                if self.segment(*slave)?.dir() != dir {
                    out.push(*slave);
                }
            }
        }
        Ok(out)
    }

    /// The perpandicular segment at a turn contact, seen from `seed`
    pub fn perpandicular_at(&self, contact: EntityId, seed: EntityId) -> AutoResult<EntityId> {
        let dir = self.segment(seed)?.dir();
        let c = self.contact(contact)?;
        for slave in &c.slaves {
            if *slave != seed && self.segment(*slave)?.dir() != dir {
                return Ok(*slave);
            }
        }
        self.fail(format!("No perpandicular at contact {:?}", contact))
    }

    // ------------------------------------------------------------------
    // Canonicalisation

    /// Elect the canonical of every chain seeded by `invalidated`:
    /// smallest entity id wins, `WEAK_GLOBAL` propagates iff the chain has
    /// a global member, singletons are flagged `NOT_ALIGNED`.
    pub(crate) fn canonize(&mut self, invalidated: &[EntityId]) -> AutoResult<()> {
        let mut explored: BTreeSet<EntityId> = BTreeSet::new();
        for seed in invalidated {
            if explored.contains(seed) || !self.segments.contains_key(seed) {
                continue;
            }
            let mut chain = vec![*seed];
            match self.aligneds(*seed) {
                Ok(aligneds) => chain.extend(aligneds),
                Err(e @ AutoError::LayerMismatch { .. }) => {
                    // Recoverable: keep the seed as a singleton chain.
                    warn!("{}", e);
                    self.diagnostics.push(e);
                }
                Err(e) => return Err(e),
            }
            explored.extend(chain.iter().copied());

            let has_global = chain
                .iter()
                .any(|id| self.segments[id].is_global());
            let canonical = *chain.iter().min().unwrap();

            for member in &chain {
                let seg = self.segments.get_mut(member).unwrap();
                if *member == canonical {
                    seg.flags.set(SegFlags::CANONICAL);
                } else {
                    seg.flags.unset(SegFlags::CANONICAL);
                }
                if has_global && !seg.is_global() {
                    seg.flags.set(SegFlags::WEAK_GLOBAL);
                } else {
                    seg.flags.unset(SegFlags::WEAK_GLOBAL);
                }
                if chain.len() == 1 {
                    seg.flags.set(SegFlags::NOT_ALIGNED);
                } else {
                    seg.flags.unset(SegFlags::NOT_ALIGNED);
                }
            }
            self.check_canonical(&chain)?;
        }
        Ok(())
    }

    /// Verify the one-canonical-per-chain invariant. Violations are fatal.
    pub(crate) fn check_canonical(&self, chain: &[EntityId]) -> AutoResult<()> {
        let count = chain
            .iter()
            .filter(|id| self.segments[id].is_canonical())
            .count();
        if count != 1 {
            return Err(AutoError::CanonicalBug {
                message: format!("{} canonicals in a chain of {}", count, chain.len()),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Axis control

    /// Write `axis` onto `id` and, when `propagate`, onto its whole
    /// aligned chain and every endpoint contact along it.
    pub(crate) fn set_axis(&mut self, id: EntityId, axis: DbUnits, propagate: bool) -> AutoResult<()> {
        let mut members = vec![id];
        if propagate && !self.segment(id)?.is_not_aligned() {
            members.extend(self.aligneds(id).unwrap_or_default());
        }
        for member in members {
            let (off_dir, source, target) = {
                let seg = self.segment_mut(member)?;
                seg.axis = axis;
                seg.flags.set(SegFlags::AXIS_SET);
                seg.flags.unset(SegFlags::UNSET_AXIS);
                (seg.dir().other(), seg.source, seg.target)
            };
            for anchor in [source, target] {
                let contact = self.contact_mut(anchor)?;
                match off_dir {
                    Dir::Horiz => contact.position.x = axis,
                    Dir::Vert => contact.position.y = axis,
                }
                self.invalidate_contact(anchor)?;
            }
        }
        Ok(())
    }

    /// Move the canonical axis into its optimal interval (centre when the
    /// current axis lies outside).
    pub(crate) fn to_optimal_axis(&mut self, id: EntityId) -> AutoResult<()> {
        let (axis, optimal) = {
            let seg = self.segment(id)?;
            (seg.axis, seg.optimal)
        };
        let goal = if optimal.is_empty() {
            axis
        } else if axis < optimal.vmin {
            optimal.vmin
        } else if axis > optimal.vmax {
            optimal.vmax
        } else {
            axis
        };
        self.set_axis(id, goal, true)
    }

    /// Clamp the canonical axis into its constraint interval
    pub(crate) fn to_constraint_axis(&mut self, id: EntityId) -> AutoResult<()> {
        let (axis, constraint) = {
            let seg = self.segment(id)?;
            (seg.axis, self.constraint_span(seg)?)
        };
        let goal = if constraint.is_empty() {
            axis
        } else if axis < constraint.vmin {
            constraint.vmin
        } else if axis > constraint.vmax {
            constraint.vmax
        } else {
            axis
        };
        self.set_axis(id, goal, true)
    }

    /// The axis interval a segment may legally occupy: the intersection
    /// of its user constraints with its endpoint contacts' constraint
    /// sides.
    pub(crate) fn constraint_span(&self, seg: &AutoSegment) -> AutoResult<Span> {
        let off_dir = seg.dir().other();
        let mut span = seg.user_constraints;
        for anchor in [seg.source, seg.target] {
            span = span.intersection(&self.contact(anchor)?.u_constraints(off_dir));
        }
        Ok(span)
    }

    // ------------------------------------------------------------------
    // Net-level recomputations

    /// Recompute the topology class and depth range of every contact of
    /// `net` from its current slaves.
    pub(crate) fn update_net_topology(&mut self, net: EntityId) -> AutoResult<()> {
        let contact_ids: Vec<EntityId> = self
            .contacts
            .values()
            .filter(|c| c.net == net)
            .map(|c| c.id)
            .collect();
        for id in contact_ids {
            let (h, v, min_depth, max_depth, lone) = {
                let contact = &self.contacts[&id];
                let mut h = 0u32;
                let mut v = 0u32;
                let mut min_depth = u8::MAX;
                let mut max_depth = 0u8;
                let mut lone = None;
                for slave in &contact.slaves {
                    let seg = self.segment(*slave)?;
                    match seg.dir() {
                        Dir::Horiz => h += 1,
                        Dir::Vert => v += 1,
                    }
                    min_depth = min_depth.min(seg.depth);
                    max_depth = max_depth.max(seg.depth);
                    lone = Some(*slave);
                }
                (h, v, min_depth, max_depth, lone)
            };
            let topology = if self.contacts[&id].flags.contains(ContactFlags::TERMINAL) {
                ContactTopology::Terminal
            } else {
                match (h, v) {
                    (0, 0) | (1, 0) | (0, 1) => {
                        // A via stack end: classify by which side the lone
                        // slave leaves from.
                        match lone {
                            Some(slave) if self.segment(slave)?.source == id => {
                                ContactTopology::SrcVia
                            }
                            Some(_) => ContactTopology::TgtVia,
                            None => ContactTopology::default(),
                        }
                    }
                    (1, 1) => ContactTopology::Turn,
                    (2, 0) | (2, 1) => ContactTopology::HTee,
                    (0, 2) | (1, 2) => ContactTopology::VTee,
                    _ => ContactTopology::Cross,
                }
            };
            let contact = self.contacts.get_mut(&id).unwrap();
            contact.topology = topology;
            if contact.slaves.is_empty() {
                continue;
            }
            contact.min_depth = min_depth;
            contact.max_depth = max_depth;
        }
        Ok(())
    }

    /// Refresh every contact constraint of `net`: the gcell box, reduced
    /// to the terminal pad for terminal contacts.
    pub(crate) fn compute_net_constraints(&mut self, net: EntityId) -> AutoResult<()> {
        let ids: Vec<EntityId> = self
            .contacts
            .values()
            .filter(|c| c.net == net)
            .map(|c| c.id)
            .collect();
        for id in ids {
            let gcell_box = self
                .unwrap(
                    self.grid.get(self.contacts[&id].gcell),
                    "Contact on unknown gcell",
                )?
                .bbox;
            let contact = self.contacts.get_mut(&id).unwrap();
            contact.constraint = if contact.is_fixed() {
                route21db::BoundBox::from_point(contact.position)
            } else {
                gcell_box
            };
        }
        Ok(())
    }

    /// Recompute the optimal axis interval of every invalidated segment of
    /// `net`: the hull of the perpandicular attractors, clamped into the
    /// constraint interval.
    pub(crate) fn compute_net_optimals(&mut self, net: EntityId) -> AutoResult<()> {
        let ids: Vec<EntityId> = self
            .segments
            .values()
            .filter(|s| s.net == net && s.is_invalidated())
            .map(|s| s.id)
            .collect();
        for id in ids {
            let (constraint, attractors) = {
                let seg = self.segment(id)?;
                let off_dir = seg.dir().other();
                let constraint = self.constraint_span(seg)?;
                let mut attractors: Vec<DbUnits> = Vec::new();
                for perp in self.perpandiculars(id)? {
                    let perp_seg = self.segment(perp)?;
                    // The far endpoint of each perpandicular pulls us
                    for anchor in [perp_seg.source, perp_seg.target] {
                        if anchor == seg.source || anchor == seg.target {
                            continue;
                        }
                        attractors.push(self.contact(anchor)?.position.coord(off_dir));
                    }
                }
                (constraint, attractors)
            };
            let optimal = if attractors.is_empty() {
                constraint
            } else {
                let span = Span::new(
                    *attractors.iter().min().unwrap(),
                    *attractors.iter().max().unwrap(),
                );
                let clamped = span.intersection(&constraint);
                if clamped.is_empty() {
                    constraint
                } else {
                    clamped
                }
            };
            self.segment_mut(id)?.optimal = optimal;
        }
        Ok(())
    }

    /// Reclassify the terminal strength of every segment of `net`
    pub(crate) fn compute_net_terminals(&mut self, net: EntityId) -> AutoResult<()> {
        let ids: Vec<EntityId> = self
            .segments
            .values()
            .filter(|s| s.net == net)
            .map(|s| s.id)
            .collect();
        // First pass: strong terminals from endpoint contacts
        for id in &ids {
            let (src_term, tgt_term) = {
                let seg = self.segment(*id)?;
                (
                    self.contact(seg.source)?.is_terminal(),
                    self.contact(seg.target)?.is_terminal(),
                )
            };
            let seg = self.segment_mut(*id)?;
            seg.flags.unset(SegFlags::STRONG_TERMINAL);
            seg.flags.unset(SegFlags::WEAK_TERMINAL_1);
            seg.flags.unset(SegFlags::WEAK_TERMINAL_2);
            seg.flags.unset(SegFlags::SOURCE_TERMINAL);
            seg.flags.unset(SegFlags::TARGET_TERMINAL);
            if src_term {
                seg.flags.set(SegFlags::SOURCE_TERMINAL);
            }
            if tgt_term {
                seg.flags.set(SegFlags::TARGET_TERMINAL);
            }
            if src_term || tgt_term {
                seg.flags.set(SegFlags::STRONG_TERMINAL);
            }
        }
        // Second pass: weak-1 next to strong, weak-2 next to weak-1
        for rank in [SegFlags::WEAK_TERMINAL_1, SegFlags::WEAK_TERMINAL_2] {
            let prior = if rank == SegFlags::WEAK_TERMINAL_1 {
                SegFlags::STRONG_TERMINAL
            } else {
                SegFlags::WEAK_TERMINAL_1
            };
            for id in &ids {
                if self.segment(*id)?.flags.intersects(
                    SegFlags::STRONG_TERMINAL
                        | SegFlags::WEAK_TERMINAL_1
                        | SegFlags::WEAK_TERMINAL_2,
                ) {
                    continue;
                }
                let neighbours = self.neighbours(*id)?;
                let near = neighbours
                    .iter()
                    .any(|n| self.segments[n].flags.contains(prior));
                if near {
                    self.segment_mut(*id)?.flags.set(rank);
                }
            }
        }
        Ok(())
    }

    /// All segments sharing an endpoint contact with `seed`
    fn neighbours(&self, seed: EntityId) -> AutoResult<Vec<EntityId>> {
        let seg = self.segment(seed)?;
        let mut out = Vec::new();
        for anchor in [seg.source, seg.target] {
            for slave in &self.contact(anchor)?.slaves {
                if *slave != seed {
                    out.push(*slave);
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Geometry refresh

    /// Re-centre an invalidated contact inside its constraint area and
    /// snap it onto the routing pitches. Post-condition: the position lies
    /// inside the owning gcell.
    pub(crate) fn update_contact_geometry(&mut self, id: EntityId) -> AutoResult<()> {
        let (mut position, constraint, gcell_box, min_depth) = {
            let contact = self.contact(id)?;
            let gcell_box = self
                .unwrap(self.grid.get(contact.gcell), "Contact on unknown gcell")?
                .bbox;
            (contact.position, contact.constraint, gcell_box, contact.min_depth)
        };
        let area = if constraint.is_empty() {
            gcell_box
        } else {
            let clip = constraint.intersection(&gcell_box);
            if clip.is_empty() {
                gcell_box
            } else {
                clip
            }
        };
        position.x = position.x.clamp(area.p0.x, area.p1.x);
        position.y = position.y.clamp(area.p0.y, area.p1.y);
        // Snap onto the first matching-direction pitch at hand
        for depth in [min_depth, min_depth.saturating_add(1)] {
            if depth >= self.gauge.depth() {
                continue;
            }
            let snapped = self.gauge.snap(depth, position.coord(self.gauge.direction(depth)?.other()))?;
            let snapped = snapped.clamp(area.side(self.gauge.direction(depth)?.other()).vmin,
                                        area.side(self.gauge.direction(depth)?.other()).vmax);
            match self.gauge.direction(depth)? {
                Dir::Horiz => position.y = snapped,
                Dir::Vert => position.x = snapped,
            }
        }
        let contact = self.contact_mut(id)?;
        contact.position = position;
        contact.flags.unset(ContactFlags::INVALIDATED | ContactFlags::CREATED);
        Ok(())
    }

    /// Refresh an invalidated segment after its contacts settled: endpoint
    /// positions, axis, and the via spin flags read off the endpoint
    /// contact layers. Returns whether the perpandicular pitch may have
    /// changed.
    pub(crate) fn revalidate_segment(&mut self, id: EntityId) -> AutoResult<bool> {
        let (dir, source, target, depth, old_spin) = {
            let seg = self.segment(id)?;
            (
                seg.dir(),
                seg.source,
                seg.target,
                seg.depth,
                SegFlags(seg.flags.0 & SegFlags::DEPTH_SPIN.0),
            )
        };
        let src = self.contact(source)?.clone();
        let tgt = self.contact(target)?.clone();
        let routing_basic = self.routing_basic(depth)?;
        let created;
        {
            let seg = self.segments.get_mut(&id).unwrap();
            created = seg.flags.contains(SegFlags::CREATED);
            seg.source_position = src.position.coord(dir);
            seg.target_position = tgt.position.coord(dir);
            seg.axis = src.position.coord(dir.other());
        }
        // Spin flags: which side of each via the wire leaves on
        let src_spin = self.contact_spin(&src, routing_basic);
        let tgt_spin = self.contact_spin(&tgt, routing_basic);
        let seg = self.segments.get_mut(&id).unwrap();
        seg.flags.unset(SegFlags::SOURCE_TOP);
        seg.flags.unset(SegFlags::SOURCE_BOTTOM);
        seg.flags.unset(SegFlags::TARGET_TOP);
        seg.flags.unset(SegFlags::TARGET_BOTTOM);
        if let Some(top) = src_spin {
            seg.flags
                .set(if top { SegFlags::SOURCE_TOP } else { SegFlags::SOURCE_BOTTOM });
        }
        if let Some(top) = tgt_spin {
            seg.flags
                .set(if top { SegFlags::TARGET_TOP } else { SegFlags::TARGET_BOTTOM });
        }
        seg.flags.unset(SegFlags::DEPTH_SPIN);
        if seg.flags.contains(SegFlags::SOURCE_TOP) && seg.flags.contains(SegFlags::TARGET_TOP) {
            seg.flags.set(SegFlags::SPIN_TOP);
        } else if seg.flags.contains(SegFlags::SOURCE_BOTTOM)
            && seg.flags.contains(SegFlags::TARGET_BOTTOM)
        {
            seg.flags.set(SegFlags::SPIN_BOTTOM);
        }
        let new_spin = SegFlags(seg.flags.0 & SegFlags::DEPTH_SPIN.0);
        seg.flags.unset(SegFlags::INVALIDATED_ANY);
        Ok(created || old_spin != new_spin)
    }

    /// The basic layer a routing depth conducts on
    fn routing_basic(&self, depth: u8) -> AutoResult<route21db::LayerKey> {
        let layer_key = self.gauge.routing_layer(depth)?;
        let layer = self.unwrap(
            self.tech.layers.get(layer_key),
            "Routing layer unknown to technology",
        )?;
        Ok(match layer.kind {
            LayerKind::Regular { basic } => basic,
            _ => layer_key,
        })
    }

    /// Whether the wire leaves the contact's via on its top side
    /// ([Some] true), bottom side ([Some] false), or the contact is not a
    /// via at all ([None]).
    fn contact_spin(&self, contact: &AutoContact, routing_basic: route21db::LayerKey) -> Option<bool> {
        let layer = self.tech.layers.get(contact.layer)?;
        match layer.kind {
            LayerKind::Via { bottom, top, .. } => {
                if routing_basic == top {
                    // Wire on the via's top metal: the stack hangs below
                    Some(false)
                } else if routing_basic == bottom {
                    Some(true)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Perpandicular pitch of a segment, from its spin flags
    pub fn ppitch(&self, id: EntityId) -> AutoResult<DbUnits> {
        let seg = self.segment(id)?;
        let allowed = self.config.allowed_depth;
        let top = if seg.is_spin_top() && seg.depth < self.gauge.depth().saturating_sub(1) {
            self.gauge.pitch_of(seg.depth, PitchKind::Above, allowed)?
        } else {
            self.gauge.pitch(seg.depth)?
        };
        let bottom = if seg.is_spin_bottom() && seg.depth > 0 {
            self.gauge.pitch_of(seg.depth, PitchKind::Below, allowed)?
        } else {
            self.gauge.pitch(seg.depth)?
        };
        Ok(top.max(bottom))
    }

    // ------------------------------------------------------------------
    // Destruction

    /// Tear one segment out of the arenas, destroying endpoint contacts
    /// left without slaves.
    pub(crate) fn destroy_segment(&mut self, id: EntityId) -> AutoResult<()> {
        let segment = match self.segments.get_mut(&id) {
            None => return Ok(()), // Already gone
            Some(seg) => {
                seg.state = Lifecycle::Destroying;
                seg.clone()
            }
        };
        self.observers.notify(id, SegmentEvent::Destroy);
        for anchor in [segment.source, segment.target] {
            if let Some(contact) = self.contacts.get_mut(&anchor) {
                contact.slaves.remove(&id);
            }
        }
        self.unlink_segment(id)?;
        for anchor in [segment.source, segment.target] {
            let isolated = self
                .contacts
                .get(&anchor)
                .map(|c| c.can_destroy())
                .unwrap_or(false);
            if isolated {
                self.unlink_contact(anchor)?;
            }
        }
        Ok(())
    }

    /// Rebuild the per-gcell occupancy: contained-segment sets,
    /// feedthrough counts, and per-depth densities (occupied track length
    /// over available track length).
    pub(crate) fn update_occupancy(&mut self) -> AutoResult<()> {
        let depths = self.gauge.depth() as usize;
        for index in 0..self.grid.len() {
            let gcell = self.grid.get_mut(index).unwrap();
            gcell.segments.clear();
            gcell.feedthroughs = vec![0; depths];
            gcell.densities = vec![0.0; depths];
        }
        let entries: Vec<(EntityId, Dir, DbUnits, Span, u8)> = self
            .segments
            .values()
            .map(|s| (s.id, s.dir(), s.axis, s.span_u(), s.depth))
            .collect();
        for (id, dir, axis, span, depth) in entries {
            for index in self.grid.along(dir, axis, span) {
                let side = self.grid.get(index).unwrap().side(dir);
                let cross = self.grid.get(index).unwrap().side(dir.other()).size();
                let covered = side.intersection(&span).size();
                let full = span.vmin <= side.vmin && side.vmax <= span.vmax;
                let tracks = self.gauge.track_count(depth, cross)?.max(1);
                let length = side.size().raw().max(1) as f64;
                let gcell = self.grid.get_mut(index).unwrap();
                gcell.segments.insert(id);
                if full {
                    gcell.feedthroughs[depth as usize] += 1;
                }
                gcell.densities[depth as usize] +=
                    covered.raw() as f64 / (length * tracks as f64);
            }
        }
        Ok(())
    }

    /// Record a recoverable defect and log it
    pub(crate) fn diagnose(&mut self, err: AutoError) {
        if err.is_fatal() {
            error!("{}", err);
        } else {
            warn!("{}", err);
        }
        self.diagnostics.push(err);
    }
}
