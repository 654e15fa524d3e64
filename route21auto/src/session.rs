//!
//! # Session
//!
//! The transactional layer over the engine. A session collects
//! invalidations — nets, contacts, segments — and applies them in one
//! coherent revalidation pass when it closes. Open/close are strictly
//! paired; re-entrant opens on the same cell join the live session rather
//! than nesting; an open for a different owner is refused.
//!
//! The revalidation pipeline, in order: net topology and constraints,
//! canonical election, canonical axis placement, contact geometry, segment
//! refresh, queued destructions, then the per-track reorder.
//!

// Std-Lib
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

// Crates.io
use log::{debug, error, info};

// Local Imports
use crate::engine::AutoEngine;
use crate::error::{AutoError, AutoResult};
use crate::observer::SegmentEvent;
use crate::segment::SegFlags;
use route21db::EntityId;

/// # Session State
///
/// The pending-change sets of one open session. Ordered sets keep every
/// drain deterministic.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Join depth: re-entrant opens increment, closes decrement
    pub depth: u32,
    /// Invalidated nets
    pub nets: BTreeSet<EntityId>,
    /// Invalidated contacts
    pub contacts: BTreeSet<EntityId>,
    /// Invalidated segments
    pub segments: BTreeSet<EntityId>,
    /// Segments refreshed by the last revalidation
    pub revalidateds: Vec<EntityId>,
    /// Segments produced by dogleg breaks, in (head, middle, tail) order
    pub doglegs: Vec<EntityId>,
    /// Segments queued for destruction after revalidation
    pub destroyed: BTreeSet<EntityId>,
}

/// # Session Entry Point
///
/// `Session::open(engine)` yields a [SessionGuard]; dropping the guard
/// closes the session (and revalidates). Use [SessionGuard::close] to
/// observe revalidation failures instead of having them logged from drop.
pub struct Session;
impl Session {
    pub fn open(engine: &mut AutoEngine) -> AutoResult<SessionGuard<'_>> {
        let owner = engine.cell_id;
        engine.open_session_for(owner)?;
        Ok(SessionGuard {
            engine: Some(engine),
        })
    }
}

/// RAII handle on an open session. Dereferences to the engine.
pub struct SessionGuard<'a> {
    engine: Option<&'a mut AutoEngine>,
}
impl<'a> SessionGuard<'a> {
    /// Close explicitly, surfacing the revalidation outcome
    pub fn close(mut self) -> AutoResult<usize> {
        let engine = self.engine.take().unwrap();
        engine.close_session()
    }
}
impl Deref for SessionGuard<'_> {
    type Target = AutoEngine;
    fn deref(&self) -> &Self::Target {
        self.engine.as_ref().unwrap()
    }
}
impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_mut().unwrap()
    }
}
impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.close_session() {
                error!("Session close from drop failed: {}", e);
            }
        }
    }
}

impl AutoEngine {
    /// Open (or join) the session for `owner`. Joining requires the same
    /// owner cell; any other owner is a [AutoError::SessionReopen].
    pub fn open_session_for(&mut self, owner: EntityId) -> AutoResult<()> {
        if let Some(session) = self.session.as_mut() {
            if owner != self.cell_id {
                return Err(AutoError::SessionReopen);
            }
            session.depth += 1;
            debug!("Joining session (depth {})", session.depth);
            return Ok(());
        }
        if owner != self.cell_id {
            return Err(AutoError::SessionReopen);
        }
        info!("Session open on cell {:?}", self.cell_id);
        self.session = Some(SessionState {
            depth: 1,
            ..Default::default()
        });
        Ok(())
    }

    /// Close one nesting level; the outermost close revalidates and
    /// releases the slot. Returns the number of refreshed entities.
    pub fn close_session(&mut self) -> AutoResult<usize> {
        let depth = match self.session.as_mut() {
            None => {
                return Err(AutoError::NoSession {
                    context: "close_session".to_string(),
                })
            }
            Some(session) => {
                session.depth -= 1;
                session.depth
            }
        };
        if depth > 0 {
            return Ok(0);
        }
        let count = match self.revalidate() {
            Ok(count) => count,
            Err(e) => {
                // Never skip the release; flag the engine for repair.
                self.needs_repair = true;
                self.diagnose(e);
                0
            }
        };
        let session = self.session.take().unwrap();
        if !session.nets.is_empty()
            || !session.contacts.is_empty()
            || !session.segments.is_empty()
            || !session.destroyed.is_empty()
        {
            self.needs_repair = true;
            error!("Session closed with non-empty pending sets");
        }
        info!("Session closed ({} revalidateds)", count);
        Ok(count)
    }

    /// Access the open session state, or fail with [AutoError::NoSession]
    pub(crate) fn require_session(&mut self, context: &str) -> AutoResult<&mut SessionState> {
        self.session.as_mut().ok_or_else(|| AutoError::NoSession {
            context: context.to_string(),
        })
    }

    /// Queue a net for topology recomputation
    pub fn invalidate_net(&mut self, net: EntityId) -> AutoResult<()> {
        self.require_session("invalidate_net")?.nets.insert(net);
        Ok(())
    }
    /// Queue a contact for geometry refresh
    pub fn invalidate_contact(&mut self, id: EntityId) -> AutoResult<()> {
        self.require_session("invalidate_contact")?
            .contacts
            .insert(id);
        if let Some(contact) = self.contacts.get_mut(&id) {
            contact
                .flags
                .set(crate::contact::ContactFlags::INVALIDATED);
        }
        Ok(())
    }
    /// Queue a segment for refresh, and notify observers
    pub fn invalidate_segment(&mut self, id: EntityId) -> AutoResult<()> {
        self.require_session("invalidate_segment")?
            .segments
            .insert(id);
        let newly = {
            let seg = self.segment_mut(id)?;
            let newly = !seg.is_invalidated();
            seg.flags.set(SegFlags::INVALIDATED);
            newly
        };
        if newly {
            self.observers.notify(id, SegmentEvent::Invalidate);
        }
        Ok(())
    }
    /// Queue a segment for destruction once revalidation has read it
    pub fn destroy_request(&mut self, id: EntityId) -> AutoResult<()> {
        self.require_session("destroy_request")?
            .destroyed
            .insert(id);
        Ok(())
    }
    /// The segments produced by dogleg breaks this session, in
    /// (head, middle, tail) triples
    pub fn doglegs(&self) -> &[EntityId] {
        match self.session.as_ref() {
            Some(session) => &session.doglegs,
            None => &[],
        }
    }
    /// Forget the dogleg list
    pub fn dogleg_reset(&mut self) -> AutoResult<()> {
        self.require_session("dogleg_reset")?.doglegs.clear();
        Ok(())
    }

    /// # Revalidation
    ///
    /// One coherent pass over everything invalidated since the session
    /// opened (or since the previous explicit call). Canonicalisation
    /// precedes geometry; the track reorder runs last. A second call with
    /// nothing pending is a no-op.
    pub fn revalidate(&mut self) -> AutoResult<usize> {
        self.require_session("revalidate")?;
        debug!("Revalidation begins");
        let mut count = 0usize;

        // Phase 1: net-level topology, constraints, optimals, terminals
        if self.check_interrupt()? {
            return Ok(count);
        }
        let nets: Vec<EntityId> = {
            let session = self.session.as_mut().unwrap();
            std::mem::take(&mut session.nets).into_iter().collect()
        };
        for net in &nets {
            self.update_net_topology(*net)?;
            self.compute_net_constraints(*net)?;
            self.compute_net_optimals(*net)?;
            self.compute_net_terminals(*net)?;
        }

        // Phase 2: canonical election over the invalidated segments
        if self.check_interrupt()? {
            return Ok(count);
        }
        let invalidated: Vec<EntityId> = self
            .session
            .as_ref()
            .unwrap()
            .segments
            .iter()
            .copied()
            .collect();
        self.canonize(&invalidated)?;

        // Phase 3: place every canonical axis
        for id in &invalidated {
            let seg = match self.segments.get(id) {
                None => continue,
                Some(seg) => seg,
            };
            if !seg.is_canonical() {
                continue;
            }
            if seg.has_unset_axis() {
                self.to_optimal_axis(*id)?;
            } else {
                self.to_constraint_axis(*id)?;
            }
        }

        // Phase 4: contact geometry. Slaves of a moved contact must
        // refresh their endpoints even when not invalidated themselves.
        if self.check_interrupt()? {
            return Ok(count);
        }
        let contacts: Vec<EntityId> = {
            let session = self.session.as_mut().unwrap();
            std::mem::take(&mut session.contacts).into_iter().collect()
        };
        let mut refresh: BTreeSet<EntityId> = invalidated.iter().copied().collect();
        for id in contacts {
            if self.contacts.contains_key(&id) {
                self.update_contact_geometry(id)?;
                refresh.extend(self.contacts[&id].slaves.iter().copied());
                count += 1;
            }
        }

        // Phase 5: segment refresh + observer notifications
        if self.check_interrupt()? {
            return Ok(count);
        }
        let destroyed = self.session.as_ref().unwrap().destroyed.clone();
        let mut revalidateds = Vec::new();
        for id in &refresh {
            if !self.segments.contains_key(id) {
                continue;
            }
            let repitch = self.revalidate_segment(*id)?;
            count += 1;
            self.observers.notify(
                *id,
                if repitch {
                    SegmentEvent::RevalidatePPitch
                } else {
                    SegmentEvent::Revalidate
                },
            );
            if !destroyed.contains(id) {
                revalidateds.push(*id);
            }
        }
        {
            let session = self.session.as_mut().unwrap();
            session.segments.clear();
            session.revalidateds = revalidateds;
        }
        self.observers.drain();

        // Phase 6: queued destructions
        let queued: Vec<EntityId> = {
            let session = self.session.as_mut().unwrap();
            std::mem::take(&mut session.destroyed).into_iter().collect()
        };
        for id in queued {
            self.destroy_segment(id)?;
        }
        self.observers.drain();

        // Phase 7: per-track reorder over the refreshed segments
        if self.check_interrupt()? {
            return Ok(count);
        }
        self.reorder_tracks()?;
        self.update_occupancy()?;

        debug!("Revalidation done ({} entities)", count);
        Ok(count)
    }

    /// Check the cooperative interrupt. On interrupt: canonical election
    /// is already complete for every chain seen, so just clear the pending
    /// sets and execute the queued destructions.
    fn check_interrupt(&mut self) -> AutoResult<bool> {
        if !self.interrupt.load(Ordering::Relaxed) {
            return Ok(false);
        }
        info!("Session interrupted; committing partial progress");
        let queued: Vec<EntityId> = {
            let session = self.session.as_mut().unwrap();
            session.nets.clear();
            session.contacts.clear();
            session.segments.clear();
            std::mem::take(&mut session.destroyed).into_iter().collect()
        };
        for id in queued {
            self.destroy_segment(id)?;
        }
        self.observers.drain();
        Ok(true)
    }

    /// # Track Reorder
    ///
    /// Group the refreshed canonical segments by (depth, axis), sort each
    /// group by (source-u, id), and verify that no two non-fixed segments
    /// overlap. An overlap is an invariant breach: logged, engine flagged.
    fn reorder_tracks(&mut self) -> AutoResult<()> {
        let revalidateds = self.session.as_ref().unwrap().revalidateds.clone();
        let mut touched: BTreeSet<(u8, route21db::DbUnits)> = BTreeSet::new();
        for id in &revalidateds {
            if let Some(seg) = self.segments.get(id) {
                if seg.is_canonical() {
                    touched.insert((seg.depth, seg.axis));
                }
            }
        }
        for (depth, axis) in touched {
            let mut track: Vec<EntityId> = self
                .segments
                .values()
                .filter(|s| s.is_canonical() && s.depth == depth && s.axis == axis)
                .map(|s| s.id)
                .collect();
            track.sort_by_key(|id| {
                let seg = &self.segments[id];
                (seg.source_u(), seg.id)
            });
            for pair in track.windows(2) {
                let a = &self.segments[&pair[0]];
                let b = &self.segments[&pair[1]];
                if a.is_fixed() || b.is_fixed() {
                    continue;
                }
                let overlap = a.span_u().intersection(&b.span_u());
                if overlap.size() > route21db::DbUnits(0) {
                    self.needs_repair = true;
                    error!(
                        "Track overlap at depth {} axis {:?}: {:?} vs {:?}",
                        depth, axis, a.id, b.id
                    );
                }
            }
        }
        Ok(())
    }
}
