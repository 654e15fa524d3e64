//!
//! # Ripup Bookkeeping
//!
//! The negotiation loop tears mis-placed segments off their tracks and
//! re-places them; this module keeps the score. Every segment belongs to a
//! ripup category with its own allowance from [RipupLimits]; once a
//! segment exhausts its allowance it is declared failed and left alone.
//! A process-wide event counter enforces the configured hard ceiling on
//! negotiation events.
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io
use log::{debug, warn};

// Local Imports
use crate::engine::AutoEngine;
use crate::error::{AutoError, AutoResult};
use crate::segment::{compare_by_depth_length, SegFlags};
use route21db::EntityId;

/// Ripup allowance categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RipupKind {
    /// Dogleg straps produced by earlier breaks
    Strap,
    /// Globals no longer than three gcell spans
    GlobalShort,
    /// Long-haul globals
    GlobalLong,
    /// Everything local
    Local,
}

/// # Ripup Tracker
#[derive(Debug, Default)]
pub struct RipupTracker {
    /// Per-segment ripup counts
    counts: BTreeMap<EntityId, u32>,
    /// Negotiation events consumed so far
    events: u64,
    /// Segments that exhausted their allowance
    failed: Vec<EntityId>,
}
impl RipupTracker {
    pub fn new() -> Self {
        Self::default()
    }
    /// Events consumed so far
    pub fn events(&self) -> u64 {
        self.events
    }
    /// Segments declared failed, in failure order
    pub fn failed(&self) -> &[EntityId] {
        &self.failed
    }
    /// How often `id` has been ripped up
    pub fn count(&self, id: EntityId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    /// The category of a segment, from its flags and span
    pub fn classify(engine: &AutoEngine, id: EntityId) -> AutoResult<RipupKind> {
        let seg = engine.segment(id)?;
        if seg.flags.contains(SegFlags::DOGLEG) {
            return Ok(RipupKind::Strap);
        }
        if !seg.is_global() {
            return Ok(RipupKind::Local);
        }
        let crossed = engine
            .grid
            .along(seg.dir(), seg.axis, seg.span_u())
            .len();
        Ok(if crossed > 3 {
            RipupKind::GlobalLong
        } else {
            RipupKind::GlobalShort
        })
    }

    fn allowance(engine: &AutoEngine, kind: RipupKind) -> u32 {
        let limits = &engine.config.ripup_limits;
        match kind {
            RipupKind::Strap => limits.strap,
            RipupKind::GlobalShort => limits.global_short,
            RipupKind::GlobalLong => limits.global_long,
            RipupKind::Local => limits.local,
        }
    }

    /// Whether `id` may still be ripped up
    pub fn can_ripup(&self, engine: &AutoEngine, id: EntityId) -> AutoResult<bool> {
        let kind = Self::classify(engine, id)?;
        Ok(self.count(id) < Self::allowance(engine, kind))
    }

    /// # Ripup
    ///
    /// Tear `id` off its track: forget its axis so the next revalidation
    /// re-places it from its optimal interval. Returns false (and records
    /// the failure) when the segment is out of allowance; exhausting the
    /// event ceiling is fatal.
    pub fn ripup(&mut self, engine: &mut AutoEngine, id: EntityId) -> AutoResult<bool> {
        self.events += 1;
        if self.events > engine.config.events_limit {
            return Err(AutoError::Overflow {
                message: format!("Negotiation event ceiling ({}) reached", engine.config.events_limit),
            });
        }
        if engine.segment(id)?.is_fixed() {
            return Err(AutoError::FixedSegment { segment: id });
        }
        if !self.can_ripup(engine, id)? {
            warn!("Segment {:?} out of ripup allowance", id);
            if !self.failed.contains(&id) {
                self.failed.push(id);
            }
            return Ok(false);
        }
        *self.counts.entry(id).or_insert(0) += 1;
        {
            let seg = engine.segment_mut(id)?;
            seg.flags.set(SegFlags::UNSET_AXIS);
            seg.flags.unset(SegFlags::AXIS_SET);
        }
        engine.invalidate_segment(id)?;
        let net = engine.segment(id)?.net;
        engine.invalidate_net(net)?;
        debug!("Ripup #{} on {:?}", self.count(id), id);
        Ok(true)
    }

    /// Deterministic processing order for a batch of ripup candidates:
    /// lowest depth first, then source-u, longest first among equals.
    pub fn schedule(engine: &AutoEngine, ids: &mut Vec<EntityId>) {
        ids.retain(|id| engine.lookup_segment(*id).is_some());
        ids.sort_by(|a, b| {
            let sa = engine.lookup_segment(*a).unwrap();
            let sb = engine.lookup_segment(*b).unwrap();
            compare_by_depth_length(sa, sb)
        });
    }
}
