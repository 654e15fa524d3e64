//!
//! # Detailed-Routing Operations
//!
//! The mutations the negotiation layer drives: dogleg breaks, layer
//! changes, slackening, and the reduce/raise pair collapsing short via
//! stacks. All of them queue invalidations; geometry settles at the next
//! revalidation.
//!

// Crates.io
use log::debug;

// Local Imports
use crate::engine::AutoEngine;
use crate::error::{AutoError, AutoResult};
use crate::segment::SegFlags;
use route21db::utils::Unwrapper;
use route21db::{DbUnits, Dir, EntityId, Point, Span};

impl AutoEngine {
    /// Which side of `window` a dogleg can break on: `Some(true)` for the
    /// left (low) edge, `Some(false)` for the right, [None] when every
    /// covering chain member is fixed or absent.
    pub fn can_dogleg_over(&self, id: EntityId, window: Span) -> AutoResult<Option<bool>> {
        let mut members = vec![id];
        if !self.segment(id)?.is_not_aligned() {
            members.extend(self.aligneds(id)?);
        }
        let mut left = None;
        let mut right = None;
        for member in members {
            let seg = self.segment(member)?;
            if seg.is_fixed() {
                continue;
            }
            if seg.span_u().contains(window.vmin) && left.is_none() {
                left = Some(member);
            }
            if seg.span_u().contains(window.vmax) && right.is_none() {
                right = Some(member);
            }
        }
        Ok(match (left, right) {
            (Some(_), _) => Some(true),
            (None, Some(_)) => Some(false),
            (None, None) => None,
        })
    }

    /// # Dogleg Around a Window
    ///
    /// Break the chain so that the resulting head clears the `window`
    /// interval: the cut lands one pitch outside the window, on the chain
    /// member covering the chosen edge. The middle leg's axis is pinned to
    /// the cut so revalidation cannot slide it back over the obstacle.
    pub fn make_dogleg_over(&mut self, id: EntityId, window: Span) -> AutoResult<[EntityId; 3]> {
        self.require_session("make_dogleg_over")?;
        let on_left = match self.can_dogleg_over(id, window)? {
            Some(side) => side,
            None => return Err(AutoError::Span { segment: id }),
        };
        let (candidate, pitch) = {
            let mut members = vec![id];
            if !self.segment(id)?.is_not_aligned() {
                members.extend(self.aligneds(id)?);
            }
            let edge = if on_left { window.vmin } else { window.vmax };
            let candidate = members
                .into_iter()
                .find(|m| {
                    self.segment(*m)
                        .map(|s| !s.is_fixed() && s.span_u().contains(edge))
                        .unwrap_or(false)
                })
                .ok_or(AutoError::Span { segment: id })?;
            let depth = self.segment(candidate)?.depth;
            (candidate, self.gauge.pitch(depth)?)
        };
        let cut = if on_left {
            window.vmin - pitch
        } else {
            window.vmax + pitch
        };
        // Find the gcell whose side covers the cut coordinate
        let (dir, axis, span) = {
            let seg = self.segment(candidate)?;
            (seg.dir(), seg.axis, seg.span_u())
        };
        let gcell = self
            .grid
            .along(dir, axis, span)
            .into_iter()
            .find(|g| self.grid.get(*g).unwrap().side(dir).contains(cut))
            .ok_or(AutoError::Span { segment: id })?;
        let triple = self.make_dogleg(candidate, gcell)?;
        self.set_axis(triple[1], cut.max(span.vmin).min(span.vmax), false)?;
        Ok(triple)
    }
    /// # Dogleg Break
    ///
    /// Split the segment at `gcell`: the original segment becomes the
    /// head, a new perpandicular middle rides the gauge-paired layer, and
    /// a new tail continues on the original layer. When the gcell falls
    /// outside this segment's span, the break is attempted on an aligned
    /// sibling covering it.
    ///
    /// Returns (head, middle, tail), also appended to the session's
    /// dogleg list so callers may adjust axes before revalidation.
    pub fn make_dogleg(&mut self, id: EntityId, gcell: usize) -> AutoResult<[EntityId; 3]> {
        self.require_session("make_dogleg")?;
        let seg = self.segment(id)?;
        if seg.is_fixed() {
            return Err(AutoError::FixedSegment { segment: id });
        }
        let dir = seg.dir();
        let span = seg.span_u();
        let not_aligned = seg.is_not_aligned();
        let side = self
            .grid
            .get(gcell)
            .unwrapper(self, "Dogleg on unknown gcell")?
            .side(dir);
        if side.intersects(&span) {
            return self.make_dogleg_in(id, gcell);
        }
        if !not_aligned {
            for aligned in self.aligneds(id)? {
                let other = self.segment(aligned)?;
                if other.is_fixed() {
                    continue;
                }
                if side.intersects(&other.span_u()) {
                    debug!("Dogleg relayed to aligned {:?}", aligned);
                    return self.make_dogleg_in(aligned, gcell);
                }
            }
        }
        Err(AutoError::Span { segment: id })
    }

    /// The actual break, once `gcell` is known to cover `id`'s span
    fn make_dogleg_in(&mut self, id: EntityId, gcell: usize) -> AutoResult<[EntityId; 3]> {
        let (dir, depth, axis, net, target, span) = {
            let seg = self.segment(id)?;
            (
                seg.dir(),
                seg.depth,
                seg.axis,
                seg.net,
                seg.target,
                seg.span_u(),
            )
        };
        let perp_depth = self.gauge.paired_depth(depth, self.config.allowed_depth)?;
        let side = self.grid.get(gcell).unwrap().side(dir);
        let cut = side.intersection(&span);
        // Cut on the perpandicular layer's track grid, inside the window
        let ucut = self
            .gauge
            .snap(perp_depth, DbUnits((cut.vmin.raw() + cut.vmax.raw()) / 2))?
            .clamp(cut.vmin, cut.vmax);
        let at = match dir {
            Dir::Horiz => Point::new(ucut, axis),
            Dir::Vert => Point::new(axis, ucut),
        };
        let contact_depth = depth.min(perp_depth);
        let c1 = self.create_contact(net, at, contact_depth)?;
        let c2 = self.create_contact(net, at, contact_depth)?;

        // Rewire: head keeps the original id and source, ends on c1
        if let Some(contact) = self.contacts.get_mut(&target) {
            contact.slaves.remove(&id);
        }
        {
            let seg = self.segment_mut(id)?;
            seg.target = c1;
            seg.target_position = ucut;
            seg.flags.set(SegFlags::INVALIDATED_TARGET);
        }
        self.contact_mut(c1)?.slaves.insert(id);

        let middle = self.create_segment(net, c1, c2, perp_depth)?;
        let tail = self.create_segment(net, c2, target, depth)?;
        {
            let seg = self.segment_mut(middle)?;
            seg.flags.set(SegFlags::DOGLEG);
            seg.parent = Some(id);
        }
        {
            let seg = self.segment_mut(tail)?;
            seg.flags.set(SegFlags::DOGLEG);
            seg.parent = Some(id);
        }
        self.invalidate_segment(id)?;
        self.invalidate_contact(target)?;
        self.invalidate_net(net)?;

        let session = self.require_session("make_dogleg")?;
        session.doglegs.push(id);
        session.doglegs.push(middle);
        session.doglegs.push(tail);
        debug!(
            "Dogleg {:?} at gcell {}: head {:?}, middle {:?}, tail {:?}",
            id, gcell, id, middle, tail
        );
        Ok([id, middle, tail])
    }

    /// # Layer Change
    ///
    /// Relocate a canonical segment and its whole aligned chain two depths
    /// up, adjusting every endpoint contact along the chain. Refused on
    /// fixed segments; returns whether the move happened.
    pub fn move_up(&mut self, id: EntityId) -> AutoResult<bool> {
        let depth = self.segment(id)?.depth;
        if depth + 2 > self.config.allowed_depth {
            return Ok(false);
        }
        self.change_chain_depth(id, depth + 2)
    }
    /// Mirror of [AutoEngine::move_up], two depths down
    pub fn move_down(&mut self, id: EntityId) -> AutoResult<bool> {
        let depth = self.segment(id)?.depth;
        if depth < 2 {
            return Ok(false);
        }
        self.change_chain_depth(id, depth - 2)
    }

    fn change_chain_depth(&mut self, id: EntityId, new_depth: u8) -> AutoResult<bool> {
        self.require_session("change_chain_depth")?;
        if self.segment(id)?.is_fixed() {
            return Ok(false);
        }
        let mut members = vec![id];
        if !self.segment(id)?.is_not_aligned() {
            members.extend(self.aligneds(id)?);
        }
        let net = self.segment(id)?.net;
        let mut anchors = Vec::new();
        for member in &members {
            let (source, target) = {
                let seg = self.segment_mut(*member)?;
                seg.depth = new_depth;
                seg.flags.set(
                    SegFlags::INVALIDATED_LAYER
                        | SegFlags::INVALIDATED_SOURCE
                        | SegFlags::INVALIDATED_TARGET,
                );
                (seg.source, seg.target)
            };
            self.invalidate_segment(*member)?;
            anchors.push(source);
            anchors.push(target);
        }
        // Neighbour contacts follow: their depth range and via layer must
        // keep bridging the slaves they still anchor.
        for anchor in anchors {
            let (min_depth, max_depth) = {
                let contact = self.contact(anchor)?;
                let mut min_depth = u8::MAX;
                let mut max_depth = 0u8;
                for slave in &contact.slaves {
                    let d = self.segment(*slave)?.depth;
                    min_depth = min_depth.min(d);
                    max_depth = max_depth.max(d);
                }
                (min_depth, max_depth)
            };
            if min_depth <= max_depth {
                let layer = self.gauge.contact_layer(min_depth)?;
                let contact = self.contact_mut(anchor)?;
                contact.min_depth = min_depth;
                contact.max_depth = max_depth;
                contact.layer = layer;
            }
            self.invalidate_contact(anchor)?;
        }
        self.invalidate_net(net)?;
        Ok(true)
    }

    /// Whether [AutoEngine::slacken] can make progress on this segment
    pub fn can_slacken(&self, id: EntityId) -> AutoResult<bool> {
        let seg = self.segment(id)?;
        if seg.is_fixed() || seg.flags.contains(SegFlags::SLACKENED) {
            return Ok(false);
        }
        if seg.is_strong_terminal() {
            return Ok(true);
        }
        let constraint = self.constraint_span(seg)?;
        Ok(!constraint.is_empty() && !constraint.contains(seg.axis))
    }

    /// # Slacken
    ///
    /// Relieve a constraint-violating segment by breaking it at its
    /// source-side gcell, freeing the head to move. Returns whether any
    /// progress was made.
    pub fn slacken(&mut self, id: EntityId) -> AutoResult<bool> {
        self.require_session("slacken")?;
        if !self.can_slacken(id)? {
            return Ok(false);
        }
        let gcell = {
            let seg = self.segment(id)?;
            self.contact(seg.source)?.gcell
        };
        self.make_dogleg(id, gcell)?;
        self.segment_mut(id)?.flags.set(SegFlags::SLACKENED);
        Ok(true)
    }

    /// Whether this segment is a reduction candidate: a short local wire
    /// spinning strictly between the top and bottom of a two-via stack.
    pub fn can_reduce(&self, id: EntityId) -> AutoResult<bool> {
        let seg = self.segment(id)?;
        if seg.is_global() || !seg.is_spin_top_or_bottom() || seg.reduceds != 0 {
            return Ok(false);
        }
        let (src_turn, tgt_turn) = (
            self.contact(seg.source)?.is_turn(),
            self.contact(seg.target)?.is_turn(),
        );
        if !src_turn || !tgt_turn {
            return Ok(false);
        }
        let perp_depth = if seg.is_spin_bottom() {
            seg.depth.wrapping_sub(1)
        } else {
            let up = seg.depth + 1;
            if up >= self.gauge.depth() {
                return Ok(false);
            }
            up
        };
        if perp_depth >= self.gauge.depth() {
            return Ok(false);
        }
        Ok(seg.length() < self.gauge.pitch(perp_depth)? * 2i64)
    }

    /// Collapse the via stack: the segment keeps existing but contributes
    /// no metal until [AutoEngine::raise] rematerialises it.
    pub fn reduce(&mut self, id: EntityId) -> AutoResult<bool> {
        self.require_session("reduce")?;
        if !self.can_reduce(id)? {
            return Ok(false);
        }
        let (source, target) = {
            let seg = self.segment(id)?;
            (seg.source, seg.target)
        };
        self.segment_mut(id)?.flags.set(SegFlags::REDUCED);
        for anchor in [source, target] {
            let perp = self.perpandicular_at(anchor, id)?;
            self.segment_mut(perp)?.reduceds += 1;
        }
        Ok(true)
    }

    /// A reduced segment must rematerialise once it has stretched past
    /// twice its perpandicular pitch.
    pub fn must_raise(&self, id: EntityId) -> AutoResult<bool> {
        let seg = self.segment(id)?;
        if !seg.is_reduced() {
            return Ok(false);
        }
        let perp_depth = if seg.is_spin_bottom() {
            seg.depth.wrapping_sub(1)
        } else if seg.is_spin_top() {
            seg.depth + 1
        } else {
            return Ok(true);
        };
        if perp_depth >= self.gauge.depth() {
            return Ok(true);
        }
        Ok(seg.length() >= self.gauge.pitch(perp_depth)? * 2i64)
    }

    /// Undo a reduction
    pub fn raise(&mut self, id: EntityId) -> AutoResult<bool> {
        self.require_session("raise")?;
        if !self.segment(id)?.is_reduced() {
            return Ok(false);
        }
        let (source, target) = {
            let seg = self.segment(id)?;
            (seg.source, seg.target)
        };
        self.segment_mut(id)?.flags.unset(SegFlags::REDUCED);
        for anchor in [source, target] {
            let perp = self.perpandicular_at(anchor, id)?;
            let seg = self.segment_mut(perp)?;
            seg.reduceds = seg.reduceds.saturating_sub(1);
        }
        self.invalidate_segment(id)?;
        Ok(true)
    }
}
