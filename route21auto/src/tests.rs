//!
//! # Unit Tests
//!
//! Session-level scenarios over a four-depth unit gauge on a 4×4 gcell
//! grid.
//!

// Local imports
use crate::config::Configuration;
use crate::engine::{AutoEngine, GlobalRouterOracle};
use crate::error::{AutoError, AutoResult};
use crate::gauge::{RoutingGauge, RoutingLayerGauge};
use crate::segment::SegFlags;
use crate::session::Session;
use route21db::utils::Ptr;
use route21db::{Cell, DbUnits, Dir, EntityId, Point, Technology};

/// 400×400 area cut into 100-unit gcells
struct UnitOracle;
impl GlobalRouterOracle for UnitOracle {
    fn horizontal_cut_lines(&self) -> Vec<DbUnits> {
        (0..=4).map(|i| DbUnits(i * 100)).collect()
    }
    fn vertical_cut_lines(&self) -> Vec<DbUnits> {
        (0..=4).map(|i| DbUnits(i * 100)).collect()
    }
    fn edge_capacity(&self, _gcell: usize, _dir: Dir) -> Option<u32> {
        None
    }
}

/// Four alternating-direction depths, pitch 10, with via layers between
fn unit_engine() -> AutoResult<(AutoEngine, EntityId)> {
    let mut tech = Technology::new("unit");
    let mut metals = Vec::new();
    let mut cuts = Vec::new();
    for i in 1..=4 {
        metals.push(tech.add_basic(format!("M{}", i))?);
    }
    for i in 1..=3 {
        cuts.push(tech.add_basic(format!("C{}{}", i, i + 1))?);
    }
    let mut routings = Vec::new();
    for (i, m) in metals.iter().enumerate() {
        routings.push(tech.add_regular(
            format!("METAL{}", i + 1),
            *m,
            DbUnits(2),
            DbUnits(4),
            DbUnits(1),
        )?);
    }
    let mut vias = Vec::new();
    for i in 0..3 {
        vias.push(tech.add_via(
            format!("VIA{}{}", i + 1, i + 2),
            metals[i],
            cuts[i],
            metals[i + 1],
            DbUnits(2),
            DbUnits(1),
        )?);
    }
    let gauges = (0..4)
        .map(|d| RoutingLayerGauge {
            layer: routings[d],
            contact: vias[d.min(2)],
            dir: if d % 2 == 0 { Dir::Horiz } else { Dir::Vert },
            pitch: DbUnits(10),
            offset: DbUnits(0),
            wire_width: DbUnits(4),
            via_width: DbUnits(4),
        })
        .collect();
    let gauge = RoutingGauge::new("unit", gauges);

    let mut cell = Cell::new("routed")?;
    let net = cell.add_net("n")?;
    let engine = AutoEngine::new(
        Ptr::new(cell),
        tech,
        gauge,
        Configuration::default(),
        &UnitOracle,
    )?;
    Ok((engine, net))
}

/// Two collinear horizontals joined at a shared contact
fn aligned_pair(
    engine: &mut AutoEngine,
    net: EntityId,
) -> AutoResult<(EntityId, EntityId, EntityId)> {
    let mut session = Session::open(engine)?;
    let a = session.create_contact(net, Point::new(0, 100), 0)?;
    let c = session.create_contact(net, Point::new(50, 100), 0)?;
    let b = session.create_contact(net, Point::new(100, 100), 0)?;
    let h1 = session.create_segment(net, a, c, 0)?;
    let h2 = session.create_segment(net, c, b, 0)?;
    session.close()?;
    Ok((h1, h2, c))
}

/// Mutations outside a session are refused
#[test]
fn no_session_is_an_error() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let result = engine.create_contact(net, Point::new(10, 10), 0);
    assert!(matches!(result, Err(AutoError::NoSession { .. })));
    Ok(())
}

/// Re-entrant opens join; a different owner is refused
#[test]
fn session_join_and_reopen() -> AutoResult<()> {
    let (mut engine, _) = unit_engine()?;
    let owner = engine.cell_id;
    engine.open_session_for(owner)?;
    engine.open_session_for(owner)?; // Joins
    assert!(matches!(
        engine.open_session_for(EntityId(u64::MAX - 1)),
        Err(AutoError::SessionReopen)
    ));
    assert_eq!(engine.close_session()?, 0); // Inner
    engine.close_session()?; // Outer, revalidates
    assert!(matches!(
        engine.close_session(),
        Err(AutoError::NoSession { .. })
    ));
    Ok(())
}

/// Opening, doing nothing and closing changes nothing; a second
/// revalidate after the first is a no-op
#[test]
fn session_idempotence() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let (h1, _, _) = aligned_pair(&mut engine, net)?;
    let before = engine.lookup_segment(h1).unwrap().clone();

    let mut session = Session::open(&mut engine)?;
    assert_eq!(session.revalidate()?, 0);
    assert_eq!(session.revalidate()?, 0);
    session.close()?;

    let after = engine.lookup_segment(h1).unwrap();
    assert_eq!(before.axis, after.axis);
    assert_eq!(before.flags, after.flags);
    assert!(!engine.needs_repair);
    Ok(())
}

/// Exactly one canonical per aligned chain, and the chain shares its axis
#[test]
fn canonical_uniqueness_and_axis_coherence() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let (h1, h2, _) = aligned_pair(&mut engine, net)?;

    let s1 = engine.lookup_segment(h1).unwrap();
    let s2 = engine.lookup_segment(h2).unwrap();
    // The smaller id won the election
    assert!(s1.is_canonical());
    assert!(!s2.is_canonical());
    assert!(!s1.is_not_aligned());
    assert_eq!(s1.axis, s2.axis);
    Ok(())
}

/// Dogleg on the aligned sibling of a canonical chain: the head keeps the
/// original identity, the middle runs perpandicular on the paired layer,
/// and the tail seeds a fresh chain.
#[test]
fn dogleg_on_canonical_chain() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let (h1, h2, _) = aligned_pair(&mut engine, net)?;

    let mut session = Session::open(&mut engine)?;
    let gcell = session.grid.index_at(Point::new(60, 100)).unwrap();
    let [head, middle, tail] = session.make_dogleg(h2, gcell)?;
    assert_eq!(head, h2);
    assert_eq!(session.doglegs(), &[head, middle, tail]);
    session.close()?;

    let head_seg = engine.lookup_segment(head).unwrap();
    let middle_seg = engine.lookup_segment(middle).unwrap();
    let tail_seg = engine.lookup_segment(tail).unwrap();

    assert!(head_seg.is_horizontal());
    assert!(!middle_seg.is_horizontal());
    assert!(tail_seg.is_horizontal());
    assert_eq!(middle_seg.depth, 1);
    assert_eq!(tail_seg.parent, Some(head));
    assert!(tail_seg.flags.contains(SegFlags::DOGLEG));

    // The surviving horizontal chain still answers to its old canonical
    assert!(engine.lookup_segment(h1).unwrap().is_canonical());
    assert!(!head_seg.is_canonical());
    assert_eq!(engine.lookup_segment(h1).unwrap().axis, head_seg.axis);
    // The tail starts a chain of its own
    assert!(tail_seg.is_canonical());
    Ok(())
}

/// Doglegs on fixed segments, or outside the span, are refused
#[test]
fn dogleg_refusals() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let (h1, _, _) = aligned_pair(&mut engine, net)?;

    let mut session = Session::open(&mut engine)?;
    // Far-away gcell: outside every chain member's span
    let far = session.grid.index_at(Point::new(350, 350)).unwrap();
    assert!(matches!(
        session.make_dogleg(h1, far),
        Err(AutoError::Span { .. })
    ));
    session
        .segment_mut(h1)
        .map(|s| s.flags.set(SegFlags::FIXED))?;
    let near = session.grid.index_at(Point::new(20, 100)).unwrap();
    assert!(matches!(
        session.make_dogleg(h1, near),
        Err(AutoError::FixedSegment { .. })
    ));
    session.close()?;
    Ok(())
}

/// A windowed dogleg cuts one pitch clear of the obstacle interval
#[test]
fn dogleg_around_a_window() -> AutoResult<()> {
    use route21db::Span;
    let (mut engine, net) = unit_engine()?;

    // One long horizontal from x=0 to x=300 at y=100
    let mut session = Session::open(&mut engine)?;
    let a = session.create_contact(net, Point::new(0, 100), 0)?;
    let b = session.create_contact(net, Point::new(300, 100), 0)?;
    let h1 = session.create_segment(net, a, b, 0)?;
    session.close()?;

    let mut session = Session::open(&mut engine)?;
    let window = Span::new(150, 190);
    assert_eq!(session.can_dogleg_over(h1, window)?, Some(true));
    let [head, middle, _tail] = session.make_dogleg_over(h1, window)?;
    session.close()?;

    // The cut sits one pitch left of the window
    assert_eq!(engine.lookup_segment(middle).unwrap().axis, DbUnits(140));
    assert_eq!(
        engine.lookup_segment(head).unwrap().target_position,
        DbUnits(140)
    );
    Ok(())
}

/// Layer change hops two depths and keeps within the allowed range
#[test]
fn move_up_and_down() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let (h1, h2, _) = aligned_pair(&mut engine, net)?;

    let mut session = Session::open(&mut engine)?;
    assert!(session.move_up(h1)?);
    session.close()?;
    // The whole chain moved
    assert_eq!(engine.lookup_segment(h1).unwrap().depth, 2);
    assert_eq!(engine.lookup_segment(h2).unwrap().depth, 2);

    let mut session = Session::open(&mut engine)?;
    // Already at the top pair: no further up
    assert!(!session.move_up(h1)?);
    assert!(session.move_down(h1)?);
    session.close()?;
    assert_eq!(engine.lookup_segment(h1).unwrap().depth, 0);
    assert_eq!(engine.lookup_segment(h2).unwrap().depth, 0);
    Ok(())
}

/// Destroy requests apply after revalidation; isolated contacts go too
#[test]
fn destroy_request_cascades() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;
    let (h1, h2, shared) = aligned_pair(&mut engine, net)?;

    let mut session = Session::open(&mut engine)?;
    session.destroy_request(h2)?;
    session.close()?;

    assert!(engine.lookup_segment(h2).is_none());
    assert!(engine.lookup_segment(h1).is_some());
    // The shared contact still anchors h1; the far endpoint is gone
    assert!(engine.lookup_contact(shared).is_some());

    let mut session = Session::open(&mut engine)?;
    session.destroy_request(h1)?;
    session.close()?;
    assert!(engine.lookup_segment(h1).is_none());
    assert!(engine.lookup_contact(shared).is_none());
    Ok(())
}

/// Observer notifications arrive in order, after phase boundaries
#[test]
fn observer_events() -> AutoResult<()> {
    use crate::observer::{SegmentEvent, SegmentObserver};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<SegmentEvent>>>);
    impl SegmentObserver for Recorder {
        fn notify(&mut self, _segment: EntityId, event: SegmentEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    let (mut engine, net) = unit_engine()?;
    let log = Arc::new(Mutex::new(Vec::new()));
    engine.observers.register(Box::new(Recorder(log.clone())));

    aligned_pair(&mut engine, net)?;
    let events = log.lock().unwrap();
    assert!(events.contains(&SegmentEvent::Create));
    // Fresh segments report through the pitch-refreshing variant
    assert!(events.contains(&SegmentEvent::RevalidatePPitch));
    Ok(())
}

/// Reduce collapses a short two-via stack; stretching it forces a raise
#[test]
fn reduce_and_raise() -> AutoResult<()> {
    let (mut engine, net) = unit_engine()?;

    // A short vertical hop between two horizontals at depths 0 and 0,
    // with the vertical on depth 1: both its endpoints are turns.
    let mut session = Session::open(&mut engine)?;
    let a = session.create_contact(net, Point::new(0, 100), 0)?;
    let b = session.create_contact(net, Point::new(50, 100), 0)?;
    let c = session.create_contact(net, Point::new(50, 110), 1)?;
    let d = session.create_contact(net, Point::new(100, 110), 0)?;
    let h1 = session.create_segment(net, a, b, 0)?;
    let v1 = session.create_segment(net, b, c, 1)?;
    let h2 = session.create_segment(net, c, d, 0)?;
    session.close()?;

    // Force the spin by hand: both vias below the vertical's layer
    {
        let mut session = Session::open(&mut engine)?;
        session
            .segment_mut(v1)
            .map(|s| s.flags.set(SegFlags::SPIN_BOTTOM))?;
        assert!(session.can_reduce(v1)?);
        assert!(session.reduce(v1)?);
        assert!(!session.can_reduce(v1)?); // Not twice
        assert_eq!(session.lookup_segment(h1).unwrap().reduceds, 1);
        assert_eq!(session.lookup_segment(h2).unwrap().reduceds, 1);

        // Stretch the collapsed stack: it now must raise
        session
            .segment_mut(v1)
            .map(|s| s.target_position = DbUnits(200))?;
        assert!(session.must_raise(v1)?);
        assert!(session.raise(v1)?);
        assert_eq!(session.lookup_segment(h1).unwrap().reduceds, 0);
        session.close()?;
    }
    Ok(())
}

/// Ripups honor their per-category allowance and the event ceiling
#[test]
fn ripup_limits_and_event_ceiling() -> AutoResult<()> {
    use crate::ripup::{RipupKind, RipupTracker};
    let (mut engine, net) = unit_engine()?;
    let (h1, h2, _) = aligned_pair(&mut engine, net)?;

    assert_eq!(RipupTracker::classify(&engine, h1)?, RipupKind::Local);
    let allowance = engine.config.ripup_limits.local;

    let mut tracker = RipupTracker::new();
    let mut session = Session::open(&mut engine)?;
    for _ in 0..allowance {
        assert!(tracker.ripup(&mut session, h1)?);
    }
    // Out of allowance: declared failed, not an error
    assert!(!tracker.ripup(&mut session, h1)?);
    assert_eq!(tracker.failed(), &[h1]);
    session.close()?;

    // The event ceiling, in contrast, is fatal
    engine.config.events_limit = tracker.events();
    let mut session = Session::open(&mut engine)?;
    assert!(matches!(
        tracker.ripup(&mut session, h2),
        Err(AutoError::Overflow { .. })
    ));
    session.close()?;

    // Scheduling is the stable depth/source-u/length order
    let mut batch = vec![h2, h1];
    RipupTracker::schedule(&engine, &mut batch);
    assert_eq!(batch, vec![h1, h2]);
    Ok(())
}

/// Terminal strength ranks segments by distance to a terminal contact
#[test]
fn terminal_classification() -> AutoResult<()> {
    use crate::contact::ContactFlags;
    let (mut engine, net) = unit_engine()?;

    let mut session = Session::open(&mut engine)?;
    let pad = session.create_contact(net, Point::new(0, 100), 0)?;
    session
        .contact_mut(pad)
        .map(|c| c.flags.set(ContactFlags::TERMINAL))?;
    let c1 = session.create_contact(net, Point::new(50, 100), 0)?;
    let c2 = session.create_contact(net, Point::new(50, 200), 0)?;
    let c3 = session.create_contact(net, Point::new(100, 200), 0)?;
    let s1 = session.create_segment(net, pad, c1, 0)?; // Touches the pad
    let s2 = session.create_segment(net, c1, c2, 1)?; // One step out
    let s3 = session.create_segment(net, c2, c3, 0)?; // Two steps out
    session.close()?;

    assert!(engine.lookup_segment(s1).unwrap().is_strong_terminal());
    assert!(engine
        .lookup_segment(s2)
        .unwrap()
        .flags
        .contains(SegFlags::WEAK_TERMINAL_1));
    assert!(engine
        .lookup_segment(s3)
        .unwrap()
        .flags
        .contains(SegFlags::WEAK_TERMINAL_2));
    Ok(())
}
