//!
//! # Segment Observers
//!
//! Observers never see partial state: notifications append to an event
//! queue during mutation and revalidation, and the queue is drained between
//! phases, after the engine's containers settle. Observers must not open
//! sessions of their own.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use route21db::EntityId;

/// The segment lifecycle events observers subscribe to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SegmentEvent {
    Create,
    Destroy,
    Invalidate,
    Revalidate,
    /// Revalidated, and the perpandicular pitch may have changed
    RevalidatePPitch,
}

/// Observer callback interface
pub trait SegmentObserver {
    fn notify(&mut self, segment: EntityId, event: SegmentEvent);
}

/// # Observer Queue
///
/// Append-only during a phase; drained to the registered observers at the
/// phase boundary.
#[derive(Default)]
pub struct ObserverQueue {
    pending: Vec<(EntityId, SegmentEvent)>,
    observers: Vec<Box<dyn SegmentObserver>>,
}
impl ObserverQueue {
    pub fn new() -> Self {
        Self::default()
    }
    /// Register an observer for all segment events
    pub fn register(&mut self, observer: Box<dyn SegmentObserver>) {
        self.observers.push(observer);
    }
    /// Queue one notification
    pub fn notify(&mut self, segment: EntityId, event: SegmentEvent) {
        self.pending.push((segment, event));
    }
    /// Deliver every queued notification, in queueing order
    pub fn drain(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (segment, event) in pending {
            for observer in self.observers.iter_mut() {
                observer.notify(segment, event);
            }
        }
    }
}
impl std::fmt::Debug for ObserverQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "<ObserverQueue pending:{} observers:{}>",
            self.pending.len(),
            self.observers.len()
        )
    }
}
