//!
//! # Route21 Incremental Routing Database
//!
//! A transactional layer over automated wire segments and contacts on a
//! gcell grid: aligned segments canonicalise into equivalence classes,
//! geometry revalidates in one coherent pass per session, and the
//! detailed-routing operations (dogleg, layer change, slacken, reduce)
//! queue their effects through the session rather than mutating in place.
//!

// Modules
pub mod config;
pub mod contact;
pub mod engine;
pub mod error;
pub mod gauge;
pub mod gcell;
pub mod observer;
pub mod ops;
pub mod ripup;
pub mod segment;
pub mod session;

// Re-exports
pub use config::{Configuration, ConfigurationBuilder, RipupLimits};
pub use contact::{AutoContact, ContactFlags, ContactTopology};
pub use engine::{AutoEngine, GlobalRouterOracle};
pub use error::{AutoError, AutoResult};
pub use gauge::{PitchKind, RoutingGauge, RoutingLayerGauge};
pub use gcell::{GCell, GCellGrid};
pub use observer::{ObserverQueue, SegmentEvent, SegmentObserver};
pub use ripup::{RipupKind, RipupTracker};
pub use segment::{compare_by_depth_axis, compare_by_depth_length, AutoSegment, SegFlags};
pub use session::{Session, SessionGuard, SessionState};

pub use route21db as db;
pub use route21utils as utils;

/// Unit Tests Module
#[cfg(test)]
mod tests;
