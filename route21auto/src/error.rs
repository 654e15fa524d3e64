//!
//! # Routing-Database Result and Error Types
//!

// Local Imports
use route21db::{DbError, EntityId};

/// # [AutoError] Result Type
pub type AutoResult<T> = Result<T, AutoError>;

///
/// # Routing Error Enumeration
///
/// Session misuse (`NoSession`, `SessionReopen`) bubbles to the caller.
/// Input defects (`BadAnchor`, `MisAligned`) are recoverable: log, skip the
/// entity, continue. Invariant breaches (`CanonicalBug`, `Overflow`) are
/// fatal to the session and leave the engine flagged needs-repair.
///
pub enum AutoError {
    /// Segment construction saw a missing endpoint, a non-contact
    /// endpoint, or source == target
    BadAnchor { message: String },
    /// Two fixed contacts force a straight segment with mis-aligned axes
    MisAligned {
        segment: EntityId,
        source_axis: route21db::DbUnits,
        target_axis: route21db::DbUnits,
    },
    /// Mutation attempted on a fixed segment
    FixedSegment { segment: EntityId },
    /// Dogleg requested outside the segment's gcell span
    Span { segment: EntityId },
    /// Operation requires an open session
    NoSession { context: String },
    /// `open()` with a different owner while a session is live
    SessionReopen,
    /// Aligned segments found in different layers during canonicalisation
    LayerMismatch { segment: EntityId },
    /// Zero or several canonicals in one aligned chain
    CanonicalBug { message: String },
    /// A saturated counter or an over-reserved edge capacity
    Overflow { message: String },
    /// Forwarded database error
    Db(DbError),
    /// Uncategorized Error, with String Message
    Str(String),
}
impl AutoError {
    /// Create an [AutoError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
    /// Create an error-variant [Result] from anything String-convertible
    pub fn fail<T>(s: impl Into<String>) -> Result<T, Self> {
        Err(Self::msg(s))
    }
    /// Whether this error is fatal to the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CanonicalBug { .. } | Self::Overflow { .. })
    }
}
impl std::fmt::Debug for AutoError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AutoError::BadAnchor { message } => write!(f, "Bad Anchor: {}", message),
            AutoError::MisAligned {
                segment,
                source_axis,
                target_axis,
            } => write!(
                f,
                "Mis-Aligned Segment {:?}: source axis {:?} vs target axis {:?}",
                segment, source_axis, target_axis
            ),
            AutoError::FixedSegment { segment } => {
                write!(f, "Mutation on Fixed Segment {:?}", segment)
            }
            AutoError::Span { segment } => {
                write!(f, "Dogleg outside the span of Segment {:?}", segment)
            }
            AutoError::NoSession { context } => {
                write!(f, "No Session open (in {})", context)
            }
            AutoError::SessionReopen => {
                write!(f, "Session already open for another owner")
            }
            AutoError::LayerMismatch { segment } => {
                write!(f, "Aligned segments in different layers around {:?}", segment)
            }
            AutoError::CanonicalBug { message } => write!(f, "Canonical Bug: {}", message),
            AutoError::Overflow { message } => write!(f, "Overflow: {}", message),
            AutoError::Db(err) => err.fmt(f),
            AutoError::Str(err) => err.fmt(f),
        }
    }
}
impl std::fmt::Display for AutoError {
    /// Display an [AutoError]. Delegates to the [Debug] implementation.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for AutoError {}
impl From<DbError> for AutoError {
    fn from(e: DbError) -> Self {
        Self::Db(e)
    }
}
impl From<String> for AutoError {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}
impl From<&str> for AutoError {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}
