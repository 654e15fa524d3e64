//!
//! # Extraction Result and Error Types
//!

// Local Imports
use route21db::DbError;

/// # [ExtractError] Result Type
pub type ExtractResult<T> = Result<T, ExtractError>;

///
/// # Extraction Error Enumeration
///
pub enum ExtractError {
    /// A shape the tiler refuses: non-Manhattan edges, or an outline
    /// touching itself at a corner. Recoverable; the shape is skipped.
    Rectilinear { message: String },
    /// Invariant breach inside the sweep or the union-find.
    /// Fatal to the extraction at hand.
    Bug { message: String },
    /// The cooperative interrupt flag was raised
    Interrupted,
    /// Forwarded database error
    Db(DbError),
    /// Uncategorized Error, with String Message
    Str(String),
}
impl ExtractError {
    /// Create an [ExtractError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
    /// Create an error-variant [Result] from anything String-convertible
    pub fn fail<T>(s: impl Into<String>) -> Result<T, Self> {
        Err(Self::msg(s))
    }
    /// Create a fatal [ExtractError::Bug]
    pub fn bug(s: impl Into<String>) -> Self {
        Self::Bug { message: s.into() }
    }
}
impl std::fmt::Debug for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExtractError::Rectilinear { message } => {
                write!(f, "Rectilinear Error: {}", message)
            }
            ExtractError::Bug { message } => write!(f, "Extraction Bug: {}", message),
            ExtractError::Interrupted => write!(f, "Extraction Interrupted"),
            ExtractError::Db(err) => err.fmt(f),
            ExtractError::Str(err) => err.fmt(f),
        }
    }
}
impl std::fmt::Display for ExtractError {
    /// Display an [ExtractError]. Delegates to the [Debug] implementation.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for ExtractError {}
impl From<DbError> for ExtractError {
    fn from(e: DbError) -> Self {
        Self::Db(e)
    }
}
impl From<String> for ExtractError {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}
impl From<&str> for ExtractError {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}
