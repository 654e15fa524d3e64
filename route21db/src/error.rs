//!
//! # Database Result and Error Types
//!

/// # [DbError] Result Type
pub type DbResult<T> = Result<T, DbError>;

///
/// # Database Error Enumeration
///
pub enum DbError {
    /// Exhaustion of a monotone resource, generally the entity-id counter.
    /// Non-recoverable; the database is no longer able to mint identities.
    Overflow { message: String },
    /// Boxed External Errors
    Boxed(Box<dyn std::error::Error + Send + Sync>),
    /// Uncategorized Error, with String Message
    Str(String),
    /// # [Ptr] Locking
    /// Caused by trouble with a [Ptr]: either deadlock, or panic while holding a lock.
    /// Generally caused by a [std::sync::PoisonError], which is not forwardable due to lifetime constraints.
    PtrLock,
}
impl DbError {
    /// Create a [DbError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
    /// Create an error-variant [Result] from anything String-convertible
    pub fn fail<T>(s: impl Into<String>) -> Result<T, Self> {
        Err(Self::msg(s))
    }
}
impl std::fmt::Debug for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DbError::Overflow { message } => write!(f, "Overflow Error: {}", message),
            DbError::Boxed(err) => err.fmt(f),
            DbError::Str(err) => err.fmt(f),
            DbError::PtrLock => write!(f, "[std::sync::PoisonError]"),
        }
    }
}
impl std::fmt::Display for DbError {
    /// Display a [DbError]. Delegates to the [Debug] implementation.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Boxed(e) => Some(&**e),
            _ => None,
        }
    }
}
impl From<String> for DbError {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}
impl From<&str> for DbError {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}
impl From<std::num::TryFromIntError> for DbError {
    fn from(e: std::num::TryFromIntError) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(_e: std::sync::PoisonError<T>) -> Self {
        Self::PtrLock
    }
}
