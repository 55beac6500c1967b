//! Presence error types.

use stagelock_types::{IdentifierError, PresenceConfigError};
use thiserror::Error;

/// Result type for presence operations.
pub type PresenceResult<T> = Result<T, PresenceError>;

/// Errors surfaced by the presence coordinator.
///
/// Lock denial and stale revisions are not errors; they come back as
/// [`Conflict`](crate::Conflict) data inside normal results.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// A required identifier was empty or malformed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    /// The coordinator configuration was rejected.
    #[error("invalid presence configuration: {0}")]
    InvalidConfig(#[from] PresenceConfigError),

    /// A thread panicked while holding the shared coordinator.
    #[error("presence coordinator lock poisoned")]
    LockPoisoned,
}
