//! Check-in error types
//!
//! Denied / duplicate are outcomes ([`shared::CheckInStatus`]), not errors.
//! Only [`CheckInError::is_transient`] errors may send a check-in to the
//! offline queue.

use super::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckInError {
    /// Unknown member id; surfaced as-is, never retried
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// Timeout or unreachable store
    #[error("Check-in service unavailable: {0}")]
    Unavailable(String),

    /// Optimistic retries exhausted against concurrent writers
    #[error("Member {0} is being updated concurrently, retry")]
    Contended(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CheckInError {
    /// Whether the live path may be retried or handed to the offline queue
    pub fn is_transient(&self) -> bool {
        match self {
            CheckInError::Unavailable(_) => true,
            CheckInError::Storage(e) => {
                e.is_transient() && !matches!(e, StorageError::VersionConflict { .. })
            }
            CheckInError::MemberNotFound(_) | CheckInError::Contended(_) => false,
        }
    }
}

pub type CheckInResult<T> = Result<T, CheckInError>;

/// Durable pending-queue failures
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Durable queue write failed: {0}")]
    DurableWrite(#[from] StorageError),

    #[error("Durable queue unreachable: {0}")]
    Unreachable(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
