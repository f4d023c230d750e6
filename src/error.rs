//! Error taxonomy for the persistence core.
//!
//! Validation failures are recoverable and carry field-level detail;
//! configuration failures are programming defects raised at first use of
//! missing or invalid static metadata; storage failures propagate unchanged.
//! Authorization denial is deliberately not here: a denied update returns the
//! caller's entity unmodified.

use thiserror::Error;

use crate::domain::ValidationError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Recoverable; zero writes occurred.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Fatal defect in static metadata; never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },
    /// Backing-store failure, propagated without local suppression.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
