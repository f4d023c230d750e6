//! Backing-store adapter boundary.
//!
//! The concrete transport (SQL, remote API) lives behind [`StorageAdapter`].
//! Retries, timeouts, and transactional guarantees belong to the adapter; the
//! core either completes a call or propagates a [`StorageError`] unchanged.

mod memory;

use thiserror::Error;

use crate::domain::EntityId;
use crate::mapper::BackingRecord;
use crate::metadata::RecordSource;
use crate::query::QueryDescriptor;

pub use memory::MemoryStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("backing store timeout")]
    Timeout,
}

impl StorageError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Synchronous adapter over one backing store.
pub trait StorageAdapter {
    /// Single-row execution mode: at most one record.
    fn fetch_one(
        &self,
        source: &RecordSource,
        query: &QueryDescriptor,
    ) -> Result<Option<BackingRecord>, StorageError>;

    /// Multi-row execution mode.
    fn fetch_many(
        &self,
        source: &RecordSource,
        query: &QueryDescriptor,
    ) -> Result<Vec<BackingRecord>, StorageError>;

    /// Insert or update one row. Returns the (possibly generated) identifier.
    fn upsert(
        &self,
        source: &RecordSource,
        id: Option<EntityId>,
        record: &BackingRecord,
    ) -> Result<EntityId, StorageError>;

    /// Remove one row. `Ok(false)` when no such row existed.
    fn delete(&self, source: &RecordSource, id: EntityId) -> Result<bool, StorageError>;

    /// Drop any store-level caches. Invoked alongside a registry clear when
    /// the memory governor reports pressure.
    fn invalidate_caches(&self) {}
}
