//! External collaborator seams.
//!
//! Rights, translation, and memory-governor concerns live outside this core.
//! Only their interface boundary is defined here, with permissive defaults.
//! Concrete implementations are passed into repository construction; behavior
//! is never toggled through global state.

use std::collections::BTreeMap;

use crate::domain::{EntityId, EntityKind, FieldValue};
use crate::query::QueryDescriptor;
use crate::storage::StorageError;

/// Authorization-aware query shaping.
pub trait Rights {
    /// Inject read predicates into a lookup before execution.
    fn apply_read_rights(&self, query: QueryDescriptor) -> QueryDescriptor {
        query
    }

    /// Whether an update may proceed, given the query that would locate the
    /// row. Denial is not an error: the update returns the entity unchanged.
    fn apply_update_rights(&self, _query: &QueryDescriptor) -> bool {
        true
    }
}

/// Permit everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Rights for AllowAll {}

/// Localized-content collaborator.
pub trait Translation {
    /// Whether this kind carries properties that need translation.
    fn has_properties_to_translate(&self, _kind: EntityKind) -> bool {
        false
    }

    /// Whether the current locale is the site default.
    fn is_current_locale_default(&self) -> bool {
        true
    }

    /// Persist localized values for one entity, outside the main row mapper.
    fn upsert_translation(
        &self,
        _kind: EntityKind,
        _id: EntityId,
        _fields: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError> {
        Ok(())
    }
}

/// No localized content anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTranslation;

impl Translation for NoTranslation {}

/// Host memory-pressure signal. Consulted after every load; when high, the
/// registry scope and store-level caches are flushed to bound growth during
/// long batch operations.
pub trait MemoryGovernor {
    fn is_memory_usage_high(&self) -> bool {
        false
    }
}

/// Memory pressure never reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverHigh;

impl MemoryGovernor for NeverHigh {}
