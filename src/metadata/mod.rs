//! Declarative per-type registration surface.
//!
//! Every entity kind registers its backing record source, zero or more
//! lazy-load descriptors, and an optional change-history descriptor, once at
//! startup. The built [`MetadataRegistry`] is immutable and shared by handle;
//! there is no process-global mutable table. Missing required configuration
//! surfaces as a fatal [`CoreError::Configuration`] at first use.

use std::collections::HashMap;
use std::rc::Rc;

use crate::domain::{Entity, EntityHandle, EntityKind, FieldValue, ValidationError};
use crate::error::CoreError;
use crate::mapper::TimestampEncoding;
use crate::repository::Repository;

/// Resolves a lazy property: invoked with the backing repository and the
/// owning entity as context. `use_cache = false` must bypass the registry for
/// this one call.
pub type LoaderFn =
    fn(&Repository, &EntityHandle, bool) -> Result<FieldValue, CoreError>;

/// Entity-level validation hook run before any write is attempted.
pub type ValidatorFn = fn(&Entity) -> Result<(), ValidationError>;

/// Where an entity kind's rows live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSource {
    pub name: String,
    pub id_column: String,
}

impl RecordSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_column: "id".into(),
        }
    }
}

/// Whether lookups for this kind execute in single-row or multi-row mode by
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowMode {
    #[default]
    Single,
    Multi,
}

/// Deferred-resolution metadata for one property.
#[derive(Debug, Clone)]
pub struct LazyLoadDescriptor {
    pub property: &'static str,
    /// Entity kind whose repository the loader dispatches through.
    pub repository: EntityKind,
    pub loader: LoaderFn,
    /// Default cache policy: cache the resolved value on the owner.
    pub cache_by_default: bool,
}

/// Created/modified column bookkeeping for one kind.
#[derive(Debug, Clone)]
pub struct ChangeHistoryDescriptor {
    pub created_column: String,
    pub modified_column: String,
    pub encoding: TimestampEncoding,
}

impl ChangeHistoryDescriptor {
    pub fn new(
        created_column: impl Into<String>,
        modified_column: impl Into<String>,
        encoding: TimestampEncoding,
    ) -> Self {
        Self {
            created_column: created_column.into(),
            modified_column: modified_column.into(),
            encoding,
        }
    }
}

/// Everything one entity kind declares at startup.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    kind: EntityKind,
    source: Option<RecordSource>,
    row_mode: RowMode,
    required_fields: Vec<&'static str>,
    validator: Option<ValidatorFn>,
    lazy: Vec<LazyLoadDescriptor>,
    history: Option<ChangeHistoryDescriptor>,
    translated_fields: Vec<&'static str>,
}

impl EntityMetadata {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            source: None,
            row_mode: RowMode::default(),
            required_fields: Vec::new(),
            validator: None,
            lazy: Vec::new(),
            history: None,
            translated_fields: Vec::new(),
        }
    }

    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.source = Some(RecordSource::new(name));
        self
    }

    pub fn row_mode(mut self, mode: RowMode) -> Self {
        self.row_mode = mode;
        self
    }

    pub fn require(mut self, field: &'static str) -> Self {
        self.required_fields.push(field);
        self
    }

    pub fn validator(mut self, validator: ValidatorFn) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn lazy(mut self, descriptor: LazyLoadDescriptor) -> Self {
        self.lazy.push(descriptor);
        self
    }

    pub fn history(mut self, descriptor: ChangeHistoryDescriptor) -> Self {
        self.history = Some(descriptor);
        self
    }

    pub fn translated(mut self, field: &'static str) -> Self {
        self.translated_fields.push(field);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn backing_source(&self) -> Option<&RecordSource> {
        self.source.as_ref()
    }

    /// The backing source, or the fatal configuration error an operation that
    /// needs one raises at first use.
    pub fn require_source(&self) -> Result<&RecordSource, CoreError> {
        self.source.as_ref().ok_or_else(|| {
            CoreError::configuration(format!(
                "entity kind `{}` has no backing record source",
                self.kind
            ))
        })
    }

    pub fn default_row_mode(&self) -> RowMode {
        self.row_mode
    }

    pub fn required_fields(&self) -> &[&'static str] {
        &self.required_fields
    }

    pub fn custom_validator(&self) -> Option<ValidatorFn> {
        self.validator
    }

    pub fn lazy_descriptor(&self, property: &str) -> Option<&LazyLoadDescriptor> {
        self.lazy.iter().find(|d| d.property == property)
    }

    pub fn change_history(&self) -> Option<&ChangeHistoryDescriptor> {
        self.history.as_ref()
    }

    pub fn translated_fields(&self) -> &[&'static str] {
        &self.translated_fields
    }
}

/// Immutable lookup table of every registered kind.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    types: HashMap<EntityKind, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn builder() -> MetadataRegistryBuilder {
        MetadataRegistryBuilder {
            types: HashMap::new(),
        }
    }

    pub fn for_kind(&self, kind: EntityKind) -> Result<&EntityMetadata, CoreError> {
        self.types.get(kind).ok_or_else(|| {
            CoreError::configuration(format!("no metadata registered for entity kind `{kind}`"))
        })
    }

    pub fn is_registered(&self, kind: EntityKind) -> bool {
        self.types.contains_key(kind)
    }
}

pub struct MetadataRegistryBuilder {
    types: HashMap<EntityKind, EntityMetadata>,
}

impl MetadataRegistryBuilder {
    pub fn register(mut self, metadata: EntityMetadata) -> Self {
        self.types.insert(metadata.kind(), metadata);
        self
    }

    pub fn build(self) -> Rc<MetadataRegistry> {
        Rc::new(MetadataRegistry { types: self.types })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_kind_is_a_configuration_error() {
        let registry = MetadataRegistry::builder()
            .register(EntityMetadata::new("page").source("pages"))
            .build();

        assert!(registry.is_registered("page"));
        let err = registry.for_kind("ghost").unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
    }

    #[test]
    fn missing_source_is_fatal_at_first_use() {
        let registry = MetadataRegistry::builder()
            .register(EntityMetadata::new("keyword"))
            .build();

        let meta = registry.for_kind("keyword").unwrap();
        let err = meta.require_source().unwrap_err();
        assert!(err.to_string().contains("keyword"));
    }
}
