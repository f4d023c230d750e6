//! Bidirectional translation between entities and backing records.
//!
//! Mapping is diff-aware on the write path: only fields explicitly set on the
//! entity reach the record, so an unset field is never blanked. Change-history
//! columns are decoded/encoded transparently per the kind's declared encoding.

mod history;

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::domain::{Entity, EntityHandle, FieldValue, LifecycleState, ValidationError};
use crate::error::CoreError;
use crate::metadata::EntityMetadata;

pub use history::{TimestampEncoding, TimestampError};

/// Canonical domain field carrying the decoded creation instant.
pub const CREATED_FIELD: &str = "created_at";
/// Canonical domain field carrying the decoded modification instant.
pub const MODIFIED_FIELD: &str = "modified_at";

/// Raw field bag in storage shape. Owned transiently by the repository during
/// one mapping operation and discarded after.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackingRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl BackingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { fields }
    }

    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Maps one entity kind to and from its backing records.
pub struct Mapper<'a> {
    metadata: &'a EntityMetadata,
}

impl<'a> Mapper<'a> {
    pub fn new(metadata: &'a EntityMetadata) -> Self {
        Self { metadata }
    }

    fn id_column(&self) -> &str {
        self.metadata
            .backing_source()
            .map_or("id", |s| s.id_column.as_str())
    }

    /// Populate a fresh entity from a record.
    ///
    /// Scalar columns copy 1:1. Change-history columns decode per the declared
    /// encoding into [`CREATED_FIELD`]/[`MODIFIED_FIELD`], and only when the
    /// source column is present and non-empty. A malformed timestamp read from
    /// storage is a configuration defect (schema/encoding mismatch).
    pub fn map_to_entity(&self, record: &BackingRecord) -> Result<EntityHandle, CoreError> {
        let mut entity = Entity::new(self.metadata.kind());
        let history = self.metadata.change_history();

        for (column, value) in record.fields() {
            if column == self.id_column() {
                if let FieldValue::Int(id) = value {
                    entity.set_id(*id);
                }
                continue;
            }
            if let Some(h) = history {
                let target = if *column == h.created_column {
                    Some(CREATED_FIELD)
                } else if *column == h.modified_column {
                    Some(MODIFIED_FIELD)
                } else {
                    None
                };
                if let Some(field) = target {
                    if !value.is_empty() {
                        let ts = h.encoding.decode(value).map_err(|err| {
                            CoreError::configuration(format!(
                                "kind `{}`, column `{column}`: {err}",
                                self.metadata.kind()
                            ))
                        })?;
                        entity.set_field_raw(field, FieldValue::Timestamp(ts));
                    }
                    continue;
                }
            }
            entity.set_field_raw(column.clone(), value.clone());
        }

        let state = if entity.id().is_some() {
            LifecycleState::Persisted
        } else {
            LifecycleState::Transient
        };
        entity.mark_state(state);
        Ok(entity.handle())
    }

    /// Produce the write-back record for an entity.
    ///
    /// Only explicitly set scalar fields are written; child edges and the
    /// canonical timestamp fields never serialize directly. A new entity gets
    /// its created column stamped; an existing one gets its modified column.
    /// Never both on the same save, since creation and modification are
    /// logically simultaneous the first time.
    ///
    /// `exclude` drops additional fields from the main row (the translation
    /// routing path uses this).
    pub fn map_to_record(
        &self,
        entity: &Entity,
        now: OffsetDateTime,
        exclude: &[&str],
    ) -> Result<BackingRecord, CoreError> {
        let mut record = BackingRecord::new();

        for (name, value) in entity.fields() {
            if value.is_child_edge() {
                continue;
            }
            if name == CREATED_FIELD || name == MODIFIED_FIELD {
                continue;
            }
            if exclude.contains(&name.as_str()) {
                continue;
            }
            record.set(name.clone(), value.clone());
        }

        if let Some(h) = self.metadata.change_history() {
            if entity.id().is_none() {
                let created = self.caller_timestamp(entity, CREATED_FIELD)?.unwrap_or(now);
                let encoded = h.encoding.encode(created).map_err(|err| {
                    CoreError::configuration(format!(
                        "kind `{}`, column `{}`: {err}",
                        self.metadata.kind(),
                        h.created_column
                    ))
                })?;
                record.set(h.created_column.clone(), encoded);
            } else {
                let modified = self.caller_timestamp(entity, MODIFIED_FIELD)?.unwrap_or(now);
                let encoded = h.encoding.encode(modified).map_err(|err| {
                    CoreError::configuration(format!(
                        "kind `{}`, column `{}`: {err}",
                        self.metadata.kind(),
                        h.modified_column
                    ))
                })?;
                record.set(h.modified_column.clone(), encoded);
            }
        }

        Ok(record)
    }

    /// A caller-supplied timestamp field in the wrong shape is a validation
    /// failure, not a configuration defect.
    fn caller_timestamp(
        &self,
        entity: &Entity,
        field: &str,
    ) -> Result<Option<OffsetDateTime>, CoreError> {
        match entity.field(field) {
            None => Ok(None),
            Some(FieldValue::Timestamp(ts)) => Ok(Some(*ts)),
            Some(other) => Err(ValidationError::single(
                field,
                format!("expected a timestamp value, got {other:?}"),
            )
            .into()),
        }
    }
}
