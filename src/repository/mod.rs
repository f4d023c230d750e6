//! Generic repository over one entity kind.
//!
//! Composes fingerprinting, the identity map, the mapper, and the pluggable
//! rights/translation hooks. `find` guarantees at most one backing-store load
//! per fingerprint within the scope unless the caller bypasses the cache;
//! `update` runs the merge-safe cascade in `cascade.rs`.

mod cascade;
mod config;

use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::domain::{EntityHandle, EntityId, EntityKind};
use crate::error::CoreError;
use crate::mapper::{BackingRecord, Mapper};
use crate::metadata::{EntityMetadata, RowMode};
use crate::query::{Fingerprint, Join, QueryDescriptor};
use crate::registry::CachedValue;
use crate::unit_of_work::UnitOfWork;

pub use config::{CoreConfig, RepositoryConfig, RepositoryConfigBuilder};

/// Per-call options for `find_with`.
#[derive(Debug)]
pub struct FindOptions {
    /// Consult the identity map before querying. True by default.
    pub use_cache: bool,
    /// A record already fetched elsewhere; bypasses query execution but still
    /// flows through mapping and the registry.
    pub preloaded: Option<BackingRecord>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            preloaded: None,
        }
    }
}

impl FindOptions {
    pub fn bypass_cache() -> Self {
        Self {
            use_cache: false,
            preloaded: None,
        }
    }

    pub fn preloaded(record: BackingRecord) -> Self {
        Self {
            use_cache: true,
            preloaded: Some(record),
        }
    }
}

pub struct Repository {
    kind: EntityKind,
    scope: Weak<UnitOfWork>,
}

impl Repository {
    pub(crate) fn new(kind: EntityKind, scope: Weak<UnitOfWork>) -> Self {
        Self { kind, scope }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub(crate) fn scope(&self) -> Result<Rc<UnitOfWork>, CoreError> {
        self.scope.upgrade().ok_or_else(|| {
            CoreError::configuration(format!(
                "unit of work for `{}` repository was dropped",
                self.kind
            ))
        })
    }

    /// Single-row lookup with default options.
    pub fn find(&self, query: QueryDescriptor) -> Result<Option<EntityHandle>, CoreError> {
        self.find_with(query, FindOptions::default())
    }

    /// Canonical lookup by identifier.
    pub fn find_by_id(&self, id: EntityId) -> Result<Option<EntityHandle>, CoreError> {
        self.find_with(QueryDescriptor::by_id(self.kind, id), FindOptions::default())
    }

    /// Single-row lookup.
    ///
    /// The query is shaped by the rights and translation collaborators before
    /// fingerprinting, so authorization scope is part of the cache key.
    pub fn find_with(
        &self,
        query: QueryDescriptor,
        opts: FindOptions,
    ) -> Result<Option<EntityHandle>, CoreError> {
        let scope = self.scope()?;
        let meta = scope.metadata().for_kind(self.kind)?;
        let source = meta.require_source()?.clone();
        let shaped = self.shape_query(&scope, meta, query)?;
        let fingerprint = shaped.fingerprint();

        let multi = meta.default_row_mode() == RowMode::Multi;
        if opts.use_cache && scope.config().enable_registry && opts.preloaded.is_none() {
            if let Some(entry) = scope.registry().get(self.kind, &fingerprint) {
                match entry.value {
                    CachedValue::One(handle) => return Ok(Some(handle)),
                    CachedValue::Absent => return Ok(None),
                    // A snapshot cached under the identical shaped fingerprint
                    // is authoritative: single-row execution of the same query
                    // is its first row.
                    CachedValue::Many(handles) => return Ok(handles.first().cloned()),
                }
            }
        }

        // Execution mode comes from the kind's registration: a multi-row kind
        // caches the full snapshot even when the caller wants one row.
        let (found, value) = match opts.preloaded {
            Some(record) => {
                let handle = Mapper::new(meta).map_to_entity(&record)?;
                (Some(handle.clone()), CachedValue::One(handle))
            }
            None if multi => {
                let mapper = Mapper::new(meta);
                let records = scope.storage().fetch_many(&source, &shaped)?;
                let mut entities = Vec::with_capacity(records.len());
                for record in &records {
                    entities.push(mapper.map_to_entity(record)?);
                }
                (entities.first().cloned(), CachedValue::Many(entities))
            }
            None => match scope.storage().fetch_one(&source, &shaped)? {
                Some(record) => {
                    let handle = Mapper::new(meta).map_to_entity(&record)?;
                    (Some(handle.clone()), CachedValue::One(handle))
                }
                None => (None, CachedValue::Absent),
            },
        };

        if scope.config().enable_registry {
            scope.registry().add(self.kind, fingerprint, value, false);
        }
        self.after_load(&scope);
        Ok(found)
    }

    /// Multi-row lookup with registry caching of the snapshot.
    pub fn find_all(&self, query: QueryDescriptor) -> Result<Vec<EntityHandle>, CoreError> {
        self.find_all_with(query, true)
    }

    pub fn find_all_with(
        &self,
        query: QueryDescriptor,
        use_cache: bool,
    ) -> Result<Vec<EntityHandle>, CoreError> {
        let scope = self.scope()?;
        let meta = scope.metadata().for_kind(self.kind)?;
        let source = meta.require_source()?.clone();
        let shaped = self.shape_query(&scope, meta, query)?;
        let fingerprint = shaped.fingerprint();

        if use_cache && scope.config().enable_registry {
            if let Some(entry) = scope.registry().get(self.kind, &fingerprint) {
                if let CachedValue::Many(handles) = entry.value {
                    return Ok(handles);
                }
                // A cached single row cannot stand in for the full result
                // set; the re-query below supersedes it with the snapshot.
            }
        }

        let mapper = Mapper::new(meta);
        let records = scope.storage().fetch_many(&source, &shaped)?;
        let mut entities = Vec::with_capacity(records.len());
        for record in &records {
            entities.push(mapper.map_to_entity(record)?);
        }

        if scope.config().enable_registry {
            scope.registry().add(
                self.kind,
                fingerprint,
                CachedValue::Many(entities.clone()),
                false,
            );
        }
        self.after_load(&scope);
        Ok(entities)
    }

    /// Update the entity and its nested children up to the configured depth.
    ///
    /// Returns the caller's handle. When the rights collaborator denies the
    /// update this is not an error: the entity comes back unmodified.
    pub fn update(&self, entity: &EntityHandle) -> Result<EntityHandle, CoreError> {
        let depth = self.scope()?.config().default_cascade_depth;
        cascade::run(self, entity, depth)
    }

    /// Update with an explicit cascade depth.
    pub fn update_depth(
        &self,
        entity: &EntityHandle,
        depth: u32,
    ) -> Result<EntityHandle, CoreError> {
        cascade::run(self, entity, depth)
    }

    /// Remove the backing row. No-op returning `false` when the entity has no
    /// identifier.
    pub fn delete(&self, entity: &EntityHandle) -> Result<bool, CoreError> {
        let scope = self.scope()?;
        let meta = scope.metadata().for_kind(self.kind)?;
        let source = meta.require_source()?.clone();

        let id = match entity.borrow().id() {
            Some(id) => id,
            None => return Ok(false),
        };
        let removed = scope.storage().delete(&source, id)?;
        if removed && scope.config().enable_registry {
            // The row is now confirmed absent under its canonical lookup.
            let fingerprint = self.id_fingerprint(&scope, id)?;
            scope
                .registry()
                .add(self.kind, fingerprint, CachedValue::Absent, false);
        }
        debug!(kind = self.kind, id, removed, "delete");
        Ok(removed)
    }

    /// Fingerprint of the canonical id lookup, shaped exactly like
    /// `find_by_id` shapes it.
    pub(crate) fn id_fingerprint(
        &self,
        scope: &Rc<UnitOfWork>,
        id: EntityId,
    ) -> Result<Fingerprint, CoreError> {
        let meta = scope.metadata().for_kind(self.kind)?;
        let shaped = self.shape_query(scope, meta, QueryDescriptor::by_id(self.kind, id))?;
        Ok(shaped.fingerprint())
    }

    /// Rights predicate injection, then the conditional translation join.
    pub(crate) fn shape_query(
        &self,
        scope: &Rc<UnitOfWork>,
        meta: &EntityMetadata,
        query: QueryDescriptor,
    ) -> Result<QueryDescriptor, CoreError> {
        let mut shaped = scope.config().rights.apply_read_rights(query);
        if self.translating(scope, meta) {
            let source = meta.require_source()?;
            shaped = shaped.join(Join {
                source: translation_source(&source.name),
                local_key: source.id_column.clone(),
                foreign_key: "entity_id".into(),
                projected: meta
                    .translated_fields()
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
            });
        }
        Ok(shaped)
    }

    /// Whether reads/writes for this kind must route localized columns
    /// through the translation collaborator right now.
    pub(crate) fn translating(&self, scope: &Rc<UnitOfWork>, meta: &EntityMetadata) -> bool {
        !meta.translated_fields().is_empty()
            && scope.config().translation.has_properties_to_translate(self.kind)
            && !scope.config().translation.is_current_locale_default()
    }

    fn after_load(&self, scope: &Rc<UnitOfWork>) {
        if scope.config().governor.is_memory_usage_high() {
            warn!(
                kind = self.kind,
                "memory governor reports high usage; flushing unit-of-work caches"
            );
            scope.flush_caches();
        }
    }
}

fn translation_source(base: &str) -> String {
    format!("{base}_i18n")
}
