//! Shared fixtures: a small SEO-ish domain (pages with lazily loaded ranking
//! factors) wired onto the in-memory storage adapter.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use telaio::{
    ChangeHistoryDescriptor, Comparison, CoreError, Entity, EntityHandle, EntityId, EntityKind,
    EntityMetadata, FieldValue, LazyLoadDescriptor, MemoryGovernor, MemoryStorage,
    MetadataRegistry, ParamValue, QueryDescriptor, Repository, RepositoryConfig, Rights,
    StorageError, TimestampEncoding, Translation, UnitOfWork,
};

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Loader for the `page.factors` lazy collection.
pub fn load_factors(
    repo: &Repository,
    owner: &EntityHandle,
    use_cache: bool,
) -> Result<FieldValue, CoreError> {
    let owner_id = match owner.borrow().id() {
        Some(id) => id,
        None => return Ok(FieldValue::Collection(Vec::new())),
    };
    let query = QueryDescriptor::for_kind("factor").filter(
        "page_id",
        Comparison::Eq,
        ParamValue::Int(owner_id),
    );
    Ok(FieldValue::Collection(repo.find_all_with(query, use_cache)?))
}

pub fn metadata() -> Rc<MetadataRegistry> {
    MetadataRegistry::builder()
        .register(
            EntityMetadata::new("page")
                .source("pages")
                .require("title")
                .history(ChangeHistoryDescriptor::new(
                    "date_created",
                    "date_modified",
                    TimestampEncoding::EpochSeconds,
                ))
                .translated("title")
                .translated("meta_description")
                .lazy(LazyLoadDescriptor {
                    property: "factors",
                    repository: "factor",
                    loader: load_factors,
                    cache_by_default: true,
                }),
        )
        .register(EntityMetadata::new("factor").source("factors").require("name"))
        .build()
}

pub fn scope_with(storage: Rc<MemoryStorage>, config: RepositoryConfig) -> Rc<UnitOfWork> {
    UnitOfWork::new(metadata(), storage, config)
}

pub fn scope(storage: Rc<MemoryStorage>) -> Rc<UnitOfWork> {
    scope_with(storage, RepositoryConfig::default())
}

pub fn page_entity(title: &str) -> EntityHandle {
    let mut page = Entity::new("page");
    page.set_field("title", FieldValue::Text(title.into()));
    page.handle()
}

pub fn factor_entity(name: &str, page_id: Option<EntityId>) -> EntityHandle {
    let mut factor = Entity::new("factor");
    factor.set_field("name", FieldValue::Text(name.into()));
    if let Some(page_id) = page_id {
        factor.set_field("page_id", FieldValue::Int(page_id));
    }
    factor.handle()
}

/// Rights collaborator that refuses every update.
pub struct DenyWrites;

impl Rights for DenyWrites {
    fn apply_update_rights(&self, _query: &QueryDescriptor) -> bool {
        false
    }
}

/// Rights collaborator narrowing every read to one site.
pub struct SiteScope {
    pub site_id: i64,
}

impl Rights for SiteScope {
    fn apply_read_rights(&self, query: QueryDescriptor) -> QueryDescriptor {
        query.filter("site_id", Comparison::Eq, ParamValue::Int(self.site_id))
    }
}

/// Translation collaborator that records upserts; `active` simulates
/// "non-default locale with translatable properties".
#[derive(Default)]
pub struct RecordingTranslation {
    pub active: Cell<bool>,
    pub upserts: RefCell<Vec<(EntityKind, EntityId, BTreeMap<String, FieldValue>)>>,
}

impl Translation for RecordingTranslation {
    fn has_properties_to_translate(&self, kind: EntityKind) -> bool {
        self.active.get() && kind == "page"
    }

    fn is_current_locale_default(&self) -> bool {
        !self.active.get()
    }

    fn upsert_translation(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError> {
        self.upserts.borrow_mut().push((kind, id, fields.clone()));
        Ok(())
    }
}

/// Memory governor toggled by the test.
#[derive(Default)]
pub struct TogglingGovernor {
    pub high: Cell<bool>,
}

impl MemoryGovernor for TogglingGovernor {
    fn is_memory_usage_high(&self) -> bool {
        self.high.get()
    }
}
