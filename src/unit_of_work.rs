//! One unit-of-work scope.
//!
//! Ties together the identity map, the storage adapter, the metadata
//! registry, and the repositories that share them. Dropping the unit of work
//! ends the scope; nothing here outlives it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::domain::{EntityHandle, EntityKind, FieldValue};
use crate::error::CoreError;
use crate::lazy;
use crate::metadata::MetadataRegistry;
use crate::registry::EntityRegistry;
use crate::repository::{Repository, RepositoryConfig};
use crate::storage::StorageAdapter;

pub struct UnitOfWork {
    registry: Rc<EntityRegistry>,
    storage: Rc<dyn StorageAdapter>,
    metadata: Rc<MetadataRegistry>,
    config: RepositoryConfig,
    repos: RefCell<HashMap<EntityKind, Rc<Repository>>>,
}

impl UnitOfWork {
    pub fn new(
        metadata: Rc<MetadataRegistry>,
        storage: Rc<dyn StorageAdapter>,
        config: RepositoryConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            registry: EntityRegistry::new(),
            storage,
            metadata,
            config,
            repos: RefCell::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &Rc<EntityRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Rc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn metadata(&self) -> &Rc<MetadataRegistry> {
        &self.metadata
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The repository for one registered kind, created on first use.
    /// An unregistered kind is a fatal configuration error.
    pub fn repository(self: &Rc<Self>, kind: EntityKind) -> Result<Rc<Repository>, CoreError> {
        if let Some(repo) = self.repos.borrow().get(kind) {
            return Ok(repo.clone());
        }
        self.metadata.for_kind(kind)?;
        let repo = Rc::new(Repository::new(kind, Rc::downgrade(self)));
        self.repos.borrow_mut().insert(kind, repo.clone());
        Ok(repo)
    }

    /// Resolve a lazy property on `owner`, honoring its cache policy.
    pub fn resolve(
        self: &Rc<Self>,
        owner: &EntityHandle,
        property: &str,
    ) -> Result<FieldValue, CoreError> {
        lazy::resolve(self, owner, property, true)
    }

    /// Resolve a lazy property, forcing re-resolution and registry bypass for
    /// this one call.
    pub fn resolve_fresh(
        self: &Rc<Self>,
        owner: &EntityHandle,
        property: &str,
    ) -> Result<FieldValue, CoreError> {
        lazy::resolve(self, owner, property, false)
    }

    /// Evict the identity map and store-level caches. Called explicitly by
    /// the host or by repositories when the memory governor reports pressure.
    pub fn flush_caches(&self) {
        self.registry.clear();
        self.storage.invalidate_caches();
    }
}
