//! Repository construction config.
//!
//! Explicit and immutable: collaborators and tunables are fixed at
//! construction, so repository behavior is deterministic and testable in
//! isolation.

use std::rc::Rc;

use serde::Deserialize;

use crate::collab::{AllowAll, MemoryGovernor, NeverHigh, NoTranslation, Rights, Translation};

const DEFAULT_CASCADE_DEPTH: u32 = 1;

/// Serializable tunables, layered by the host from its own config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Consult and populate the identity map on lookups.
    pub enable_registry: bool,
    /// Nested-update depth used by `update` without an explicit depth.
    pub default_cascade_depth: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enable_registry: true,
            default_cascade_depth: DEFAULT_CASCADE_DEPTH,
        }
    }
}

/// Immutable configuration shared by every repository in a unit of work.
#[derive(Clone)]
pub struct RepositoryConfig {
    pub rights: Rc<dyn Rights>,
    pub translation: Rc<dyn Translation>,
    pub governor: Rc<dyn MemoryGovernor>,
    pub enable_registry: bool,
    pub default_cascade_depth: u32,
}

impl RepositoryConfig {
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder {
            rights: Rc::new(AllowAll),
            translation: Rc::new(NoTranslation),
            governor: Rc::new(NeverHigh),
            tunables: CoreConfig::default(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct RepositoryConfigBuilder {
    rights: Rc<dyn Rights>,
    translation: Rc<dyn Translation>,
    governor: Rc<dyn MemoryGovernor>,
    tunables: CoreConfig,
}

impl RepositoryConfigBuilder {
    pub fn rights(mut self, rights: Rc<dyn Rights>) -> Self {
        self.rights = rights;
        self
    }

    pub fn translation(mut self, translation: Rc<dyn Translation>) -> Self {
        self.translation = translation;
        self
    }

    pub fn governor(mut self, governor: Rc<dyn MemoryGovernor>) -> Self {
        self.governor = governor;
        self
    }

    pub fn tunables(mut self, tunables: CoreConfig) -> Self {
        self.tunables = tunables;
        self
    }

    pub fn build(self) -> RepositoryConfig {
        RepositoryConfig {
            rights: self.rights,
            translation: self.translation,
            governor: self.governor,
            enable_registry: self.tunables.enable_registry,
            default_cascade_depth: self.tunables.default_cascade_depth,
        }
    }
}
