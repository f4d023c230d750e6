//! Telaio
//!
//! Unit-of-work entity persistence core: the framework layer that bridges
//! in-memory domain objects to heterogeneous backing stores.
//!
//! - **Identity map**: at most one backing-store load per `(kind,
//!   fingerprint)` within a scope, with explicit caching of confirmed-absent
//!   lookups and eviction on a host memory-pressure signal.
//! - **Fingerprints**: canonical, hashable query keys; semantically equal
//!   queries built through different code paths normalize identically.
//! - **Diff-aware mapping**: only explicitly set fields are written back, and
//!   created/modified change-history columns encode/decode transparently in
//!   epoch-seconds, ISO 8601, or naive-datetime spellings.
//! - **Lazy loading**: declarative per-type descriptors resolve relational
//!   properties on first access and cache the result on the owner.
//! - **Update cascades**: children persist first, and the post-write reload
//!   merges into the caller's object graph without clobbering fresh child
//!   writes or orphaning parent back-references.
//!
//! The core is single-threaded and synchronous; the storage transport,
//! rights, translation, and memory-governor collaborators plug in behind the
//! traits in [`storage`] and [`collab`].

pub mod collab;
pub mod domain;
pub mod error;
pub mod lazy;
pub mod mapper;
pub mod metadata;
pub mod query;
pub mod registry;
pub mod repository;
pub mod storage;
mod unit_of_work;

pub use collab::{AllowAll, MemoryGovernor, NeverHigh, NoTranslation, Rights, Translation};
pub use domain::{
    Entity, EntityHandle, EntityId, EntityKind, FieldValue, FieldViolation, LifecycleState,
    ValidationError,
};
pub use error::CoreError;
pub use mapper::{BackingRecord, Mapper, TimestampEncoding, TimestampError};
pub use metadata::{
    ChangeHistoryDescriptor, EntityMetadata, LazyLoadDescriptor, MetadataRegistry, RecordSource,
    RowMode,
};
pub use query::{
    Comparison, Fingerprint, Join, Paging, ParamValue, Predicate, QueryDescriptor, hash_value,
};
pub use registry::{CachedValue, EntityRegistry, RegistryEntry};
pub use repository::{CoreConfig, FindOptions, Repository, RepositoryConfig};
pub use storage::{MemoryStorage, StorageAdapter, StorageError};
pub use unit_of_work::UnitOfWork;
