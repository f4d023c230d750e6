//! Domain entity model.
//!
//! Entities are dynamic field bags with an optional stable identifier, an
//! ownership graph (a child's `parent` is a back-reference, never an ownership
//! edge), and a semantic `unique_key` derived from identity or content.
//!
//! Everything here is unit-of-work local: handles are `Rc`, interior
//! mutability is `RefCell`, parent pointers are `Weak`.

mod error;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use time::OffsetDateTime;

pub use error::{FieldViolation, ValidationError};

/// Stable storage identifier. Generated ids are always non-zero.
pub type EntityId = i64;

/// Entity type tag, registered once in the metadata registry.
pub type EntityKind = &'static str;

/// Shared handle to an entity within one unit of work.
///
/// Pointer identity of the handle is entity identity: the identity map and the
/// cascade's reattachment step both compare handles with [`Rc::ptr_eq`].
pub type EntityHandle = Rc<RefCell<Entity>>;

/// Non-owning back-reference from a child to its parent.
pub type ParentRef = Weak<RefCell<Entity>>;

/// A single field slot on an entity or a backing record.
///
/// `Entity` and `Collection` values are child edges: they drive the update
/// cascade and never serialize into the owning row.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(OffsetDateTime),
    Entity(EntityHandle),
    Collection(Vec<EntityHandle>),
}

impl FieldValue {
    /// True for `Entity` and `Collection` values.
    pub fn is_child_edge(&self) -> bool {
        matches!(self, Self::Entity(_) | Self::Collection(_))
    }

    /// True for `Null` and for empty text, the two shapes a storage column
    /// reports when it carries no value.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    fn content_hash_into(&self, hasher: &mut DefaultHasher) {
        match self {
            Self::Null => 0u8.hash(hasher),
            Self::Bool(b) => {
                1u8.hash(hasher);
                b.hash(hasher);
            }
            Self::Int(i) => {
                2u8.hash(hasher);
                i.hash(hasher);
            }
            Self::Float(f) => {
                3u8.hash(hasher);
                f.to_bits().hash(hasher);
            }
            Self::Text(s) => {
                4u8.hash(hasher);
                s.hash(hasher);
            }
            Self::Timestamp(ts) => {
                5u8.hash(hasher);
                ts.unix_timestamp().hash(hasher);
                ts.nanosecond().hash(hasher);
            }
            Self::Entity(child) => {
                6u8.hash(hasher);
                child.borrow().unique_key().hash(hasher);
            }
            Self::Collection(children) => {
                7u8.hash(hasher);
                children.len().hash(hasher);
                for child in children {
                    child.borrow().unique_key().hash(hasher);
                }
            }
        }
    }
}

impl PartialEq for FieldValue {
    /// Scalars compare by value; child edges compare by handle identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => Rc::ptr_eq(a, b),
            (Self::Collection(a), Self::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
            }
            _ => false,
        }
    }
}

/// Entity lifecycle within one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No identifier yet; never persisted.
    Transient,
    /// Identifier assigned, local mutations not yet flushed.
    PersistedDirty,
    /// In sync with the backing store as of the last load/update.
    Persisted,
    /// A registry entry for this entity was superseded by another handle.
    Stale,
    /// The registry scope holding this entity was cleared.
    Evicted,
}

/// In-memory domain object: a typed field bag with identity and ownership
/// edges. Concrete domain types wrap this with explicit accessors.
#[derive(Debug)]
pub struct Entity {
    kind: EntityKind,
    id: Option<EntityId>,
    fields: BTreeMap<String, FieldValue>,
    parent: Option<ParentRef>,
    state: LifecycleState,
    resolved: HashMap<&'static str, FieldValue>,
}

impl Entity {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            id: None,
            fields: BTreeMap::new(),
            parent: None,
            state: LifecycleState::Transient,
            resolved: HashMap::new(),
        }
    }

    /// Wrap this entity in a shared handle.
    pub fn handle(self) -> EntityHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn mark_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// Explicitly set a field. Only explicitly set fields are written back to
    /// storage; an unset field is never blanked.
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
        if self.state == LifecycleState::Persisted {
            self.state = LifecycleState::PersistedDirty;
        }
    }

    /// Set a field without touching lifecycle state. Used by the mapper and
    /// the cascade merge, which re-settle state themselves.
    pub(crate) fn set_field_raw(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Named child edges: every explicitly set `Entity` or `Collection` field.
    pub fn child_edges(&self) -> Vec<(String, FieldValue)> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_child_edge())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set_parent(&mut self, parent: &EntityHandle) {
        self.parent = Some(Rc::downgrade(parent));
    }

    /// The parent this entity points back at, if it is still alive.
    pub fn parent(&self) -> Option<EntityHandle> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Semantic key: identity when persisted, content otherwise.
    pub fn unique_key(&self) -> String {
        match self.id {
            Some(id) => format!("{}:{}", self.kind, id),
            None => format!("{}#{:016x}", self.kind, self.content_hash()),
        }
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        for (name, value) in &self.fields {
            name.hash(&mut hasher);
            value.content_hash_into(&mut hasher);
        }
        hasher.finish()
    }

    pub(crate) fn cached_resolved(&self, property: &str) -> Option<&FieldValue> {
        self.resolved.get(property)
    }

    pub(crate) fn cache_resolved(&mut self, property: &'static str, value: FieldValue) {
        self.resolved.insert(property, value);
    }
}
