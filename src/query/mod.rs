//! Query descriptors and canonical fingerprints.
//!
//! A [`QueryDescriptor`] is both the execution input handed to the storage
//! adapter and, through [`Fingerprint::normalize`], the identity-map cache key.
//! Semantically identical queries built through different code paths normalize
//! identically; parameter container identity never affects equality.

mod fingerprint;

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use time::OffsetDateTime;

use crate::domain::{EntityId, EntityKind};

pub use fingerprint::Fingerprint;

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Like => "like",
            Self::In => "in",
        }
    }
}

/// A query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(OffsetDateTime),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Canonical JSON rendering used by fingerprint normalization. Timestamps
    /// flatten to `[unix_seconds, nanosecond]` so construction style cannot
    /// leak into the canonical form.
    pub(crate) fn canonical(&self) -> serde_json::Value {
        use serde_json::{Value, json};
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => {
                // NaN/inf have no JSON form; render through the bit pattern.
                match serde_json::Number::from_f64(*f) {
                    Some(n) => Value::Number(n),
                    None => json!(format!("f64:{:016x}", f.to_bits())),
                }
            }
            Self::Text(s) => json!(s),
            Self::Timestamp(ts) => json!([ts.unix_timestamp(), ts.nanosecond()]),
            Self::List(items) => {
                Value::Array(items.iter().map(ParamValue::canonical).collect())
            }
        }
    }
}

/// A single filter clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Comparison,
    pub value: ParamValue,
}

/// A join against another record source, projecting columns onto the result.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub source: String,
    pub local_key: String,
    pub foreign_key: String,
    pub projected: Vec<String>,
}

/// Offset/limit pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub offset: u64,
    pub limit: u64,
}

/// Descriptor of one lookup: predicates, joins, named parameters, paging.
///
/// Built through the fluent methods; execution and fingerprinting both read
/// the same normalized content.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    kind: EntityKind,
    predicates: Vec<Predicate>,
    joins: Vec<Join>,
    params: BTreeMap<String, ParamValue>,
    paging: Option<Paging>,
}

impl QueryDescriptor {
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            kind,
            predicates: Vec::new(),
            joins: Vec::new(),
            params: BTreeMap::new(),
            paging: None,
        }
    }

    /// Canonical single-row lookup by identifier.
    pub fn by_id(kind: EntityKind, id: EntityId) -> Self {
        Self::for_kind(kind).filter("id", Comparison::Eq, ParamValue::Int(id))
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: Comparison,
        value: ParamValue,
    ) -> Self {
        self.predicates.push(Predicate {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.paging = Some(Paging { offset, limit });
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn paging(&self) -> Option<Paging> {
        self.paging
    }

    /// Derive the fingerprint of this descriptor.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::normalize(self)
    }
}
