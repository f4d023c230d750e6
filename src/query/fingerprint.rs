//! Canonical, hashable query fingerprints.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value, json};

use super::{QueryDescriptor, hash_value};

/// Canonical representation of a query, used as the identity-map cache key.
///
/// Equality and hashing are defined over the normalized form only: predicates
/// and joins are sorted, named parameters are rendered in key order, so two
/// descriptors built independently with the same meaning compare equal.
#[derive(Clone)]
pub struct Fingerprint {
    canonical: String,
    digest: u64,
}

impl Fingerprint {
    /// Normalize a descriptor into its fingerprint. Pure function.
    pub fn normalize(query: &QueryDescriptor) -> Self {
        let mut predicates: Vec<Value> = query
            .predicates()
            .iter()
            .map(|p| json!([p.field, p.op.as_str(), p.value.canonical()]))
            .collect();
        predicates.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

        let mut joins: Vec<Value> = query
            .joins()
            .iter()
            .map(|j| {
                let mut projected = j.projected.clone();
                projected.sort();
                json!([j.source, j.local_key, j.foreign_key, projected])
            })
            .collect();
        joins.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

        // BTreeMap iteration already yields params in key order.
        let mut params = Map::new();
        for (name, value) in query.params() {
            params.insert(name.clone(), value.canonical());
        }

        let paging = match query.paging() {
            Some(p) => json!([p.offset, p.limit]),
            None => Value::Null,
        };

        let mut root = Map::new();
        root.insert("kind".into(), json!(query.kind()));
        root.insert("predicates".into(), Value::Array(predicates));
        root.insert("joins".into(), Value::Array(joins));
        root.insert("params".into(), Value::Object(params));
        root.insert("paging".into(), paging);

        let canonical = Value::Object(root).to_string();
        let digest = hash_value(&canonical);
        Self { canonical, digest }
    }

    /// Cheap digest of the canonical form, for logging and quick comparison.
    pub fn digest(&self) -> u64 {
        self.digest
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Comparison, Join, ParamValue};

    fn base_query() -> QueryDescriptor {
        QueryDescriptor::for_kind("page")
            .filter("status", Comparison::Eq, ParamValue::Text("published".into()))
            .filter("words", Comparison::Ge, ParamValue::Int(300))
            .param("locale", ParamValue::Text("en".into()))
            .page(0, 20)
    }

    #[test]
    fn independently_built_descriptors_normalize_identically() {
        // Same predicates in a different order, params from a fresh container.
        let a = base_query();
        let b = QueryDescriptor::for_kind("page")
            .filter("words", Comparison::Ge, ParamValue::Int(300))
            .filter("status", Comparison::Eq, ParamValue::Text("published".into()))
            .param("locale", ParamValue::Text("en".into()))
            .page(0, 20);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().digest(), b.fingerprint().digest());
    }

    #[test]
    fn differing_parameters_produce_different_fingerprints() {
        let a = base_query();
        let b = base_query().param("locale", ParamValue::Text("it".into()));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn paging_is_part_of_the_canonical_form() {
        let a = base_query();
        let b = QueryDescriptor::for_kind("page")
            .filter("status", Comparison::Eq, ParamValue::Text("published".into()))
            .filter("words", Comparison::Ge, ParamValue::Int(300))
            .param("locale", ParamValue::Text("en".into()))
            .page(20, 20);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn join_projection_order_does_not_matter() {
        let join = |projected: Vec<&str>| Join {
            source: "pages_i18n".into(),
            local_key: "id".into(),
            foreign_key: "entity_id".into(),
            projected: projected.into_iter().map(String::from).collect(),
        };
        let a = QueryDescriptor::by_id("page", 3).join(join(vec!["title", "description"]));
        let b = QueryDescriptor::by_id("page", 3).join(join(vec!["description", "title"]));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn timestamp_params_normalize_by_instant() {
        use time::OffsetDateTime;
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let a = QueryDescriptor::for_kind("page").filter(
            "modified",
            Comparison::Ge,
            ParamValue::Timestamp(ts),
        );
        let b = QueryDescriptor::for_kind("page").filter(
            "modified",
            Comparison::Ge,
            ParamValue::Timestamp(ts.to_offset(time::macros::offset!(+2))),
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
