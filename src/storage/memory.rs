//! In-memory storage adapter.
//!
//! Reference adapter used by the test suite and by embedded hosts that do not
//! need a durable store. Supports equality/range/like/in predicates, join
//! projection overlays, and offset/limit paging. Counts queries and writes so
//! callers can assert on load behavior.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::domain::{EntityId, FieldValue};
use crate::mapper::BackingRecord;
use crate::metadata::RecordSource;
use crate::query::{Comparison, ParamValue, Predicate, QueryDescriptor};

use super::{StorageAdapter, StorageError};

type Row = BTreeMap<String, FieldValue>;

#[derive(Default)]
pub struct MemoryStorage {
    tables: RefCell<HashMap<String, BTreeMap<EntityId, Row>>>,
    next_id: Cell<EntityId>,
    queries: Cell<u64>,
    writes: Cell<u64>,
    invalidations: Cell<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            ..Self::default()
        }
    }

    /// Insert a row directly, returning its generated id. Test scaffolding.
    pub fn seed(&self, table: &str, fields: Vec<(&str, FieldValue)>) -> EntityId {
        let id = self.allocate_id();
        let row: Row = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        id
    }

    /// Read one column of one row without counting as a query. Test scaffolding.
    pub fn raw_column(&self, table: &str, id: EntityId, column: &str) -> Option<FieldValue> {
        self.tables
            .borrow()
            .get(table)
            .and_then(|rows| rows.get(&id))
            .and_then(|row| row.get(column))
            .cloned()
    }

    pub fn query_count(&self) -> u64 {
        self.queries.get()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.get()
    }

    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.get()
    }

    fn allocate_id(&self) -> EntityId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn candidates(&self, source: &RecordSource, query: &QueryDescriptor) -> Vec<BackingRecord> {
        let tables = self.tables.borrow();
        let rows = match tables.get(&source.name) {
            Some(rows) => rows,
            None => return Vec::new(),
        };

        let mut matched = Vec::new();
        for (id, row) in rows {
            let mut fields = row.clone();
            fields.insert(source.id_column.clone(), FieldValue::Int(*id));

            for join in query.joins() {
                if let Some(joined) = tables.get(&join.source) {
                    let local = fields.get(&join.local_key).cloned();
                    let hit = joined.iter().find(|(jid, jrow)| {
                        let foreign = if join.foreign_key == source.id_column {
                            Some(FieldValue::Int(**jid))
                        } else {
                            jrow.get(&join.foreign_key).cloned()
                        };
                        match (&local, &foreign) {
                            (Some(a), Some(b)) => a == b,
                            _ => false,
                        }
                    });
                    if let Some((_, jrow)) = hit {
                        for column in &join.projected {
                            if let Some(value) = jrow.get(column) {
                                fields.insert(column.clone(), value.clone());
                            }
                        }
                    }
                }
            }

            if query.predicates().iter().all(|p| matches(&fields, p)) {
                matched.push(BackingRecord::from_fields(fields));
            }
        }

        if let Some(paging) = query.paging() {
            matched = matched
                .into_iter()
                .skip(paging.offset as usize)
                .take(paging.limit as usize)
                .collect();
        }
        matched
    }
}

impl StorageAdapter for MemoryStorage {
    fn fetch_one(
        &self,
        source: &RecordSource,
        query: &QueryDescriptor,
    ) -> Result<Option<BackingRecord>, StorageError> {
        self.queries.set(self.queries.get() + 1);
        Ok(self.candidates(source, query).into_iter().next())
    }

    fn fetch_many(
        &self,
        source: &RecordSource,
        query: &QueryDescriptor,
    ) -> Result<Vec<BackingRecord>, StorageError> {
        self.queries.set(self.queries.get() + 1);
        Ok(self.candidates(source, query))
    }

    fn upsert(
        &self,
        source: &RecordSource,
        id: Option<EntityId>,
        record: &BackingRecord,
    ) -> Result<EntityId, StorageError> {
        self.writes.set(self.writes.get() + 1);
        let id = id.unwrap_or_else(|| self.allocate_id());

        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(source.name.clone()).or_default();
        let row = rows.entry(id).or_default();
        for (column, value) in record.fields() {
            if *column == source.id_column {
                continue;
            }
            row.insert(column.clone(), value.clone());
        }
        Ok(id)
    }

    fn delete(&self, source: &RecordSource, id: EntityId) -> Result<bool, StorageError> {
        self.writes.set(self.writes.get() + 1);
        Ok(self
            .tables
            .borrow_mut()
            .get_mut(&source.name)
            .is_some_and(|rows| rows.remove(&id).is_some()))
    }

    fn invalidate_caches(&self) {
        self.invalidations.set(self.invalidations.get() + 1);
    }
}

fn matches(row: &Row, predicate: &Predicate) -> bool {
    let value = row.get(&predicate.field);
    match predicate.op {
        Comparison::Eq => value.is_some_and(|v| param_eq(v, &predicate.value)),
        Comparison::Ne => !value.is_some_and(|v| param_eq(v, &predicate.value)),
        Comparison::Lt => ordered(value, &predicate.value, |o| o == Ordering::Less),
        Comparison::Le => ordered(value, &predicate.value, |o| o != Ordering::Greater),
        Comparison::Gt => ordered(value, &predicate.value, |o| o == Ordering::Greater),
        Comparison::Ge => ordered(value, &predicate.value, |o| o != Ordering::Less),
        Comparison::Like => match (value, &predicate.value) {
            (Some(FieldValue::Text(text)), ParamValue::Text(pattern)) => {
                like_match(text, pattern)
            }
            _ => false,
        },
        Comparison::In => match &predicate.value {
            ParamValue::List(items) => {
                value.is_some_and(|v| items.iter().any(|item| param_eq(v, item)))
            }
            _ => false,
        },
    }
}

fn ordered(
    value: Option<&FieldValue>,
    param: &ParamValue,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    value
        .and_then(|v| param_cmp(v, param))
        .is_some_and(accept)
}

fn param_eq(value: &FieldValue, param: &ParamValue) -> bool {
    match (value, param) {
        (FieldValue::Null, ParamValue::Null) => true,
        (FieldValue::Bool(a), ParamValue::Bool(b)) => a == b,
        _ => param_cmp(value, param) == Some(Ordering::Equal),
    }
}

fn param_cmp(value: &FieldValue, param: &ParamValue) -> Option<Ordering> {
    match (value, param) {
        (FieldValue::Int(a), ParamValue::Int(b)) => Some(a.cmp(b)),
        (FieldValue::Int(a), ParamValue::Float(b)) => (*a as f64).partial_cmp(b),
        (FieldValue::Float(a), ParamValue::Float(b)) => a.partial_cmp(b),
        (FieldValue::Float(a), ParamValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (FieldValue::Text(a), ParamValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (FieldValue::Timestamp(a), ParamValue::Timestamp(b)) => Some(a.cmp(b)),
        (FieldValue::Timestamp(a), ParamValue::Int(b)) => Some(a.unix_timestamp().cmp(b)),
        _ => None,
    }
}

/// SQL-style `LIKE` with `%` wildcards only.
fn like_match(text: &str, pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('%').collect();
    if segments.len() == 1 {
        return text == pattern;
    }

    let mut rest = text;
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == last {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}
