//! Merge-safe update cascade.
//!
//! `Start → ValidateRoot → ApplyRights → UpdateChildren → PersistRoot →
//! ReloadIfExisting → MergeAndReattach → End`. Children persist before the
//! root, the set of child-touched properties is recorded, and the post-write
//! reload merges only fields outside that set, so a fresh child write is
//! never clobbered by a stale reload. Every merged child value is rewired to
//! point back at the root handle the caller retains, never at the transient
//! reload instance.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use time::OffsetDateTime;
use tracing::debug;

use crate::domain::{Entity, EntityHandle, FieldValue, LifecycleState, ValidationError};
use crate::error::CoreError;
use crate::mapper::Mapper;
use crate::metadata::EntityMetadata;
use crate::query::QueryDescriptor;
use crate::registry::CachedValue;
use crate::unit_of_work::UnitOfWork;

use super::Repository;

pub(crate) fn run(
    repo: &Repository,
    root: &EntityHandle,
    depth: u32,
) -> Result<EntityHandle, CoreError> {
    let scope = repo.scope()?;
    let kind = repo.kind();
    let meta = scope.metadata().for_kind(kind)?;
    let source = meta.require_source()?.clone();

    // ValidateRoot: fail here and nothing has been written anywhere.
    validate(meta, &root.borrow())?;

    let pre_existing_id = root.borrow().id();

    // ApplyRights: denial is not an error, the caller's entity comes back
    // untouched.
    let locate = match pre_existing_id {
        Some(id) => QueryDescriptor::by_id(kind, id),
        None => QueryDescriptor::for_kind(kind),
    };
    if !scope.config().rights.apply_update_rights(&locate) {
        debug!(kind, "update denied; returning entity unchanged");
        return Ok(root.clone());
    }

    // UpdateChildren: each child goes through its own repository first. A
    // child failure aborts the cascade before the root row is touched.
    let mut touched: BTreeSet<String> = BTreeSet::new();
    if depth > 0 {
        for (field, value) in root.borrow().child_edges() {
            match value {
                FieldValue::Entity(child) => {
                    update_child(&scope, root, &child, depth - 1)?;
                    touched.insert(field);
                }
                FieldValue::Collection(children) => {
                    for child in &children {
                        update_child(&scope, root, child, depth - 1)?;
                    }
                    touched.insert(field);
                }
                _ => {}
            }
        }
    }

    // PersistRoot. In a non-default locale, localized columns of an existing
    // row belong to the translation upsert, not the main row; a new row is
    // persisted whole first because the translation row needs its id.
    let now = OffsetDateTime::now_utc();
    let translating = repo.translating(&scope, meta);
    let excluded: Vec<&str> = if translating && pre_existing_id.is_some() {
        meta.translated_fields().to_vec()
    } else {
        Vec::new()
    };
    let record = Mapper::new(meta).map_to_record(&root.borrow(), now, &excluded)?;
    let id = scope.storage().upsert(&source, pre_existing_id, &record)?;

    if translating {
        let localized: BTreeMap<String, FieldValue> = root
            .borrow()
            .fields()
            .iter()
            .filter(|(name, _)| meta.translated_fields().iter().any(|f| *f == name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !localized.is_empty() {
            scope
                .config()
                .translation
                .upsert_translation(kind, id, &localized)?;
        }
    }

    // ReloadIfExisting → MergeAndReattach for updates; id assignment for
    // inserts.
    if pre_existing_id.is_some() {
        let reload_query = repo.shape_query(&scope, meta, QueryDescriptor::by_id(kind, id))?;
        if let Some(record) = scope.storage().fetch_one(&source, &reload_query)? {
            let reload = Mapper::new(meta).map_to_entity(&record)?;
            merge_and_reattach(root, &reload, &touched);
        }
    } else {
        root.borrow_mut().set_id(id);
    }
    root.borrow_mut().mark_state(LifecycleState::Persisted);

    if scope.config().enable_registry {
        let fingerprint = repo.id_fingerprint(&scope, id)?;
        scope
            .registry()
            .add(kind, fingerprint, CachedValue::One(root.clone()), false);
    }
    debug!(kind, id, child_properties = touched.len(), "update cascade complete");
    Ok(root.clone())
}

fn validate(meta: &EntityMetadata, entity: &Entity) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    for field in meta.required_fields() {
        match entity.field(field) {
            None => err.push(*field, "required field is not set"),
            Some(value) if value.is_empty() => err.push(*field, "required field is empty"),
            _ => {}
        }
    }
    if !err.is_empty() {
        return Err(err);
    }
    if let Some(validator) = meta.custom_validator() {
        validator(entity)?;
    }
    Ok(())
}

fn update_child(
    scope: &Rc<UnitOfWork>,
    root: &EntityHandle,
    child: &EntityHandle,
    depth: u32,
) -> Result<(), CoreError> {
    let child_kind = child.borrow().kind();
    let child_repo = scope.repository(child_kind)?;
    child_repo.update_depth(child, depth)?;
    child.borrow_mut().set_parent(root);
    Ok(())
}

/// Copy every reload field the child cascade did not already set into the
/// caller's entity, rewiring merged child values to the caller's root handle.
fn merge_and_reattach(root: &EntityHandle, reload: &EntityHandle, touched: &BTreeSet<String>) {
    let reload_fields = reload.borrow().fields().clone();
    for (name, value) in reload_fields {
        if touched.contains(&name) {
            continue;
        }
        match &value {
            FieldValue::Entity(child) => {
                child.borrow_mut().set_parent(root);
            }
            FieldValue::Collection(children) => {
                for child in children {
                    child.borrow_mut().set_parent(root);
                }
            }
            _ => {}
        }
        root.borrow_mut().set_field_raw(name, value);
    }
}
