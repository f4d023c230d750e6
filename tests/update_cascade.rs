//! Update cascade: children-first persistence, diff-aware merge after the
//! post-write reload, parent reattachment, validation, rights denial, and
//! change-history stamping.

mod common;

use std::rc::Rc;

use telaio::{
    CoreError, Entity, FieldValue, LifecycleState, MemoryStorage, RepositoryConfig,
};

use common::{DenyWrites, factor_entity, page_entity, scope, scope_with};

#[test]
fn inserting_assigns_an_id_and_registers_identity() {
    common::init_tracing();
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let page = page_entity("Hello");
    let returned = repo.update(&page).unwrap();
    assert!(Rc::ptr_eq(&returned, &page));

    let id = page.borrow().id().expect("id assigned");
    assert!(id > 0);
    assert_eq!(page.borrow().state(), LifecycleState::Persisted);
    assert_eq!(storage.write_count(), 1);

    // A fresh insert needs no reload.
    assert_eq!(storage.query_count(), 0);

    // Immediately findable without touching the store again.
    let found = repo.find_by_id(id).unwrap().expect("just written");
    assert!(Rc::ptr_eq(&found, &page));
    assert_eq!(storage.query_count(), 0);
}

#[test]
fn inserting_stamps_only_the_created_column() {
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let page = page_entity("Hello");
    repo.update(&page).unwrap();
    let id = page.borrow().id().expect("id assigned");

    assert!(matches!(
        storage.raw_column("pages", id, "date_created"),
        Some(FieldValue::Int(_))
    ));
    assert!(storage.raw_column("pages", id, "date_modified").is_none());
}

#[test]
fn updating_stamps_modified_and_merges_unset_fields() {
    let storage = Rc::new(MemoryStorage::new());
    let id = storage.seed(
        "pages",
        vec![
            ("title", FieldValue::Text("Original".into())),
            ("words", FieldValue::Int(120)),
            ("date_created", FieldValue::Int(1_700_000_000)),
        ],
    );

    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    // A detached handle with only the fields the caller actually set.
    let mut page = Entity::new("page");
    page.set_id(id);
    page.set_field("title", FieldValue::Text("Edited".into()));
    let page = page.handle();

    repo.update(&page).unwrap();

    assert_eq!(
        storage.raw_column("pages", id, "title"),
        Some(FieldValue::Text("Edited".into()))
    );
    assert!(matches!(
        storage.raw_column("pages", id, "date_modified"),
        Some(FieldValue::Int(_))
    ));
    // The unset column was neither blanked in storage nor left off the
    // entity after the reload merge.
    assert_eq!(
        storage.raw_column("pages", id, "words"),
        Some(FieldValue::Int(120))
    );
    assert_eq!(page.borrow().field("words"), Some(&FieldValue::Int(120)));
    assert!(matches!(
        page.borrow().field("created_at"),
        Some(FieldValue::Timestamp(_))
    ));
    assert_eq!(page.borrow().state(), LifecycleState::Persisted);
}

#[test]
fn child_writes_survive_the_reload_merge() {
    let storage = Rc::new(MemoryStorage::new());
    let id = storage.seed(
        "pages",
        vec![
            ("title", FieldValue::Text("Original".into())),
            // Stale denormalized column that shares the child property name.
            ("factors", FieldValue::Text("stale snapshot".into())),
        ],
    );

    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let factor = factor_entity("keyword density", Some(id));
    let mut page = Entity::new("page");
    page.set_id(id);
    page.set_field("title", FieldValue::Text("Edited".into()));
    page.set_field("factors", FieldValue::Collection(vec![factor.clone()]));
    let page = page.handle();

    repo.update(&page).unwrap();

    // The child persisted through its own repository, before the root.
    let factor_id = factor.borrow().id().expect("child id assigned");
    assert_eq!(
        storage.raw_column("factors", factor_id, "name"),
        Some(FieldValue::Text("keyword density".into()))
    );

    // The touched property kept the fresh collection; the stale column from
    // the reload never clobbered it.
    match page.borrow().field("factors") {
        Some(FieldValue::Collection(children)) => {
            assert_eq!(children.len(), 1);
            assert!(Rc::ptr_eq(&children[0], &factor));
        }
        other => panic!("child property was overwritten: {other:?}"),
    }

    // The child points back at the handle the caller holds.
    let parent = factor.borrow().parent().expect("parent attached");
    assert!(Rc::ptr_eq(&parent, &page));
}

#[test]
fn deeper_cascades_reach_grandchildren() {
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let grandchild = factor_entity("alt attributes", None);
    let child = factor_entity("keyword density", None);
    child
        .borrow_mut()
        .set_field("refinements", FieldValue::Collection(vec![grandchild.clone()]));
    let page = page_entity("Hello");
    page.borrow_mut()
        .set_field("factors", FieldValue::Collection(vec![child.clone()]));

    // The default depth stops at direct children.
    repo.update_depth(&page, 1).unwrap();
    assert!(page.borrow().id().is_some());
    assert!(child.borrow().id().is_some());
    assert!(grandchild.borrow().id().is_none());
    assert_eq!(grandchild.borrow().state(), LifecycleState::Transient);
    assert_eq!(storage.write_count(), 2);

    repo.update_depth(&page, 2).unwrap();
    let grandchild_id = grandchild.borrow().id().expect("persisted at depth 2");
    assert_eq!(
        storage.raw_column("factors", grandchild_id, "name"),
        Some(FieldValue::Text("alt attributes".into()))
    );

    // Each level points back at its own parent handle.
    let mid = grandchild.borrow().parent().expect("parent attached");
    assert!(Rc::ptr_eq(&mid, &child));
    let top = child.borrow().parent().expect("parent attached");
    assert!(Rc::ptr_eq(&top, &page));
}

#[test]
fn depth_zero_leaves_children_untouched() {
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let factor = factor_entity("keyword density", None);
    let page = page_entity("Hello");
    page.borrow_mut()
        .set_field("factors", FieldValue::Collection(vec![factor.clone()]));

    repo.update_depth(&page, 0).unwrap();

    assert!(page.borrow().id().is_some());
    assert!(factor.borrow().id().is_none());
    assert_eq!(factor.borrow().state(), LifecycleState::Transient);
    assert_eq!(storage.write_count(), 1);
}

#[test]
fn denied_updates_return_the_entity_unchanged() {
    let storage = Rc::new(MemoryStorage::new());
    let config = RepositoryConfig::builder().rights(Rc::new(DenyWrites)).build();
    let scope = scope_with(storage.clone(), config);
    let repo = scope.repository("page").unwrap();

    let page = page_entity("Hello");
    let returned = repo.update(&page).unwrap();

    assert!(Rc::ptr_eq(&returned, &page));
    assert!(page.borrow().id().is_none());
    assert_eq!(page.borrow().state(), LifecycleState::Transient);
    assert_eq!(storage.write_count(), 0);
}

#[test]
fn missing_required_fields_abort_before_any_write() {
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let page = Entity::new("page").handle();
    let err = repo.update(&page).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(storage.write_count(), 0);

    // Empty text counts as unset.
    let blank = Entity::new("page").handle();
    blank
        .borrow_mut()
        .set_field("title", FieldValue::Text(String::new()));
    assert!(repo.update(&blank).is_err());
    assert_eq!(storage.write_count(), 0);
}

#[test]
fn an_invalid_child_aborts_before_the_root_row() {
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let nameless = Entity::new("factor").handle();
    let page = page_entity("Hello");
    page.borrow_mut()
        .set_field("factors", FieldValue::Collection(vec![nameless]));

    let err = repo.update(&page).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(storage.write_count(), 0);
    assert!(page.borrow().id().is_none());
}

#[test]
fn deleting_caches_confirmed_absence() {
    let storage = Rc::new(MemoryStorage::new());
    let id = storage.seed("pages", vec![("title", FieldValue::Text("Doomed".into()))]);

    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let page = repo.find_by_id(id).unwrap().expect("seeded row");
    assert!(repo.delete(&page).unwrap());

    let queries = storage.query_count();
    assert!(repo.find_by_id(id).unwrap().is_none());
    assert_eq!(storage.query_count(), queries);
}

#[test]
fn deleting_a_transient_entity_is_a_no_op() {
    let storage = Rc::new(MemoryStorage::new());
    let scope = scope(storage.clone());
    let repo = scope.repository("page").unwrap();

    let page = page_entity("Never saved");
    assert!(!repo.delete(&page).unwrap());
    assert_eq!(storage.write_count(), 0);
}
