//! Declarative deferred resolution of relational properties.
//!
//! A property carrying a [`crate::metadata::LazyLoadDescriptor`] is not
//! populated at construction time. The first read dispatches the descriptor's
//! loader through the named repository with the owning entity as context, and
//! the resolved value is cached on the owner so further reads are free.
//! Collections resolved this way are immutable snapshots from the resolving
//! call; they do not auto-refresh.

use std::rc::Rc;

use tracing::debug;

use crate::domain::{EntityHandle, FieldValue};
use crate::error::CoreError;
use crate::unit_of_work::UnitOfWork;

/// Resolve `property` on `owner`.
///
/// `use_cache = false` forces re-resolution and registry bypass for this one
/// call; the fresh value still replaces the owner's cached copy. A missing
/// descriptor or an unregistered loader repository is a fatal
/// [`CoreError::Configuration`], surfaced at first access.
pub fn resolve(
    scope: &Rc<UnitOfWork>,
    owner: &EntityHandle,
    property: &str,
    use_cache: bool,
) -> Result<FieldValue, CoreError> {
    let kind = owner.borrow().kind();
    let descriptor = scope
        .metadata()
        .for_kind(kind)?
        .lazy_descriptor(property)
        .ok_or_else(|| {
            CoreError::configuration(format!(
                "no lazy-load descriptor registered for `{kind}.{property}`"
            ))
        })?
        .clone();

    if use_cache && descriptor.cache_by_default {
        if let Some(value) = owner.borrow().cached_resolved(property) {
            debug!(kind, property, "lazy property served from owner cache");
            return Ok(value.clone());
        }
    }

    let repository = scope.repository(descriptor.repository)?;
    let value = (descriptor.loader)(&repository, owner, use_cache)?;
    if descriptor.cache_by_default {
        owner
            .borrow_mut()
            .cache_resolved(descriptor.property, value.clone());
    }
    debug!(kind, property, use_cache, "lazy property resolved");
    Ok(value)
}
