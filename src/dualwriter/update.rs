//! An update that has already been resolved.
//!
//! The dual writer computes the new object once and hands each store a
//! `ResolvedUpdate`, so the two stores can never diverge through independent patch
//! computation.

use crate::storage::{Preconditions, Resource, UpdatedObjectInfo, ValidationError};

#[derive(Debug, Clone)]
pub(crate) struct ResolvedUpdate<T> {
    object: T,
    preconditions: Option<Preconditions>,
}

impl<T: Resource> ResolvedUpdate<T> {
    /// For the store the object was resolved against: the update only applies if that
    /// store still holds `basis_version`.
    pub(crate) fn guarded(object: T, basis_version: Option<String>) -> Self {
        let preconditions = basis_version.map(|rv| Preconditions {
            uid: None,
            resource_version: Some(rv),
        });
        Self { object, preconditions }
    }

    /// For the other store: the object replaces whatever version that store holds.
    pub(crate) fn rebased(object: T) -> Self {
        Self {
            object,
            preconditions: None,
        }
    }
}

impl<T: Resource> UpdatedObjectInfo<T> for ResolvedUpdate<T> {
    fn preconditions(&self) -> Option<Preconditions> {
        self.preconditions.clone()
    }

    fn updated_object(&self, old: Option<&T>) -> Result<T, ValidationError> {
        let mut obj = self.object.clone();
        obj.metadata_mut().resource_version = old.map(|o| o.resource_version().to_string()).unwrap_or_default();
        Ok(obj)
    }
}
