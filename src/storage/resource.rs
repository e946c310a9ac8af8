//! # Resource & Storage Contract
//!
//! The `Resource` trait describes what every stored object must expose (identity and
//! resource version), and the `Storage` trait is the CRUD contract shared by every
//! backing store and by the `DualWriter` that sits in front of them.
//!
//! # Architecture Note
//! Both stores in a migration implement the *same* contract. That is what lets the
//! dual writer treat "legacy" and "new" as interchangeable delegates and pick between
//! them from a table instead of from hand-written branches.

use crate::context::RequestContext;
use crate::storage::error::{StorageError, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// Unique key of a resource inside one store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Metadata every resource carries.
///
/// An empty `resource_version` means "unset": objects handed to `create` must not carry
/// one, and objects handed to `update` without one skip the caller-side version check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Trait that any object must implement to be kept by a `Storage`.
///
/// Storage never looks inside the object beyond its metadata.
pub trait Resource: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Kind name used in errors and logs (e.g. `"Feature"`).
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(meta.namespace.clone(), meta.name.clone())
    }

    fn resource_version(&self) -> &str {
        &self.metadata().resource_version
    }
}

/// The operations of the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Create,
    Get,
    List,
    Update,
    Delete,
    DeleteCollection,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Create,
        OperationKind::Get,
        OperationKind::List,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::DeleteCollection,
    ];

    /// Whether the operation mutates stored state.
    pub fn is_write(self) -> bool {
        !matches!(self, OperationKind::Get | OperationKind::List)
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Create => "Create",
            OperationKind::Get => "Get",
            OperationKind::List => "List",
            OperationKind::Update => "Update",
            OperationKind::Delete => "Delete",
            OperationKind::DeleteCollection => "DeleteCollection",
        };
        f.write_str(name)
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Conditions that must hold on the stored object for a write to proceed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub uid: Option<String>,
    pub resource_version: Option<String>,
}

impl Preconditions {
    /// Checks the conditions against the currently stored object.
    pub fn check<T: Resource>(&self, current: &T) -> Result<(), StorageError> {
        let meta = current.metadata();
        if let Some(uid) = &self.uid {
            if uid != &meta.uid {
                return Err(StorageError::Conflict {
                    kind: T::KIND,
                    key: current.key().to_string(),
                    reason: format!("uid precondition failed: expected {}, found {}", uid, meta.uid),
                });
            }
        }
        if let Some(rv) = &self.resource_version {
            if rv != &meta.resource_version {
                return Err(StorageError::Conflict {
                    kind: T::KIND,
                    key: current.key().to_string(),
                    reason: format!(
                        "resourceVersion precondition failed: expected {}, found {}",
                        rv, meta.resource_version
                    ),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Validate and report, but do not persist.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub dry_run: bool,
    pub preconditions: Option<Preconditions>,
}

/// Listing filters. Forwarded to the read store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Restrict to one namespace; `None` lists all namespaces.
    pub namespace: Option<String>,
    /// Every pair must be present in the object's labels.
    pub label_selector: BTreeMap<String, String>,
    /// Maximum number of items per page; `0` means unlimited.
    pub limit: usize,
    /// Opaque token returned by a previous page.
    pub continue_token: Option<String>,
}

impl ListOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn matches<T: Resource>(&self, obj: &T) -> bool {
        let meta = obj.metadata();
        if let Some(ns) = &self.namespace {
            if ns != &meta.namespace {
                return false;
            }
        }
        self.label_selector
            .iter()
            .all(|(k, v)| meta.labels.get(k) == Some(v))
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList<T> {
    pub items: Vec<T>,
    /// Store-wide version at the time of the listing.
    pub resource_version: String,
    /// Set when more items remain; pass back via `ListOptions::continue_token`.
    pub continue_token: Option<String>,
}

impl<T> Default for ResourceList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            resource_version: String::new(),
            continue_token: None,
        }
    }
}

// =============================================================================
// VALIDATION & UPDATE RESOLUTION
// =============================================================================

/// Caller-supplied check run against an object before it is persisted.
pub type ValidateObjectFn<T> = dyn Fn(&T) -> Result<(), ValidationError> + Send + Sync;

/// Caller-supplied check run against `(new, old)` before an update is persisted.
pub type ValidateUpdateFn<T> = dyn Fn(&T, &T) -> Result<(), ValidationError> + Send + Sync;

/// Computes the new state of an object from its current state.
///
/// Stores call `updated_object` with the object they currently hold (or `None` when it
/// does not exist and creation is allowed). An implementation may be a full replacement,
/// a patch, or anything in between.
pub trait UpdatedObjectInfo<T: Resource>: Send + Sync {
    /// Conditions the stored object must meet before the update is applied.
    fn preconditions(&self) -> Option<Preconditions> {
        None
    }

    fn updated_object(&self, old: Option<&T>) -> Result<T, ValidationError>;
}

/// Full replacement: the stored object becomes exactly `object`.
///
/// If `object` carries a resource version, the store rejects the update when its own
/// copy has moved on.
#[derive(Debug, Clone)]
pub struct ReplaceObject<T>(pub T);

impl<T: Resource> UpdatedObjectInfo<T> for ReplaceObject<T> {
    fn updated_object(&self, _old: Option<&T>) -> Result<T, ValidationError> {
        Ok(self.0.clone())
    }
}

/// Update computed by a closure over the current object.
pub struct UpdateFn<T> {
    f: Arc<dyn Fn(Option<&T>) -> Result<T, ValidationError> + Send + Sync>,
    preconditions: Option<Preconditions>,
}

impl<T: Resource> UpdateFn<T> {
    pub fn new(f: impl Fn(Option<&T>) -> Result<T, ValidationError> + Send + Sync + 'static) -> Self {
        Self {
            f: Arc::new(f),
            preconditions: None,
        }
    }

    /// Mutates a copy of the existing object; fails when there is nothing to patch.
    pub fn patch(f: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        Self::new(move |old| {
            let mut obj = old
                .cloned()
                .ok_or_else(|| ValidationError::new("cannot patch an object that does not exist"))?;
            f(&mut obj);
            Ok(obj)
        })
    }

    pub fn with_preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = Some(preconditions);
        self
    }
}

impl<T: Resource> UpdatedObjectInfo<T> for UpdateFn<T> {
    fn preconditions(&self) -> Option<Preconditions> {
        self.preconditions.clone()
    }

    fn updated_object(&self, old: Option<&T>) -> Result<T, ValidationError> {
        (self.f)(old)
    }
}

// =============================================================================
// THE CONTRACT
// =============================================================================

/// CRUD contract implemented by every backing store and by the dual writer.
///
/// # Async & Context
/// Every call receives a [`RequestContext`] carrying cancellation and an optional
/// deadline. Implementations must not outlive it: once the context is done, the call
/// should return promptly.
#[async_trait]
pub trait Storage<T: Resource>: Send + Sync {
    /// Error type reported to callers.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: T,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &CreateOptions,
    ) -> Result<T, Self::Error>;

    async fn get(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        opts: &GetOptions,
    ) -> Result<T, Self::Error>;

    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> Result<ResourceList<T>, Self::Error>;

    /// Returns the stored object and whether it was created by this call.
    #[allow(clippy::too_many_arguments)]
    async fn update(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        info: &dyn UpdatedObjectInfo<T>,
        validate_create: Option<&ValidateObjectFn<T>>,
        validate_update: Option<&ValidateUpdateFn<T>>,
        force_allow_create: bool,
        opts: &UpdateOptions,
    ) -> Result<(T, bool), Self::Error>;

    /// Returns the removed object and whether the deletion completed.
    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
    ) -> Result<(T, bool), Self::Error>;

    /// Deletes every object matched by `list_opts`, returning what was removed.
    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<ResourceList<T>, Self::Error>;
}

/// A backing store behind a trait object, as held by the dual writer.
pub type DynStorage<T> = Arc<dyn Storage<T, Error = StorageError>>;
