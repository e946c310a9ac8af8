//! # Memory Store Client
//!
//! The client half of a [`MemoryStore`](crate::storage::MemoryStore). It implements
//! the [`Storage`] contract by turning each call into one or more [`StoreRequest`]s.

use crate::context::RequestContext;
use crate::storage::error::StorageError;
use crate::storage::message::{Response, StoreRequest};
use crate::storage::resource::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, ObjectKey, Resource, ResourceList, Storage,
    UpdateOptions, UpdatedObjectInfo, ValidateObjectFn, ValidateUpdateFn,
};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

/// A type-safe handle on a running `MemoryStore`.
///
/// * **Cloneable** – holds only a sender, so cloning is inexpensive.
/// * **Read-then-swap** – updates and deletes read the current object, run validation and
///   update resolution locally, then ask the actor to swap only if the version is unchanged.
#[derive(Clone)]
pub struct MemoryStoreClient<T: Resource> {
    name: String,
    sender: mpsc::Sender<StoreRequest<T>>,
}

impl<T: Resource> MemoryStoreClient<T> {
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<StoreRequest<T>>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn request<R>(
        &self,
        ctx: &RequestContext,
        make: impl FnOnce(Response<R>) -> StoreRequest<T> + Send,
    ) -> Result<R, StorageError>
    where
        R: Send,
    {
        let round_trip = async {
            let (respond_to, response) = oneshot::channel();
            self.sender
                .send(make(respond_to))
                .await
                .map_err(|_| StorageError::Unavailable(format!("store {} is closed", self.name)))?;
            response
                .await
                .map_err(|_| StorageError::Unavailable(format!("store {} dropped the response", self.name)))?
        };
        ctx.run(round_trip)
            .await
            .map_err(|interrupt| StorageError::Unavailable(format!("store {}: {}", self.name, interrupt)))?
    }

    async fn fetch(&self, ctx: &RequestContext, key: &ObjectKey) -> Result<Option<T>, StorageError> {
        let key = key.clone();
        match self.request(ctx, |respond_to| StoreRequest::Get { key, respond_to }).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove(
        &self,
        ctx: &RequestContext,
        current: &T,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
    ) -> Result<T, StorageError> {
        if let Some(preconditions) = &opts.preconditions {
            preconditions.check(current)?;
        }
        if let Some(validate) = validate {
            validate(current)?;
        }
        let key = current.key();
        let expected_version = current.resource_version().to_string();
        let dry_run = opts.dry_run;
        self.request(ctx, |respond_to| StoreRequest::Delete {
            key,
            expected_version,
            dry_run,
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl<T: Resource> Storage<T> for MemoryStoreClient<T> {
    type Error = StorageError;

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: T,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &CreateOptions,
    ) -> Result<T, StorageError> {
        if let Some(validate) = validate {
            validate(&obj)?;
        }
        let dry_run = opts.dry_run;
        self.request(ctx, |respond_to| StoreRequest::Create {
            obj,
            dry_run,
            respond_to,
        })
        .await
    }

    async fn get(&self, ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> Result<T, StorageError> {
        let key = key.clone();
        self.request(ctx, |respond_to| StoreRequest::Get { key, respond_to }).await
    }

    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> Result<ResourceList<T>, StorageError> {
        let opts = opts.clone();
        self.request(ctx, |respond_to| StoreRequest::List { opts, respond_to }).await
    }

    #[instrument(skip_all, fields(store = %self.name, %key))]
    async fn update(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        info: &dyn UpdatedObjectInfo<T>,
        validate_create: Option<&ValidateObjectFn<T>>,
        validate_update: Option<&ValidateUpdateFn<T>>,
        force_allow_create: bool,
        opts: &UpdateOptions,
    ) -> Result<(T, bool), StorageError> {
        let current = self.fetch(ctx, key).await?;

        let (obj, expected_version) = match current {
            Some(old) => {
                if let Some(preconditions) = info.preconditions() {
                    preconditions.check(&old)?;
                }
                let obj = info.updated_object(Some(&old))?;
                if obj.key() != *key {
                    return Err(StorageError::Invalid(
                        format!("object key {} does not match {}", obj.key(), key).into(),
                    ));
                }
                if !obj.resource_version().is_empty() && obj.resource_version() != old.resource_version() {
                    return Err(StorageError::Conflict {
                        kind: T::KIND,
                        key: key.to_string(),
                        reason: format!(
                            "the object has been modified: update is based on version {}, stored version {}",
                            obj.resource_version(),
                            old.resource_version()
                        ),
                    });
                }
                if let Some(validate) = validate_update {
                    validate(&obj, &old)?;
                }
                (obj, Some(old.resource_version().to_string()))
            }
            None => {
                if !force_allow_create {
                    return Err(StorageError::NotFound {
                        kind: T::KIND,
                        key: key.to_string(),
                    });
                }
                let mut obj = info.updated_object(None)?;
                if obj.key() != *key {
                    return Err(StorageError::Invalid(
                        format!("object key {} does not match {}", obj.key(), key).into(),
                    ));
                }
                if let Some(validate) = validate_create {
                    validate(&obj)?;
                }
                obj.metadata_mut().resource_version.clear();
                (obj, None)
            }
        };

        let created = expected_version.is_none();
        debug!(created, "Resolved update");
        let key = key.clone();
        let dry_run = opts.dry_run;
        let stored = self
            .request(ctx, |respond_to| StoreRequest::Put {
                key,
                obj,
                expected_version,
                dry_run,
                respond_to,
            })
            .await?;
        Ok((stored, created))
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
    ) -> Result<(T, bool), StorageError> {
        let current = self.fetch(ctx, key).await?.ok_or_else(|| StorageError::NotFound {
            kind: T::KIND,
            key: key.to_string(),
        })?;
        let removed = self.remove(ctx, &current, validate, opts).await?;
        Ok((removed, true))
    }

    #[instrument(skip_all, fields(store = %self.name))]
    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<ResourceList<T>, StorageError> {
        let listed = self.list(ctx, list_opts).await?;
        let mut deleted = Vec::with_capacity(listed.items.len());
        for item in &listed.items {
            match self.remove(ctx, item, validate, opts).await {
                Ok(obj) => deleted.push(obj),
                // Gone since the listing.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        debug!(matched = listed.items.len(), deleted = deleted.len(), "Deleted collection");
        Ok(ResourceList {
            items: deleted,
            resource_version: listed.resource_version,
            continue_token: listed.continue_token,
        })
    }
}
