//! # In-Memory Store Actor
//!
//! `MemoryStore` is a complete single-store backend: it owns its objects, assigns
//! resource versions and uids, and enforces optimistic concurrency. It runs as an
//! actor, processing [`StoreRequest`]s sequentially, so its state needs no locks.
//!
//! It stands in for either side of a migration in the demo binary and in tests.

use crate::storage::client::MemoryStoreClient;
use crate::storage::error::{StorageError, ValidationError};
use crate::storage::message::StoreRequest;
use crate::storage::resource::{ListOptions, ObjectKey, Resource, ResourceList};
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The actor half of an in-memory store.
///
/// # Usage Pattern
///
/// 1.  **Create**: `MemoryStore::new()` returns the actor and its client.
/// 2.  **Run**: spawn `actor.run()` on the runtime.
/// 3.  **Use**: hand the client (it implements [`Storage`](crate::storage::Storage)) to
///     whoever needs the store.
///
/// ```rust
/// use dual_writer::context::RequestContext;
/// use dual_writer::model::Feature;
/// use dual_writer::storage::{CreateOptions, GetOptions, MemoryStore, Resource, Storage};
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, client) = MemoryStore::<Feature>::new("legacy", 10);
///     tokio::spawn(actor.run());
///
///     let ctx = RequestContext::background();
///     let created = client
///         .create(&ctx, Feature::new("default", "dark-mode"), None, &CreateOptions::default())
///         .await
///         .unwrap();
///     let fetched = client.get(&ctx, &created.key(), &GetOptions::default()).await.unwrap();
///     assert_eq!(created, fetched);
/// }
/// ```
///
/// # Versioning
///
/// Every successful write bumps a store-wide counter; the new value becomes the
/// object's `resource_version`. A `Put` or `Delete` carrying a version that no longer
/// matches the stored object fails with [`StorageError::Conflict`].
pub struct MemoryStore<T: Resource> {
    name: String,
    receiver: mpsc::Receiver<StoreRequest<T>>,
    store: BTreeMap<ObjectKey, T>,
    next_version: u64,
    next_uid: u64,
}

impl<T: Resource> MemoryStore<T> {
    /// Creates the actor and its client.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in logs and generated uids (e.g. `"legacy"`).
    /// * `buffer_size` - Capacity of the request channel. When full, client calls wait.
    pub fn new(name: impl Into<String>, buffer_size: usize) -> (Self, MemoryStoreClient<T>) {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            name: name.clone(),
            receiver,
            store: BTreeMap::new(),
            next_version: 1,
            next_uid: 1,
        };
        (actor, MemoryStoreClient::new(name, sender))
    }

    /// Runs the event loop until every client has been dropped.
    pub async fn run(mut self) {
        let kind = T::KIND;
        let store = self.name.clone();
        info!(store = %store, kind, "Store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::Create {
                    obj,
                    dry_run,
                    respond_to,
                } => {
                    debug!(store = %store, kind, key = %obj.key(), "Create");
                    let result = self.create(obj, dry_run);
                    match &result {
                        Ok(obj) => info!(store = %store, kind, key = %obj.key(), rv = obj.resource_version(), dry_run, "Created"),
                        Err(e) => warn!(store = %store, kind, error = %e, "Create failed"),
                    }
                    let _ = respond_to.send(result);
                }
                StoreRequest::Get { key, respond_to } => {
                    let result = self.store.get(&key).cloned().ok_or_else(|| not_found::<T>(&key));
                    debug!(store = %store, kind, %key, found = result.is_ok(), "Get");
                    let _ = respond_to.send(result);
                }
                StoreRequest::List { opts, respond_to } => {
                    let result = self.list(&opts);
                    if let Ok(list) = &result {
                        debug!(store = %store, kind, items = list.items.len(), more = list.continue_token.is_some(), "List");
                    }
                    let _ = respond_to.send(result);
                }
                StoreRequest::Put {
                    key,
                    obj,
                    expected_version,
                    dry_run,
                    respond_to,
                } => {
                    debug!(store = %store, kind, %key, ?expected_version, "Put");
                    let result = self.put(&key, obj, expected_version, dry_run);
                    match &result {
                        Ok(obj) => info!(store = %store, kind, %key, rv = obj.resource_version(), dry_run, "Updated"),
                        Err(e) => warn!(store = %store, kind, %key, error = %e, "Update failed"),
                    }
                    let _ = respond_to.send(result);
                }
                StoreRequest::Delete {
                    key,
                    expected_version,
                    dry_run,
                    respond_to,
                } => {
                    debug!(store = %store, kind, %key, %expected_version, "Delete");
                    let result = self.delete(&key, &expected_version, dry_run);
                    match &result {
                        Ok(_) => info!(store = %store, kind, %key, size = self.store.len(), dry_run, "Deleted"),
                        Err(e) => warn!(store = %store, kind, %key, error = %e, "Delete failed"),
                    }
                    let _ = respond_to.send(result);
                }
            }
        }

        info!(store = %store, kind, size = self.store.len(), "Shutdown");
    }

    fn create(&mut self, mut obj: T, dry_run: bool) -> Result<T, StorageError> {
        let key = obj.key();
        if !obj.resource_version().is_empty() {
            return Err(ValidationError::new("resourceVersion must not be set on objects to be created").into());
        }
        if key.name.is_empty() {
            return Err(ValidationError::new("name is required").into());
        }
        if self.store.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                kind: T::KIND,
                key: key.to_string(),
            });
        }

        self.stamp_new(&mut obj);
        if !dry_run {
            self.store.insert(key, obj.clone());
        }
        Ok(obj)
    }

    fn put(
        &mut self,
        key: &ObjectKey,
        mut obj: T,
        expected_version: Option<String>,
        dry_run: bool,
    ) -> Result<T, StorageError> {
        let current = self.store.get(key).map(|c| {
            let meta = c.metadata();
            (meta.resource_version.clone(), meta.uid.clone(), meta.generation)
        });
        match (current, expected_version) {
            (Some((stored, uid, generation)), Some(expected)) => {
                if stored != expected {
                    return Err(StorageError::Conflict {
                        kind: T::KIND,
                        key: key.to_string(),
                        reason: format!(
                            "the object has been modified: expected version {}, stored version {}",
                            expected, stored
                        ),
                    });
                }
                let version = self.bump_version();
                let meta = obj.metadata_mut();
                meta.uid = uid;
                meta.generation = generation + 1;
                meta.resource_version = version;
            }
            (Some(_), None) => {
                return Err(StorageError::Conflict {
                    kind: T::KIND,
                    key: key.to_string(),
                    reason: "the object was created concurrently".to_string(),
                });
            }
            (None, Some(_)) => return Err(not_found::<T>(key)),
            (None, None) => self.stamp_new(&mut obj),
        }

        if !dry_run {
            self.store.insert(key.clone(), obj.clone());
        }
        Ok(obj)
    }

    fn delete(&mut self, key: &ObjectKey, expected_version: &str, dry_run: bool) -> Result<T, StorageError> {
        let current = self.store.get(key).ok_or_else(|| not_found::<T>(key))?;
        if current.resource_version() != expected_version {
            return Err(StorageError::Conflict {
                kind: T::KIND,
                key: key.to_string(),
                reason: format!(
                    "the object has been modified: expected version {}, stored version {}",
                    expected_version,
                    current.resource_version()
                ),
            });
        }
        if dry_run {
            return Ok(current.clone());
        }
        self.bump_version();
        self.store.remove(key).ok_or_else(|| not_found::<T>(key))
    }

    fn list(&self, opts: &ListOptions) -> Result<ResourceList<T>, StorageError> {
        let start = match &opts.continue_token {
            Some(token) => Bound::Excluded(decode_continue(token)?),
            None => Bound::Unbounded,
        };

        let mut items = Vec::new();
        let mut continue_token = None;
        for (_, obj) in self.store.range((start, Bound::Unbounded)) {
            if !opts.matches(obj) {
                continue;
            }
            if opts.limit > 0 && items.len() == opts.limit {
                continue_token = items.last().map(|last: &T| encode_continue(&last.key()));
                break;
            }
            items.push(obj.clone());
        }

        Ok(ResourceList {
            items,
            resource_version: (self.next_version - 1).to_string(),
            continue_token,
        })
    }

    fn stamp_new(&mut self, obj: &mut T) {
        if obj.metadata().uid.is_empty() {
            let uid = format!("{}-{:08}", self.name, self.next_uid);
            self.next_uid += 1;
            obj.metadata_mut().uid = uid;
        }
        let version = self.bump_version();
        let meta = obj.metadata_mut();
        meta.resource_version = version;
        meta.generation = 1;
    }

    fn bump_version(&mut self) -> String {
        let version = self.next_version;
        self.next_version += 1;
        version.to_string()
    }
}

fn not_found<T: Resource>(key: &ObjectKey) -> StorageError {
    StorageError::NotFound {
        kind: T::KIND,
        key: key.to_string(),
    }
}

fn encode_continue(key: &ObjectKey) -> String {
    format!("{}/{}", key.namespace, key.name)
}

fn decode_continue(token: &str) -> Result<ObjectKey, StorageError> {
    token
        .split_once('/')
        .map(|(ns, name)| ObjectKey::new(ns, name))
        .ok_or_else(|| ValidationError::new(format!("malformed continue token: {token}")).into())
}
