//! # Store Messages
//!
//! Messages exchanged between a [`MemoryStoreClient`](crate::storage::MemoryStoreClient)
//! and its [`MemoryStore`](crate::storage::MemoryStore) actor.

use crate::storage::error::StorageError;
use crate::storage::resource::{ListOptions, ObjectKey, Resource, ResourceList};
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, StorageError>>;

/// Requests processed by the store actor, one at a time.
///
/// Validation and update resolution happen on the client side, before a request is
/// sent; the actor only performs the compare-and-swap. That keeps caller closures out of
/// the channel and makes every request a single atomic step on the actor's state.
///
/// - **Create**: insert a new object; fails if the key is taken.
/// - **Get**: read one object.
/// - **List**: read a filtered, paginated slice.
/// - **Put**: replace or insert an object, guarded by the version the caller read.
/// - **Delete**: remove an object, guarded by the version the caller read.
#[derive(Debug)]
pub enum StoreRequest<T: Resource> {
    Create {
        obj: T,
        dry_run: bool,
        respond_to: Response<T>,
    },
    Get {
        key: ObjectKey,
        respond_to: Response<T>,
    },
    List {
        opts: ListOptions,
        respond_to: Response<ResourceList<T>>,
    },
    Put {
        key: ObjectKey,
        obj: T,
        /// Version the caller based its change on; `None` means the key must be absent.
        expected_version: Option<String>,
        dry_run: bool,
        respond_to: Response<T>,
    },
    Delete {
        key: ObjectKey,
        expected_version: String,
        dry_run: bool,
        respond_to: Response<T>,
    },
}
