//! Storage contract and the in-memory backend.
//!
//! # Main Components
//!
//! - [`Resource`] - Trait that stored object types implement
//! - [`Storage`] - The CRUD contract every store (and the dual writer) implements
//! - [`MemoryStore`] - Actor-backed in-memory store, with [`MemoryStoreClient`] as its handle
//! - [`StorageError`] - Errors reported by a single store
//!
//! # Testing
//!
//! See [`mock`] for a spy that counts, orders and perturbs store calls.

pub mod actor;
pub mod client;
pub mod error;
pub mod message;
pub mod mock;
pub mod resource;

pub use actor::MemoryStore;
pub use client::MemoryStoreClient;
pub use error::{StorageError, ValidationError};
pub use message::StoreRequest;
pub use resource::{
    CreateOptions, DeleteOptions, DynStorage, GetOptions, ListOptions, ObjectKey, ObjectMeta, OperationKind,
    Preconditions, ReplaceObject, Resource, ResourceList, Storage, UpdateFn, UpdateOptions, UpdatedObjectInfo,
    ValidateObjectFn, ValidateUpdateFn,
};
