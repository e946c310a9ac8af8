//! # Spy Storage & Testing Guide
//!
//! `SpyStorage<T>` wraps any [`Storage`] and records every call it sees before
//! delegating. Two spies can share one [`CallLog`], which gives tests the exact
//! cross-store call order of a dual write.
//!
//! ## What a spy can do
//!
//! | Need | API |
//! |------|-----|
//! | Count calls | `spy.counts("LegacyStorage.Create")` |
//! | Cross-store order | `log.calls()` |
//! | Inject a store failure | `spy.expect(OperationKind::Create).return_err(e)` |
//! | Slow a call down | `spy.expect(OperationKind::Get).delay(d).pass_through()` |
//! | Act between calls | `spy.expect(OperationKind::Create).after(f).pass_through()` |
//!
//! Expectations are consumed in order, one per call of that operation. Calls with no
//! queued expectation are passed straight through.
//!
//! ```rust
//! use dual_writer::context::RequestContext;
//! use dual_writer::model::Feature;
//! use dual_writer::storage::mock::{CallLog, SpyStorage};
//! use dual_writer::storage::{CreateOptions, MemoryStore, OperationKind, Storage, StorageError};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = MemoryStore::<Feature>::new("legacy", 10);
//!     tokio::spawn(actor.run());
//!
//!     let log = CallLog::default();
//!     let spy = SpyStorage::new("LegacyStorage", Arc::new(client), log.clone());
//!     spy.expect(OperationKind::Create)
//!         .return_err(StorageError::Unavailable("disk on fire".into()));
//!
//!     let ctx = RequestContext::background();
//!     let result = spy
//!         .create(&ctx, Feature::new("default", "a"), None, &CreateOptions::default())
//!         .await;
//!
//!     assert!(matches!(result, Err(StorageError::Unavailable(_))));
//!     assert_eq!(spy.counts("LegacyStorage.Create"), 1);
//!     spy.verify();
//! }
//! ```

use crate::context::RequestContext;
use crate::storage::error::StorageError;
use crate::storage::resource::{
    CreateOptions, DeleteOptions, DynStorage, GetOptions, ListOptions, ObjectKey, OperationKind, Resource,
    ResourceList, Storage, UpdateOptions, UpdatedObjectInfo, ValidateObjectFn, ValidateUpdateFn,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Ordered record of calls, shareable between spies.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    /// All calls so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// What a spy does for one intercepted call.
#[derive(Default)]
struct Expectation {
    delay: Option<Duration>,
    after: Option<Hook>,
    error: Option<StorageError>,
}

type Expectations = Arc<Mutex<HashMap<OperationKind, VecDeque<Expectation>>>>;

/// A `Storage` decorator that records and optionally perturbs calls.
pub struct SpyStorage<T: Resource> {
    prefix: String,
    inner: DynStorage<T>,
    log: CallLog,
    expectations: Expectations,
}

impl<T: Resource> SpyStorage<T> {
    /// Wraps `inner`; calls are recorded as `"{prefix}.{Operation}"`.
    pub fn new(prefix: impl Into<String>, inner: DynStorage<T>, log: CallLog) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
            log,
            expectations: Arc::default(),
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Number of recorded calls named `call` (e.g. `"Storage.Get"`).
    pub fn counts(&self, call: &str) -> usize {
        self.log.count(call)
    }

    /// Queues behaviour for the next not-yet-expected call of `operation`.
    pub fn expect(&self, operation: OperationKind) -> ExpectationBuilder {
        ExpectationBuilder {
            operation,
            expectation: Expectation::default(),
            expectations: self.expectations.clone(),
        }
    }

    /// Panics if queued expectations were never consumed.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining: usize = exps.values().map(VecDeque::len).sum();
        if remaining > 0 {
            panic!("{}: not all expectations were met. {} remaining", self.prefix, remaining);
        }
    }

    fn next_expectation(&self, operation: OperationKind) -> Expectation {
        self.expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default()
    }

    async fn intercept<R>(
        &self,
        operation: OperationKind,
        call: impl Future<Output = Result<R, StorageError>> + Send,
    ) -> Result<R, StorageError> {
        self.log.record(format!("{}.{}", self.prefix, operation));
        let expectation = self.next_expectation(operation);

        if let Some(delay) = expectation.delay {
            tokio::time::sleep(delay).await;
        }
        let result = match expectation.error {
            Some(error) => Err(error),
            None => call.await,
        };
        if let Some(after) = expectation.after {
            after();
        }
        result
    }
}

/// Fluent builder returned by [`SpyStorage::expect`].
#[must_use = "an expectation is only queued by `pass_through` or `return_err`"]
pub struct ExpectationBuilder {
    operation: OperationKind,
    expectation: Expectation,
    expectations: Expectations,
}

impl ExpectationBuilder {
    /// Sleeps before handling the call.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.expectation.delay = Some(delay);
        self
    }

    /// Runs `hook` once the call has been handled, before its result is returned.
    pub fn after(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.expectation.after = Some(Arc::new(hook));
        self
    }

    /// Delegates the call to the wrapped store.
    pub fn pass_through(self) {
        self.queue();
    }

    /// Fails the call with `error` without touching the wrapped store.
    pub fn return_err(mut self, error: StorageError) {
        self.expectation.error = Some(error);
        self.queue();
    }

    fn queue(self) {
        self.expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.operation)
            .or_default()
            .push_back(self.expectation);
    }
}

#[async_trait]
impl<T: Resource> Storage<T> for SpyStorage<T> {
    type Error = StorageError;

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: T,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &CreateOptions,
    ) -> Result<T, StorageError> {
        self.intercept(OperationKind::Create, self.inner.create(ctx, obj, validate, opts))
            .await
    }

    async fn get(&self, ctx: &RequestContext, key: &ObjectKey, opts: &GetOptions) -> Result<T, StorageError> {
        self.intercept(OperationKind::Get, self.inner.get(ctx, key, opts)).await
    }

    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> Result<ResourceList<T>, StorageError> {
        self.intercept(OperationKind::List, self.inner.list(ctx, opts)).await
    }

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
        self.intercept(
            OperationKind::Update,
            self.inner
                .update(ctx, key, info, validate_create, validate_update, force_allow_create, opts),
        )
        .await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
    ) -> Result<(T, bool), StorageError> {
        self.intercept(OperationKind::Delete, self.inner.delete(ctx, key, validate, opts))
            .await
    }

    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<ResourceList<T>, StorageError> {
        self.intercept(
            OperationKind::DeleteCollection,
            self.inner.delete_collection(ctx, validate, opts, list_opts),
        )
        .await
    }
}
