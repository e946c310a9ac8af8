//! # Dual Writer
//!
//! `DualWriter` presents one [`Storage`] while fanning each call out to a legacy and a
//! new store, as dictated by the active [`Mode`] and the [`ModePolicy`] table.
//!
//! ## How a call runs
//!
//! 1. The mode is snapshotted once; the call never observes a mode change midway.
//! 2. The policy yields a [`Decision`] for `(mode, operation)`.
//! 3. Reads go to the decision's primary store only. Writes run through one routine
//!    that calls one or two stores, in order, one after the other.
//! 4. The two outcomes are folded into one result or one [`DualWriteError`].
//!
//! ## Failure handling
//!
//! Nothing is retried and nothing is rolled back. When the first store committed and
//! the second failed, the caller gets [`DualWriteError::PartialWrite`] and an `error`
//! event is logged for reconciliation. A context that is done before the second call
//! stops the operation there and reports what had been committed.

mod error;
mod mode;
mod policy;
mod update;

pub use error::DualWriteError;
pub use mode::{Mode, UnknownMode};
pub use policy::{CallOrder, Decision, ModePolicy, PolicyError, SecondaryFailure, StoreKind};

use crate::context::{Interrupt, RequestContext};
use crate::storage::{
    CreateOptions, DeleteOptions, DynStorage, GetOptions, ListOptions, ObjectKey, OperationKind, Resource,
    ResourceList, Storage, StorageError, UpdateOptions, UpdatedObjectInfo, ValidateObjectFn, ValidateUpdateFn,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use update::ResolvedUpdate;

/// Why a single delegate call did not produce a value.
enum CallFailure {
    Store(StorageError),
    Interrupted(Interrupt),
}

async fn invoke<R>(
    ctx: &RequestContext,
    call: impl Future<Output = Result<R, StorageError>>,
) -> Result<R, CallFailure> {
    match ctx.run(call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallFailure::Store(e)),
        Err(interrupt) => Err(CallFailure::Interrupted(interrupt)),
    }
}

/// A single read made before any write; nothing can have been committed.
async fn call_one<R>(
    ctx: &RequestContext,
    store: StoreKind,
    call: impl Future<Output = Result<R, StorageError>>,
) -> Result<R, DualWriteError> {
    match invoke(ctx, call).await {
        Ok(value) => Ok(value),
        Err(CallFailure::Store(e)) => Err(DualWriteError::from_store(store, e)),
        Err(CallFailure::Interrupted(reason)) => Err(DualWriteError::Interrupted {
            reason,
            committed: None,
            interrupted: Some(store),
        }),
    }
}

/// Orchestrates a legacy and a new store behind one `Storage` interface.
///
/// Holds no per-request state: the stores are shared handles, the policy is immutable
/// and the mode is read through a `watch` channel. Clones share everything.
///
/// ```rust
/// use dual_writer::context::RequestContext;
/// use dual_writer::dualwriter::{DualWriter, Mode};
/// use dual_writer::model::Feature;
/// use dual_writer::storage::{CreateOptions, GetOptions, MemoryStore, Resource, Storage};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let (legacy, legacy_client) = MemoryStore::<Feature>::new("legacy", 10);
///     let (unified, unified_client) = MemoryStore::<Feature>::new("unified", 10);
///     tokio::spawn(legacy.run());
///     tokio::spawn(unified.run());
///
///     let writer = DualWriter::new(Arc::new(legacy_client), Arc::new(unified_client), Mode::Mode3);
///     let ctx = RequestContext::background();
///
///     let created = writer
///         .create(&ctx, Feature::new("default", "dark-mode"), None, &CreateOptions::default())
///         .await
///         .unwrap();
///     let fetched = writer.get(&ctx, &created.key(), &GetOptions::default()).await.unwrap();
///     assert_eq!(created, fetched);
/// }
/// ```
#[derive(Clone)]
pub struct DualWriter<T: Resource> {
    legacy: DynStorage<T>,
    new: DynStorage<T>,
    policy: Arc<ModePolicy>,
    mode: watch::Receiver<Mode>,
}

impl<T: Resource> DualWriter<T> {
    /// A writer pinned to `mode`, using the standard policy.
    pub fn new(legacy: DynStorage<T>, new: DynStorage<T>, mode: Mode) -> Self {
        let (_, receiver) = watch::channel(mode);
        Self::with_mode_source(legacy, new, receiver)
    }

    /// A writer following a reconfigurable mode, using the standard policy.
    pub fn with_mode_source(legacy: DynStorage<T>, new: DynStorage<T>, mode: watch::Receiver<Mode>) -> Self {
        Self {
            legacy,
            new,
            policy: Arc::new(ModePolicy::standard()),
            mode,
        }
    }

    /// Replaces the policy table.
    pub fn with_policy(mut self, policy: ModePolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// The mode new operations will run under.
    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    pub fn policy(&self) -> &ModePolicy {
        &self.policy
    }

    fn store(&self, kind: StoreKind) -> &DynStorage<T> {
        match kind {
            StoreKind::Legacy => &self.legacy,
            StoreKind::New => &self.new,
        }
    }

    fn decide(&self, operation: OperationKind) -> Result<(Mode, Decision), DualWriteError> {
        let mode = self.mode();
        let decision = self.policy.decide(mode, operation)?;
        Ok((mode, decision))
    }

    /// Runs a read against the primary store only.
    async fn read<R, F, Fut>(&self, ctx: &RequestContext, operation: OperationKind, call: F) -> Result<R, DualWriteError>
    where
        F: FnOnce(StoreKind) -> Fut + Send,
        Fut: Future<Output = Result<R, StorageError>> + Send,
        R: Send,
    {
        let (mode, decision) = self.decide(operation)?;
        let store = decision.primary;
        debug!(%mode, %operation, %store, "Read");

        match invoke(ctx, call(store)).await {
            Ok(value) => Ok(value),
            Err(CallFailure::Store(e)) => {
                debug!(%mode, %operation, %store, error = %e, "Read failed");
                Err(DualWriteError::from_store(store, e))
            }
            Err(CallFailure::Interrupted(reason)) => Err(DualWriteError::Interrupted {
                reason,
                committed: None,
                interrupted: Some(store),
            }),
        }
    }

    /// Runs a write against the decision's stores, in order.
    ///
    /// `call` receives the store to call and, for the second call, the first store's
    /// result. The returned value is the primary store's result.
    async fn write<R, F, Fut>(
        &self,
        ctx: &RequestContext,
        operation: OperationKind,
        mode: Mode,
        decision: Decision,
        mut call: F,
    ) -> Result<R, DualWriteError>
    where
        F: FnMut(StoreKind, Option<&R>) -> Fut + Send,
        Fut: Future<Output = Result<R, StorageError>> + Send,
        R: Send,
    {
        let sequence = decision.call_sequence();
        let first = sequence[0];
        debug!(%mode, %operation, stores = ?sequence, "Write");

        let first_value = match invoke(ctx, call(first, None)).await {
            Ok(value) => Some(value),
            // The store may still have applied the write; `interrupted` marks it unknown.
            Err(CallFailure::Interrupted(reason)) => {
                return Err(DualWriteError::Interrupted {
                    reason,
                    committed: None,
                    interrupted: Some(first),
                })
            }
            Err(CallFailure::Store(e)) if decision.tolerates(first) => {
                warn!(%mode, %operation, store = %first, error = %e, "Tolerated store failure; stores may diverge");
                None
            }
            Err(CallFailure::Store(e)) => return Err(DualWriteError::from_store(first, e)),
        };

        let Some(&second) = sequence.get(1) else {
            // Single-store decisions never tolerate their only store.
            return first_value.ok_or_else(|| DualWriteError::Store {
                store: first,
                source: StorageError::Internal("single-store write produced no result".to_string()),
            });
        };

        let committed = first_value.as_ref().map(|_| first);
        if let Some(reason) = ctx.err() {
            warn!(%mode, %operation, ?committed, skipped = %second, %reason, "Context done before second write");
            return Err(DualWriteError::Interrupted {
                reason,
                committed,
                interrupted: None,
            });
        }

        match invoke(ctx, call(second, first_value.as_ref())).await {
            Ok(second_value) => {
                info!(%mode, %operation, stores = ?sequence, "Write committed");
                match first_value {
                    Some(value) if first == decision.primary => Ok(value),
                    _ => Ok(second_value),
                }
            }
            Err(CallFailure::Interrupted(reason)) => {
                warn!(%mode, %operation, ?committed, interrupted = %second, %reason, "Second write interrupted");
                Err(DualWriteError::Interrupted {
                    reason,
                    committed,
                    interrupted: Some(second),
                })
            }
            Err(CallFailure::Store(e)) => match first_value {
                Some(value) if decision.tolerates(second) => {
                    warn!(%mode, %operation, store = %second, error = %e, "Tolerated store failure; stores may diverge");
                    Ok(value)
                }
                Some(_) => {
                    error!(
                        %mode,
                        %operation,
                        succeeded = %first,
                        failed = %second,
                        error = %e,
                        "Partial write; stores have diverged and need reconciliation"
                    );
                    Err(DualWriteError::PartialWrite {
                        succeeded: first,
                        failed: second,
                        source: e,
                    })
                }
                None => Err(DualWriteError::from_store(second, e)),
            },
        }
    }

    /// Reads the current primary copy for update resolution and delete preconditions;
    /// `None` when absent.
    async fn read_basis(
        &self,
        ctx: &RequestContext,
        store: StoreKind,
        key: &ObjectKey,
    ) -> Result<Option<T>, DualWriteError> {
        match call_one(ctx, store, self.store(store).get(ctx, key, &GetOptions::default())).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<T: Resource> Storage<T> for DualWriter<T> {
    type Error = DualWriteError;

    /// Validation runs once, before any store is touched. The store called second
    /// receives the first store's object (minus its version) so store-assigned
    /// identity matches on both sides.
    #[instrument(skip_all, fields(kind = T::KIND, key = %obj.key()))]
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: T,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &CreateOptions,
    ) -> Result<T, DualWriteError> {
        let (mode, decision) = self.decide(OperationKind::Create)?;
        if let Some(validate) = validate {
            validate(&obj)?;
        }
        debug!(?obj, "Create");

        self.write(ctx, OperationKind::Create, mode, decision, move |store, first: Option<&T>| {
            let obj = match first {
                Some(created) => {
                    let mut copy = created.clone();
                    copy.metadata_mut().resource_version.clear();
                    copy
                }
                None => obj.clone(),
            };
            async move { self.store(store).create(ctx, obj, None, opts).await }
        })
        .await
    }

    #[instrument(skip_all, fields(kind = T::KIND, %key))]
    async fn get(&self, ctx: &RequestContext, key: &ObjectKey, opts: &GetOptions) -> Result<T, DualWriteError> {
        self.read(ctx, OperationKind::Get, move |store| async move {
            self.store(store).get(ctx, key, opts).await
        })
        .await
    }

    #[instrument(skip_all, fields(kind = T::KIND))]
    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> Result<ResourceList<T>, DualWriteError> {
        self.read(ctx, OperationKind::List, move |store| async move {
            self.store(store).list(ctx, opts).await
        })
        .await
    }

    /// Dual decisions resolve `info` once against the primary store's current copy and
    /// apply that one object to both stores. The primary copy is guarded by the version
    /// it was resolved against; the other copy is rebased onto its own version.
    #[instrument(skip_all, fields(kind = T::KIND, %key))]
    async fn update(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        info: &dyn UpdatedObjectInfo<T>,
        validate_create: Option<&ValidateObjectFn<T>>,
        validate_update: Option<&ValidateUpdateFn<T>>,
        force_allow_create: bool,
        opts: &UpdateOptions,
    ) -> Result<(T, bool), DualWriteError> {
        let (mode, decision) = self.decide(OperationKind::Update)?;

        if !decision.is_dual() {
            return self
                .write(ctx, OperationKind::Update, mode, decision, move |store, _: Option<&(T, bool)>| async move {
                    self.store(store)
                        .update(ctx, key, info, validate_create, validate_update, force_allow_create, opts)
                        .await
                })
                .await;
        }

        let primary = decision.primary;
        let basis = self.read_basis(ctx, primary, key).await?;
        if basis.is_none() && !force_allow_create {
            return Err(DualWriteError::from_store(
                primary,
                StorageError::NotFound {
                    kind: T::KIND,
                    key: key.to_string(),
                },
            ));
        }
        if let (Some(preconditions), Some(old)) = (info.preconditions(), &basis) {
            preconditions
                .check(old)
                .map_err(|e| DualWriteError::from_store(primary, e))?;
        }

        let resolved = info.updated_object(basis.as_ref())?;
        match &basis {
            Some(old) => {
                if !resolved.resource_version().is_empty() && resolved.resource_version() != old.resource_version() {
                    return Err(DualWriteError::Conflict {
                        store: primary,
                        source: StorageError::Conflict {
                            kind: T::KIND,
                            key: key.to_string(),
                            reason: format!(
                                "the object has been modified: update is based on version {}, stored version {}",
                                resolved.resource_version(),
                                old.resource_version()
                            ),
                        },
                    });
                }
                if let Some(validate) = validate_update {
                    validate(&resolved, old)?;
                }
            }
            None => {
                if let Some(validate) = validate_create {
                    validate(&resolved)?;
                }
            }
        }

        let basis_version = basis.as_ref().map(|old| old.resource_version().to_string());
        debug!(?resolved, ?basis_version, "Resolved update");

        self.write(ctx, OperationKind::Update, mode, decision, move |store, _: Option<&(T, bool)>| {
            let update = if store == primary {
                ResolvedUpdate::guarded(resolved.clone(), basis_version.clone())
            } else {
                ResolvedUpdate::rebased(resolved.clone())
            };
            async move {
                self.store(store)
                    .update(ctx, key, &update, None, None, force_allow_create, opts)
                    .await
            }
        })
        .await
    }

    /// Validation is handed to the first store only. Deletion preconditions refer to the
    /// primary store, whose versions the caller reads: dual deletes check them against
    /// the primary copy before either store is written, and the primary store checks
    /// them again when it is called.
    #[instrument(skip_all, fields(kind = T::KIND, %key))]
    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
    ) -> Result<(T, bool), DualWriteError> {
        let (mode, decision) = self.decide(OperationKind::Delete)?;
        if let (true, Some(preconditions)) = (decision.is_dual(), &opts.preconditions) {
            // The non-primary store may be called first and never sees the preconditions.
            let primary = decision.primary;
            let current = self.read_basis(ctx, primary, key).await?.ok_or_else(|| {
                DualWriteError::from_store(
                    primary,
                    StorageError::NotFound {
                        kind: T::KIND,
                        key: key.to_string(),
                    },
                )
            })?;
            preconditions
                .check(&current)
                .map_err(|e| DualWriteError::from_store(primary, e))?;
        }
        let mut pending_validation = validate;

        self.write(ctx, OperationKind::Delete, mode, decision, move |store, _: Option<&(T, bool)>| {
            let validate = pending_validation.take();
            let opts = options_for(store, &decision, opts);
            async move { self.store(store).delete(ctx, key, validate, &opts).await }
        })
        .await
    }

    #[instrument(skip_all, fields(kind = T::KIND))]
    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        validate: Option<&ValidateObjectFn<T>>,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<ResourceList<T>, DualWriteError> {
        let (mode, decision) = self.decide(OperationKind::DeleteCollection)?;
        if let (true, Some(preconditions)) = (decision.is_dual(), &opts.preconditions) {
            let primary = decision.primary;
            let matched = call_one(ctx, primary, self.store(primary).list(ctx, list_opts)).await?;
            for item in &matched.items {
                preconditions
                    .check(item)
                    .map_err(|e| DualWriteError::from_store(primary, e))?;
            }
        }
        let mut pending_validation = validate;

        self.write(
            ctx,
            OperationKind::DeleteCollection,
            mode,
            decision,
            move |store, _: Option<&ResourceList<T>>| {
                let validate = pending_validation.take();
                let opts = options_for(store, &decision, opts);
                async move {
                    self.store(store)
                        .delete_collection(ctx, validate, &opts, list_opts)
                        .await
                }
            },
        )
        .await
    }
}

/// Drops deletion preconditions for the non-primary store; they name primary versions.
fn options_for(store: StoreKind, decision: &Decision, opts: &DeleteOptions) -> DeleteOptions {
    if store == decision.primary {
        opts.clone()
    } else {
        DeleteOptions {
            preconditions: None,
            ..opts.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Feature;
    use crate::storage::mock::{CallLog, SpyStorage};
    use crate::storage::{MemoryStore, ValidationError};

    struct Harness {
        writer: DualWriter<Feature>,
        legacy: Arc<SpyStorage<Feature>>,
        new: Arc<SpyStorage<Feature>>,
        log: CallLog,
    }

    fn harness(mode: Mode) -> Harness {
        let (legacy_actor, legacy_client) = MemoryStore::<Feature>::new("legacy", 10);
        let (new_actor, new_client) = MemoryStore::<Feature>::new("unified", 10);
        tokio::spawn(legacy_actor.run());
        tokio::spawn(new_actor.run());

        let log = CallLog::default();
        let legacy = Arc::new(SpyStorage::new("LegacyStorage", Arc::new(legacy_client), log.clone()));
        let new = Arc::new(SpyStorage::new("Storage", Arc::new(new_client), log.clone()));
        let writer = DualWriter::new(legacy.clone(), new.clone(), mode);
        Harness { writer, legacy, new, log }
    }

    #[tokio::test]
    async fn test_create_copies_identity_to_second_store() {
        let h = harness(Mode::Mode2);
        let ctx = RequestContext::background();

        let created = h
            .writer
            .create(&ctx, Feature::new("default", "a"), None, &CreateOptions::default())
            .await
            .unwrap();

        let in_new = h.new.get(&ctx, &created.key(), &GetOptions::default()).await.unwrap();
        assert_eq!(in_new.metadata.uid, created.metadata.uid);
        assert_eq!(created.metadata.uid, "legacy-00000001");
    }

    #[tokio::test]
    async fn test_validation_runs_before_any_store() {
        let h = harness(Mode::Mode3);
        let ctx = RequestContext::background();
        fn reject(_: &Feature) -> Result<(), ValidationError> {
            Err(ValidationError::new("no"))
        }

        let result = h
            .writer
            .create(&ctx, Feature::new("default", "a"), Some(&reject), &CreateOptions::default())
            .await;

        assert!(matches!(result, Err(DualWriteError::Validation(_))));
        assert!(h.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_store_failure_skips_second() {
        let h = harness(Mode::Mode3);
        let ctx = RequestContext::background();
        h.legacy
            .expect(OperationKind::Create)
            .return_err(StorageError::Unavailable("down".into()));

        let result = h
            .writer
            .create(&ctx, Feature::new("default", "a"), None, &CreateOptions::default())
            .await;

        assert_eq!(
            result,
            Err(DualWriteError::Store {
                store: StoreKind::Legacy,
                source: StorageError::Unavailable("down".into()),
            })
        );
        assert_eq!(h.new.counts("Storage.Create"), 0);
    }

    #[tokio::test]
    async fn test_unmapped_policy_touches_no_store() {
        let h = harness(Mode::Mode2);
        let policy = ModePolicy::from_entries([(
            (Mode::Mode2, OperationKind::Get),
            Decision::single(StoreKind::Legacy),
        )])
        .unwrap();
        let writer = h.writer.clone().with_policy(policy);
        let ctx = RequestContext::background();

        let result = writer
            .create(&ctx, Feature::new("default", "a"), None, &CreateOptions::default())
            .await;

        assert!(matches!(
            result,
            Err(DualWriteError::Policy(PolicyError::Unmapped { .. }))
        ));
        assert!(h.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_validates_once() {
        let h = harness(Mode::Mode3);
        let ctx = RequestContext::background();
        let created = h
            .writer
            .create(&ctx, Feature::new("default", "a"), None, &CreateOptions::default())
            .await
            .unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let validate = move |_: &Feature| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<(), ValidationError>(())
        };

        let (deleted, done) = h
            .writer
            .delete(&ctx, &created.key(), Some(&validate), &DeleteOptions::default())
            .await
            .unwrap();

        assert!(done);
        assert_eq!(deleted.metadata.name, "a");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(h.legacy.counts("LegacyStorage.Delete"), 1);
        assert_eq!(h.new.counts("Storage.Delete"), 1);
    }
}
