use crate::config::Config;
use crate::context::RequestContext;
use crate::dualwriter::{DualWriter, Mode, ModePolicy, PolicyError};
use crate::storage::{MemoryStore, Resource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Runtime owner of a migration: both stores, the mode switch and the writer.
///
/// # Example
///
/// ```ignore
/// let system = MigrationSystem::<Feature>::new(&config);
/// let writer = system.writer();
///
/// writer.create(&system.request_context(), feature, None, &CreateOptions::default()).await?;
/// system.set_mode(Mode::Mode3);
///
/// drop(writer);
/// system.shutdown().await?;
/// ```
pub struct MigrationSystem<T: Resource> {
    writer: DualWriter<T>,
    mode: watch::Sender<Mode>,
    request_timeout: Option<Duration>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl<T: Resource> MigrationSystem<T> {
    /// Spawns the `legacy` and `unified` store actors and builds the writer with the
    /// standard policy.
    pub fn new(config: &Config) -> Self {
        let (legacy_actor, legacy_client) = MemoryStore::<T>::new("legacy", config.storage.legacy_buffer);
        let (unified_actor, unified_client) = MemoryStore::<T>::new("unified", config.storage.unified_buffer);

        let legacy_handle = tokio::spawn(legacy_actor.run());
        let unified_handle = tokio::spawn(unified_actor.run());

        let (mode, receiver) = watch::channel(config.migration.mode);
        let writer = DualWriter::with_mode_source(Arc::new(legacy_client), Arc::new(unified_client), receiver);

        info!(mode = %config.migration.mode, kind = T::KIND, "Migration system started");
        Self {
            writer,
            mode,
            request_timeout: config.request_timeout(),
            handles: vec![legacy_handle, unified_handle],
        }
    }

    /// Replaces the policy table. Fails if the table leaves any pair unmapped.
    pub fn with_policy(mut self, policy: ModePolicy) -> Result<Self, PolicyError> {
        policy.ensure_total()?;
        self.writer = self.writer.with_policy(policy);
        Ok(self)
    }

    /// A handle on the shared writer.
    pub fn writer(&self) -> DualWriter<T> {
        self.writer.clone()
    }

    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    /// Publishes `mode` to every writer. Returns the previous mode.
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = self.mode.send_replace(mode);
        if mode > previous {
            info!(from = %previous, to = %mode, "Migration mode advanced");
        } else if mode < previous {
            warn!(from = %previous, to = %mode, "Migration mode rolled back");
        }
        previous
    }

    /// A fresh context carrying the configured request timeout.
    pub fn request_context(&self) -> RequestContext {
        let ctx = RequestContext::background();
        match self.request_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    /// Drops the writer and waits for both store actors to exit.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down migration system...");

        drop(self.writer);
        drop(self.mode);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Store task failed: {:?}", e);
                return Err(format!("Store task failed: {:?}", e));
            }
        }

        info!("Migration system shutdown complete.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Feature;

    #[tokio::test]
    async fn test_set_mode_reaches_existing_writers() {
        let system = MigrationSystem::<Feature>::new(&Config::default());
        let writer = system.writer();
        assert_eq!(writer.mode(), Mode::Mode0);

        assert_eq!(system.set_mode(Mode::Mode2), Mode::Mode0);
        assert_eq!(writer.mode(), Mode::Mode2);
        assert_eq!(system.mode(), Mode::Mode2);

        drop(writer);
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_policy_rejected() {
        use crate::dualwriter::{Decision, StoreKind};
        use crate::storage::OperationKind;

        let partial = ModePolicy::from_entries([(
            (Mode::Mode0, OperationKind::Get),
            Decision::single(StoreKind::Legacy),
        )])
        .unwrap();
        let result = MigrationSystem::<Feature>::new(&Config::default()).with_policy(partial);
        assert!(matches!(result, Err(PolicyError::Unmapped { .. })));
    }

    #[tokio::test]
    async fn test_request_context_carries_timeout() {
        let mut config = Config::default();
        config.migration.request_timeout_ms = Some(500);
        let system = MigrationSystem::<Feature>::new(&config);

        assert!(system.request_context().deadline().is_some());
        system.shutdown().await.unwrap();
    }
}
