//! # Dual Writer Demo
//!
//! Walks a feature flag definition through every migration mode:
//! 1.  Loads [`Config`] (or defaults) and starts the [`MigrationSystem`].
//! 2.  In each mode, creates, reads, lists and patches a `Feature`.
//! 3.  Deletes the last feature and shuts down.

use anyhow::{Context, Result};
use clap::Parser;
use dual_writer::config::Config;
use dual_writer::dualwriter::{DualWriter, Mode};
use dual_writer::lifecycle::{setup_tracing, MigrationSystem};
use dual_writer::model::{Feature, FeatureSpec};
use dual_writer::storage::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, ObjectKey, Resource, Storage, UpdateFn, UpdateOptions,
};
use std::path::PathBuf;
use tracing::{error, info, Instrument};

#[derive(Parser)]
#[command(name = "dual-writer")]
#[command(about = "Walk a resource through a live legacy-to-new storage migration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start in this mode instead of the configured one (0-4)
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Default log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(mode) = args.mode {
        config.migration.mode = mode;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    setup_tracing(&config.logging.level);
    info!(mode = %config.migration.mode, "Starting migration demo");

    let system = MigrationSystem::<Feature>::new(&config);
    let writer = system.writer();

    let mut current = config.migration.mode;
    let mut last: Option<ObjectKey> = None;
    loop {
        system.set_mode(current);
        let span = tracing::info_span!("mode", mode = %current);
        match exercise(&writer, &system, current).instrument(span).await {
            Ok(key) => last = Some(key),
            Err(e) => error!(mode = %current, error = %e, "Mode walk failed"),
        }
        match current.next() {
            Some(next) => current = next,
            None => break,
        }
    }

    if let Some(key) = last {
        let ctx = system.request_context();
        match writer.delete(&ctx, &key, None, &DeleteOptions::default()).await {
            Ok((deleted, _)) => info!(key = %deleted.key(), "Feature deleted"),
            Err(e) => error!(%key, error = %e, "Delete failed"),
        }
    }

    drop(writer);
    system.shutdown().await.map_err(anyhow::Error::msg)?;

    info!("Demo completed successfully");
    Ok(())
}

/// Runs one create/get/list/update round in `mode`; returns the feature's key.
async fn exercise(writer: &DualWriter<Feature>, system: &MigrationSystem<Feature>, mode: Mode) -> Result<ObjectKey> {
    let ctx = system.request_context();

    let feature = Feature::new("default", format!("demo-flag-{}", mode.as_u8())).with_spec(FeatureSpec {
        description: format!("Created while running in {}", mode),
        stage: "experimental".to_string(),
        owner: "@storage-team".to_string(),
        ..Default::default()
    });

    let created = writer.create(&ctx, feature, None, &CreateOptions::default()).await?;
    let key = created.key();
    info!(%key, uid = %created.metadata.uid, rv = %created.resource_version(), "Feature created");

    let fetched = writer.get(&ctx, &key, &GetOptions::default()).await?;
    info!(%key, rv = %fetched.resource_version(), "Feature fetched");

    let listed = writer.list(&ctx, &ListOptions::in_namespace("default")).await?;
    info!(count = listed.items.len(), "Features listed");

    let promote = UpdateFn::patch(|f: &mut Feature| f.spec.stage = "preview".to_string());
    let (updated, _) = writer
        .update(&ctx, &key, &promote, None, None, false, &UpdateOptions::default())
        .await?;
    info!(%key, stage = %updated.spec.stage, rv = %updated.resource_version(), "Feature promoted");

    Ok(key)
}
