//! # Observability & Tracing
//!
//! Compact, target-less log lines with structured fields. Every dual-writer event carries
//! `mode` and `operation`; store events carry `store` and `kind`.
//!
//! ```bash
//! # Writes and mode changes
//! RUST_LOG=info cargo run
//!
//! # Per-store calls and full payloads
//! RUST_LOG=debug cargo run
//!
//! # Divergence only
//! RUST_LOG=error cargo run
//! ```
//!
//! A partial write is always logged at `error` with `succeeded` and `failed` fields:
//!
//! ```text
//! ERROR create{kind="Feature" key=default/dark-mode}: Partial write; stores have diverged and need reconciliation mode=Mode2 operation=Create succeeded=legacy failed=new error=...
//! ```

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. from the config file) applies.
pub fn setup_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
