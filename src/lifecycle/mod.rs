//! # System Lifecycle
//!
//! Starts the two backing stores, wires them behind a [`DualWriter`](crate::dualwriter::DualWriter)
//! and owns the mode switch.
//!
//! ## Mode switching
//!
//! The mode lives in a `tokio::sync::watch` channel. [`MigrationSystem::set_mode`] publishes
//! a new value; every writer clone sees it on its next operation. An operation already in
//! flight keeps the mode it started with.
//!
//! ## Graceful Shutdown
//!
//! 1. **Drop the writer** - Releases the store clients held behind it
//! 2. **Actors detect closure** - `receiver.recv()` returns `None`
//! 3. **Await completion** - Wait for both store tasks to finish
//!
//! Writer clones handed out by [`MigrationSystem::writer`] hold store clients too; drop
//! them before calling [`MigrationSystem::shutdown`].
//!
//! ## Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging for the binary. See the [`tracing`]
//! module for the filter rules.

pub mod migration_system;
pub mod tracing;

pub use self::migration_system::*;
pub use self::tracing::*;
