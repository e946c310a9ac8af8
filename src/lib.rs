//! # Dual Writer
//!
//! > **Live storage migration behind one storage interface.**
//!
//! This crate moves a resource type from a legacy store to a new store without downtime.
//! Callers talk to one [`Storage`](storage::Storage); a [`DualWriter`](dualwriter::DualWriter)
//! behind it decides, per operation and per migration mode, which store serves reads and
//! which stores receive writes.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One contract, two delegates
//! The legacy store, the new store and the dual writer all implement the same
//! [`Storage`](storage::Storage) trait. The writer never knows what kind of store it
//! is talking to.
//!
//! ### Behaviour from a table
//! Everything that differs between modes (read store, write stores, write order, what a
//! secondary failure means) comes from a [`ModePolicy`](dualwriter::ModePolicy) lookup.
//! Adding a mode is a table change, not a new code path.
//!
//! ### Failures are reported, not repaired
//! The writer never retries and never rolls back. A write that reached one store but not
//! the other surfaces as [`DualWriteError::PartialWrite`](dualwriter::DualWriteError::PartialWrite)
//! and is logged at `error` for reconciliation.
//!
//! ## 🚀 Migration Modes
//!
//! | Mode | Reads | Writes |
//! |---|---|---|
//! | `Mode0` | legacy | legacy |
//! | `Mode1` | legacy | legacy, then new (new may fail) |
//! | `Mode2` | legacy | legacy, then new |
//! | `Mode3` | new | legacy, then new |
//! | `Mode4` | new | new |
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Contract ([`storage`])
//! - **Role**: The `Storage` trait, resource metadata, options, and the actor-backed
//!   in-memory store used as both legacy and new backend.
//! - **Key items**: [`Storage`](storage::Storage), [`MemoryStore`](storage::MemoryStore),
//!   [`SpyStorage`](storage::mock::SpyStorage).
//!
//! ### 2. The Orchestrator ([`dualwriter`])
//! - **Role**: Mode, policy table, and the routing/aggregation logic.
//! - **Key items**: [`DualWriter`](dualwriter::DualWriter), [`Mode`](dualwriter::Mode),
//!   [`DualWriteError`](dualwriter::DualWriteError).
//!
//! ### 3. Request Scope ([`context`])
//! - **Role**: Cancellation and deadlines carried by every call.
//!
//! ### 4. Runtime ([`lifecycle`], [`config`])
//! - **Role**: Spawns the stores, owns the mode switch, loads TOML configuration and
//!   sets up tracing.
//!
//! ### 5. Sample Resource ([`model`])
//! - **Role**: [`Feature`](model::Feature), a feature-flag definition used by the demo
//!   and the tests.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Walk a feature flag through every mode
//! RUST_LOG=info cargo run
//!
//! # Start from a config file, forcing mode 2
//! cargo run -- --config migration.toml --mode 2
//! ```

pub mod config;
pub mod context;
pub mod dualwriter;
pub mod lifecycle;
pub mod model;
pub mod storage;
