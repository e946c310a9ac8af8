//! # Mode Policy
//!
//! The single place where mode-dependent behaviour lives. Everything the dual writer
//! does differently between modes is read from a [`Decision`] looked up here; there is
//! no mode-conditional branching anywhere else.
//!
//! ## Standard table
//!
//! | Mode | Reads | Writes | Order | Secondary failure |
//! |---|---|---|---|---|
//! | Mode0 | Legacy | Legacy | n/a | n/a |
//! | Mode1 | Legacy | Legacy, New | Legacy first | Tolerate |
//! | Mode2 | Legacy | Legacy, New | Legacy first | Abort |
//! | Mode3 | New | Legacy, New | Legacy first | Abort |
//! | Mode4 | New | New | n/a | n/a |

use crate::dualwriter::mode::Mode;
use crate::storage::OperationKind;
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;

/// One of the two backing stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Legacy,
    New,
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Legacy => f.write_str("legacy"),
            StoreKind::New => f.write_str("new"),
        }
    }
}

/// Which store is called first in a dual write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrder {
    PrimaryFirst,
    SecondaryFirst,
}

/// What happens when the secondary store's call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryFailure {
    /// The operation fails.
    Abort,
    /// The failure is logged and the primary's outcome stands.
    Tolerate,
}

/// How one operation runs in one mode.
///
/// `primary` is the authoritative store: the only store read, and the store whose
/// result a write hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub primary: StoreKind,
    pub secondary: Option<StoreKind>,
    pub order: CallOrder,
    pub on_secondary_failure: SecondaryFailure,
}

impl Decision {
    pub const fn single(store: StoreKind) -> Self {
        Self {
            primary: store,
            secondary: None,
            order: CallOrder::PrimaryFirst,
            on_secondary_failure: SecondaryFailure::Abort,
        }
    }

    pub const fn dual(
        primary: StoreKind,
        secondary: StoreKind,
        order: CallOrder,
        on_secondary_failure: SecondaryFailure,
    ) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
            order,
            on_secondary_failure,
        }
    }

    pub fn is_dual(&self) -> bool {
        self.secondary.is_some()
    }

    /// Stores to call, in call order.
    pub fn call_sequence(&self) -> Vec<StoreKind> {
        match (self.secondary, self.order) {
            (None, _) => vec![self.primary],
            (Some(secondary), CallOrder::PrimaryFirst) => vec![self.primary, secondary],
            (Some(secondary), CallOrder::SecondaryFirst) => vec![secondary, self.primary],
        }
    }

    /// Whether a failure of `store` may be logged and ignored.
    pub fn tolerates(&self, store: StoreKind) -> bool {
        self.secondary == Some(store) && self.on_secondary_failure == SecondaryFailure::Tolerate
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("no policy for {operation} in {mode}")]
    Unmapped { mode: Mode, operation: OperationKind },

    #[error("invalid policy for {operation} in {mode}: {reason}")]
    Invalid {
        mode: Mode,
        operation: OperationKind,
        reason: String,
    },
}

const LEGACY_ONLY: Decision = Decision::single(StoreKind::Legacy);
const NEW_ONLY: Decision = Decision::single(StoreKind::New);
// The new write is awaited inline; a store error there is logged and dropped, but an
// interrupt during it is still reported.
const LEGACY_THEN_NEW_BEST_EFFORT: Decision = Decision::dual(
    StoreKind::Legacy,
    StoreKind::New,
    CallOrder::PrimaryFirst,
    SecondaryFailure::Tolerate,
);
const LEGACY_THEN_NEW: Decision = Decision::dual(
    StoreKind::Legacy,
    StoreKind::New,
    CallOrder::PrimaryFirst,
    SecondaryFailure::Abort,
);
// New is authoritative, but legacy is written first so the read store never holds a
// write the legacy store lacks.
const NEW_AFTER_LEGACY: Decision = Decision::dual(
    StoreKind::New,
    StoreKind::Legacy,
    CallOrder::SecondaryFirst,
    SecondaryFailure::Abort,
);

/// `(mode, reads, writes)`
const STANDARD: [(Mode, Decision, Decision); 5] = [
    (Mode::Mode0, LEGACY_ONLY, LEGACY_ONLY),
    (Mode::Mode1, LEGACY_ONLY, LEGACY_THEN_NEW_BEST_EFFORT),
    (Mode::Mode2, LEGACY_ONLY, LEGACY_THEN_NEW),
    (Mode::Mode3, NEW_ONLY, NEW_AFTER_LEGACY),
    (Mode::Mode4, NEW_ONLY, NEW_ONLY),
];

/// Lookup table from `(mode, operation)` to [`Decision`].
#[derive(Debug, Clone)]
pub struct ModePolicy {
    table: HashMap<(Mode, OperationKind), Decision>,
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl ModePolicy {
    /// The standard migration progression, total over every mode and operation.
    pub fn standard() -> Self {
        let table = STANDARD
            .iter()
            .flat_map(|&(mode, reads, writes)| {
                OperationKind::ALL.into_iter().map(move |op| {
                    let decision = if op.is_write() { writes } else { reads };
                    ((mode, op), decision)
                })
            })
            .collect();
        Self { table }
    }

    /// Builds a custom table. Each decision is checked; missing pairs are allowed and
    /// make [`decide`](Self::decide) fail for them.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ((Mode, OperationKind), Decision)>,
    ) -> Result<Self, PolicyError> {
        let mut table = HashMap::new();
        for ((mode, operation), decision) in entries {
            check(mode, operation, &decision)?;
            table.insert((mode, operation), decision);
        }
        Ok(Self { table })
    }

    pub fn decide(&self, mode: Mode, operation: OperationKind) -> Result<Decision, PolicyError> {
        self.table
            .get(&(mode, operation))
            .copied()
            .ok_or(PolicyError::Unmapped { mode, operation })
    }

    /// Pairs with no decision, in mode then operation order.
    pub fn missing(&self) -> Vec<(Mode, OperationKind)> {
        Mode::ALL
            .into_iter()
            .flat_map(|mode| OperationKind::ALL.into_iter().map(move |op| (mode, op)))
            .filter(|pair| !self.table.contains_key(pair))
            .collect()
    }

    /// Fails on the first unmapped pair.
    pub fn ensure_total(&self) -> Result<(), PolicyError> {
        match self.missing().first() {
            Some(&(mode, operation)) => Err(PolicyError::Unmapped { mode, operation }),
            None => Ok(()),
        }
    }
}

fn check(mode: Mode, operation: OperationKind, decision: &Decision) -> Result<(), PolicyError> {
    let invalid = |reason: &str| PolicyError::Invalid {
        mode,
        operation,
        reason: reason.to_string(),
    };
    if decision.secondary == Some(decision.primary) {
        return Err(invalid("secondary store must differ from primary"));
    }
    if !operation.is_write() && decision.is_dual() {
        return Err(invalid("reads are served by exactly one store"));
    }
    Ok(())
}
