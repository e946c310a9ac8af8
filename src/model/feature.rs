//! Feature flag definitions.
//!
//! # Storage
//! [`Feature`] implements the [`Resource`](crate::storage::Resource) trait, so it can be
//! kept by any [`Storage`](crate::storage::Storage) and migrated by the
//! [`DualWriter`](crate::dualwriter::DualWriter).

use crate::storage::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};

/// A feature in development: what it is, not whether it is on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FeatureSpec,
}

/// Static properties of a feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    pub description: String,
    /// Stability level (e.g. `experimental`, `GA`).
    pub stage: String,
    /// The team that owns the feature.
    #[serde(rename = "codeowner", default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    /// Enabled by default for versions at or above this one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enabled_version: String,
    #[serde(default)]
    pub requires_dev_mode: bool,
    #[serde(rename = "frontend", default)]
    pub frontend_only: bool,
    #[serde(default)]
    pub requires_restart: bool,
    #[serde(default)]
    pub allow_self_serve: bool,
    #[serde(default)]
    pub hide_from_admin_page: bool,
    #[serde(default)]
    pub hide_from_docs: bool,
}

impl Feature {
    /// Creates an unversioned feature with an empty spec.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: FeatureSpec::default(),
        }
    }

    pub fn with_spec(mut self, spec: FeatureSpec) -> Self {
        self.spec = spec;
        self
    }
}

impl Resource for Feature {
    const KIND: &'static str = "Feature";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
