//! Resource types migrated by this crate.

mod feature;

pub use feature::{Feature, FeatureSpec};
