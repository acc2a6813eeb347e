//! Global feature flags delivered to resource adapters
//!
//! Flags are read from the configuration once and handed to every scanned
//! resource that opts into receiving them. They are read-only for the rest
//! of the run.

use serde::Deserialize;

/// Global switches that adjust adapter behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeatureFlags {
    #[serde(default)]
    pub disable_deletion_protection: DisableDeletionProtection,
}

/// Per-kind switches to clear provider deletion protection before removal.
///
/// Keys match the resource kind names used in `resource-types`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DisableDeletionProtection {
    #[serde(rename = "EC2Instance", default)]
    pub ec2_instance: bool,
}
