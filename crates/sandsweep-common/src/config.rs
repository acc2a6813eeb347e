//! Configuration loading and validation
//!
//! The config document selects regions, composes per-layer resource-type
//! targets and excludes, names filter presets, and pins which account the
//! run is allowed to touch. Structural problems abort before any scan.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use garde::Validate;
use serde::Deserialize;
use thiserror::Error;

use crate::collection::Collection;
use crate::feature_flags::FeatureFlags;
use crate::filter::Filter;

/// Sentinel account id carrying defaults for accounts without their own entry.
pub const DEFAULT_ACCOUNT: &str = "__default__";

/// Errors that make the configuration unusable for the resolved account.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("account {0} is blocklisted, refusing to run")]
    BlocklistedAccount(String),

    #[error("account {0} is not listed in the accounts section")]
    UnknownAccount(String),

    #[error("account {id} has none of the expected aliases [{expected}]")]
    AliasMismatch { id: String, expected: String },

    #[error("account {account} references unknown preset {preset:?}")]
    UnknownPreset { account: String, preset: String },

    #[error("accounts section contains a blank account id")]
    BlankAccountId,
}

/// Targets and excludes for one configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceTypeSelection {
    #[serde(default)]
    pub targets: Collection,
    #[serde(default)]
    pub excludes: Collection,
}

/// A named, reusable set of filter rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<Filter>>,
}

/// Per-account configuration block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountSettings {
    /// When non-empty, the live account must carry at least one of these.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Presets whose filters apply to this account.
    #[serde(default)]
    pub presets: Vec<String>,
    #[serde(default)]
    pub resource_types: ResourceTypeSelection,
    /// Kind name to filter rules.
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<Filter>>,
}

/// The full configuration document.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Regions to scan, in order. May include the `global` pseudo-region.
    #[garde(length(min = 1), inner(length(min = 1)))]
    pub regions: Vec<String>,

    /// Accounts this tool must never touch, checked before anything else.
    #[serde(default)]
    #[garde(skip)]
    pub account_blocklist: Vec<String>,

    /// Global targets/excludes layer.
    #[serde(default)]
    #[garde(skip)]
    pub resource_types: ResourceTypeSelection,

    #[serde(default)]
    #[garde(skip)]
    pub feature_flags: FeatureFlags,

    #[serde(default)]
    #[garde(skip)]
    pub presets: BTreeMap<String, Preset>,

    /// Account id (or `__default__`) to per-account settings.
    #[serde(default)]
    #[garde(skip)]
    pub accounts: BTreeMap<String, AccountSettings>,
}

impl Config {
    /// Load and validate a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .map_err(|e| anyhow!("Config validation failed: {e}"))?;
        config.check_references()?;
        Ok(config)
    }

    /// Cross-field checks garde cannot express.
    pub fn check_references(&self) -> Result<(), ConfigError> {
        for (account, settings) in &self.accounts {
            if account.trim().is_empty() {
                return Err(ConfigError::BlankAccountId);
            }
            for preset in &settings.presets {
                if !self.presets.contains_key(preset) {
                    return Err(ConfigError::UnknownPreset {
                        account: account.clone(),
                        preset: preset.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Abort unless the live account is one this configuration allows.
    pub fn validate_account(&self, id: &str, aliases: &[String]) -> Result<(), ConfigError> {
        if self.account_blocklist.iter().any(|b| b == id) {
            return Err(ConfigError::BlocklistedAccount(id.to_string()));
        }

        let Some(settings) = self.account_settings(id) else {
            return Err(ConfigError::UnknownAccount(id.to_string()));
        };

        if !settings.aliases.is_empty()
            && !settings.aliases.iter().any(|expected| aliases.contains(expected))
        {
            return Err(ConfigError::AliasMismatch {
                id: id.to_string(),
                expected: settings.aliases.join(", "),
            });
        }

        Ok(())
    }

    /// The account's settings block, falling back to `__default__`.
    pub fn account_settings(&self, id: &str) -> Option<&AccountSettings> {
        self.accounts
            .get(id)
            .or_else(|| self.accounts.get(DEFAULT_ACCOUNT))
    }

    /// The per-account targets/excludes layer.
    pub fn resource_types_for(&self, id: &str) -> ResourceTypeSelection {
        self.account_settings(id)
            .map(|s| s.resource_types.clone())
            .unwrap_or_default()
    }

    /// Effective filter rules for an account: referenced presets first, then
    /// the account's own rules, merged per kind.
    pub fn filters(&self, id: &str) -> Result<BTreeMap<String, Vec<Filter>>, ConfigError> {
        let Some(settings) = self.account_settings(id) else {
            return Ok(BTreeMap::new());
        };

        let mut merged: BTreeMap<String, Vec<Filter>> = BTreeMap::new();
        for preset in &settings.presets {
            let Some(preset_block) = self.presets.get(preset) else {
                return Err(ConfigError::UnknownPreset {
                    account: id.to_string(),
                    preset: preset.clone(),
                });
            };
            for (kind, rules) in &preset_block.filters {
                merged.entry(kind.clone()).or_default().extend(rules.iter().cloned());
            }
        }
        for (kind, rules) in &settings.filters {
            merged.entry(kind.clone()).or_default().extend(rules.iter().cloned());
        }
        Ok(merged)
    }
}
