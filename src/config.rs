// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use crate::constants::{GARDENLET_BOOTSTRAP_SECRET_NAME, GARDEN_NAMESPACE};
use crate::types::SecretReference;

static DURATION_PART: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|s|m|h|d)").ok());

/// Parses a Kubernetes style duration such as `30s`, `5m` or `1h30m`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }
    let re = DURATION_PART
        .as_ref()
        .ok_or_else(|| anyhow!("Failed to compile duration pattern"))?;

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in re.captures_iter(trimmed) {
        let (Some(whole), Some(number), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() != consumed {
            break;
        }
        consumed = whole.end();

        let number: u64 = number
            .as_str()
            .parse()
            .with_context(|| format!("Invalid duration number in '{}'", trimmed))?;
        total += match unit.as_str() {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number * 60),
            "h" => Duration::from_secs(number * 3600),
            _ => Duration::from_secs(number * 86400),
        };
    }

    if consumed != trimmed.len() {
        return Err(anyhow!(
            "Invalid duration format '{}'. Expected e.g. '30s', '5m' or '1h30m'",
            trimmed
        ));
    }
    Ok(total)
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Re-apply policy when the extension reports a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownstreamRetryPolicy {
    /// Re-apply when the extension reports `Failed`
    pub reapply_on_failed: bool,
    /// Re-apply when the extension reports `Error`
    pub reapply_on_error: bool,
}

impl Default for DownstreamRetryPolicy {
    fn default() -> Self {
        Self {
            reapply_on_failed: true,
            reapply_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorBackoffConfig {
    #[serde(deserialize_with = "duration")]
    pub initial: Duration,
    #[serde(deserialize_with = "duration")]
    pub max: Duration,
}

impl Default for ErrorBackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupBucketConfig {
    pub concurrent_syncs: u16,
    /// Wait between checks while the extension bucket is being deleted
    #[serde(deserialize_with = "duration")]
    pub deletion_requeue: Duration,
}

impl Default for BackupBucketConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: 20,
            deletion_requeue: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerInstallationConfig {
    pub concurrent_syncs: u16,
    #[serde(deserialize_with = "duration")]
    pub deletion_requeue: Duration,
}

impl Default for ControllerInstallationConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: 20,
            deletion_requeue: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerInstallationCareConfig {
    pub concurrent_syncs: u16,
    #[serde(deserialize_with = "duration")]
    pub sync_period: Duration,
    /// Short fixed retry while the bundle does not exist yet
    #[serde(deserialize_with = "duration")]
    pub not_found_requeue: Duration,
}

impl Default for ControllerInstallationCareConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: 20,
            sync_period: Duration::from_secs(30),
            not_found_requeue: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedSeedConfig {
    pub concurrent_syncs: u16,
    #[serde(deserialize_with = "duration")]
    pub sync_period: Duration,
    /// Requeue while waiting for the shoot or the seed registration
    #[serde(deserialize_with = "duration")]
    pub wait_sync_period: Duration,
    #[serde(deserialize_with = "duration")]
    pub sync_jitter_period: Duration,
    /// Also delay generation changes, not only resyncs
    pub jitter_updates: bool,
    /// Template file of the gardenlet chart
    pub chart_path: Option<String>,
    /// Garden secret holding the kubeconfig the new gardenlet bootstraps with
    pub bootstrap_kubeconfig_secret: SecretReference,
    /// Configuration of the gardenlet running this process, inherited by managed seeds
    pub parent_gardenlet_config: serde_json::Value,
    pub parent_gardenlet_deployment: serde_json::Value,
}

impl Default for ManagedSeedConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: 5,
            sync_period: Duration::from_secs(3600),
            wait_sync_period: Duration::from_secs(15),
            sync_jitter_period: Duration::from_secs(300),
            jitter_updates: false,
            chart_path: None,
            bootstrap_kubeconfig_secret: SecretReference {
                name: GARDENLET_BOOTSTRAP_SECRET_NAME.to_string(),
                namespace: GARDEN_NAMESPACE.to_string(),
            },
            parent_gardenlet_config: serde_json::Value::Null,
            parent_gardenlet_deployment: serde_json::Value::Null,
        }
    }
}

/// Operator configuration, read once at start-up and shared read-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Name of the seed this process is responsible for
    pub seed_name: String,
    /// Garden namespace holding ManagedSeeds and secrets
    pub garden_namespace: String,
    /// Kubeconfig file of the garden cluster; the default client is used when unset
    pub garden_kubeconfig: Option<String>,
    /// Identity of the garden cluster, handed to extension charts
    pub garden_cluster_identity: String,
    #[serde(deserialize_with = "duration")]
    pub reconcile_timeout: Duration,
    pub error_backoff: ErrorBackoffConfig,
    pub downstream_retry: DownstreamRetryPolicy,
    pub backup_bucket: BackupBucketConfig,
    pub controller_installation: ControllerInstallationConfig,
    pub controller_installation_care: ControllerInstallationCareConfig,
    pub managed_seed: ManagedSeedConfig,
    pub feature_gates: BTreeMap<String, bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_name: String::new(),
            garden_namespace: GARDEN_NAMESPACE.to_string(),
            garden_kubeconfig: None,
            garden_cluster_identity: String::new(),
            reconcile_timeout: Duration::from_secs(180),
            error_backoff: ErrorBackoffConfig::default(),
            downstream_retry: DownstreamRetryPolicy::default(),
            backup_bucket: BackupBucketConfig::default(),
            controller_installation: ControllerInstallationConfig::default(),
            controller_installation_care: ControllerInstallationCareConfig::default(),
            managed_seed: ManagedSeedConfig::default(),
            feature_gates: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from the optional `SEEDLET_CONFIG` file and the
    /// environment. `SEED_NAME` is required unless the file sets it.
    pub fn from_env() -> Result<Self> {
        let config = match env::var("SEEDLET_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_yaml(&raw)?
            }
            Err(_) => Config::default(),
        };
        config.with_overrides(|key| env::var(key).ok())
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse configuration")
    }

    /// Applies environment overrides read through `lookup` and validates.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(seed_name) = lookup("SEED_NAME") {
            self.seed_name = seed_name;
        }
        if let Some(namespace) = lookup("GARDEN_NAMESPACE") {
            self.garden_namespace = namespace;
        }
        if let Some(kubeconfig) = lookup("GARDEN_KUBECONFIG") {
            self.garden_kubeconfig = Some(kubeconfig);
        }
        if let Some(identity) = lookup("GARDEN_CLUSTER_IDENTITY") {
            self.garden_cluster_identity = identity;
        }

        if self.seed_name.is_empty() {
            return Err(anyhow!("SEED_NAME environment variable not set"));
        }
        Ok(self)
    }

    pub fn feature_enabled(&self, gate: &str) -> bool {
        self.feature_gates.get(gate).copied().unwrap_or(false)
    }
}
