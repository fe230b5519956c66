// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::common::{Condition, LastOperation, NameReference};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Registers an existing shoot as a seed by installing a gardenlet into it.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "seedmanagement.gardener.cloud", version = "v1alpha1", kind = "ManagedSeed")]
#[kube(namespaced)]
#[kube(status = "ManagedSeedStatus")]
#[serde(rename_all = "camelCase")]
pub struct ManagedSeedSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shoot: Option<NameReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gardenlet: Option<GardenletSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GardenletSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<Bootstrap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_with_parent: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum Bootstrap {
    BootstrapToken,
    ServiceAccount,
    None,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSeedStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ManagedSeed {
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn shoot_name(&self) -> Option<&str> {
        self.spec.shoot.as_ref().map(|s| s.name.as_str())
    }

    /// Parent configuration is merged in unless explicitly disabled
    pub fn merge_with_parent(&self) -> bool {
        self.spec
            .gardenlet
            .as_ref()
            .and_then(|g| g.merge_with_parent)
            .unwrap_or(true)
    }

    pub fn bootstrap(&self) -> Bootstrap {
        self.spec
            .gardenlet
            .as_ref()
            .and_then(|g| g.bootstrap)
            .unwrap_or(Bootstrap::BootstrapToken)
    }
}

/// The subset of a Shoot needed to follow a ManagedSeed to its seed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "Shoot")]
#[kube(namespaced)]
#[kube(status = "ShootStatus")]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
}

impl Shoot {
    /// The seed currently responsible for this shoot. During a control plane
    /// migration the status still names the source seed until it completes.
    pub fn responsible_seed_name(&self) -> Option<&str> {
        let spec_seed = self.spec.seed_name.as_deref();
        let status_seed = self.status.as_ref().and_then(|s| s.seed_name.as_deref());
        match (spec_seed, status_seed) {
            (_, None) => spec_seed,
            (Some(spec), Some(status)) if spec != status => Some(status),
            _ => spec_seed,
        }
    }

    /// True once the shoot finished at least one reconciliation
    pub fn is_reconciled(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.last_operation.as_ref())
            .is_some_and(|op| op.is_succeeded())
    }
}
