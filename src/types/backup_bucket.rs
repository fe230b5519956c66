// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::common::{LastError, LastOperation, SecretReference};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// The garden-side BackupBucket that users and the scheduler create.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "BackupBucket")]
#[kube(status = "BackupBucketStatus")]
#[serde(rename_all = "camelCase")]
pub struct BackupBucketSpec {
    pub provider: BackupBucketProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Value>,
    pub secret_ref: SecretReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupBucketProvider {
    #[serde(rename = "type")]
    pub type_: String,
    pub region: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupBucketStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_secret_ref: Option<SecretReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<serde_json::Value>,
}

impl BackupBucket {
    /// Whether this bucket is assigned to the given seed
    pub fn is_scheduled_on(&self, seed_name: &str) -> bool {
        self.spec.seed_name.as_deref() == Some(seed_name)
    }

    pub fn last_operation(&self) -> Option<&LastOperation> {
        self.status.as_ref().and_then(|s| s.last_operation.as_ref())
    }
}
