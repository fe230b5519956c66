// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Extension resources living in the seed cluster

use super::common::{LastError, LastOperation, SecretReference};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Seed-side BackupBucket handled by a provider extension. The spec derives
/// `PartialEq` so the desired and observed specs can be compared field by field.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "extensions.gardener.cloud",
    version = "v1alpha1",
    kind = "BackupBucket",
    root = "ExtensionBackupBucket"
)]
#[kube(status = "ExtensionBackupBucketStatus")]
#[serde(rename_all = "camelCase")]
pub struct ExtensionBackupBucketSpec {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Value>,
    pub region: String,
    pub secret_ref: SecretReference,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionBackupBucketStatus {
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

impl ExtensionBackupBucket {
    pub fn last_operation(&self) -> Option<&LastOperation> {
        self.status.as_ref().and_then(|s| s.last_operation.as_ref())
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.status.as_ref().and_then(|s| s.last_error.as_ref())
    }
}
