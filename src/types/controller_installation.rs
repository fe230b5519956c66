// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::common::{Condition, NameReference};
use kube::api::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Binds one ControllerRegistration to one Seed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "ControllerInstallation")]
#[kube(status = "ControllerInstallationStatus")]
#[serde(rename_all = "camelCase")]
pub struct ControllerInstallationSpec {
    pub registration_ref: NameReference,
    pub seed_ref: NameReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_ref: Option<NameReference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerInstallationStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ControllerInstallation {
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "ControllerRegistration")]
#[serde(rename_all = "camelCase")]
pub struct ControllerRegistrationSpec {
    #[serde(default)]
    pub resources: Vec<ControllerResource>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerResource {
    pub kind: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// Deployment information for an extension. Unlike most gardener types it
/// carries its payload at the top level instead of under `spec`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerDeployment {
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Value>,
}

impl k8s_openapi::Resource for ControllerDeployment {
    const API_VERSION: &'static str = "core.gardener.cloud/v1beta1";
    const GROUP: &'static str = "core.gardener.cloud";
    const KIND: &'static str = "ControllerDeployment";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "controllerdeployments";
    type Scope = k8s_openapi::ClusterResourceScope;
}

impl k8s_openapi::Metadata for ControllerDeployment {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "Seed")]
#[kube(status = "SeedStatus")]
#[serde(rename_all = "camelCase")]
pub struct SeedSpec {
    pub provider: SeedProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<SeedIngress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<SeedTaint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedProvider {
    #[serde(rename = "type")]
    pub type_: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedIngress {
    pub domain: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedTaint {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
}

impl Seed {
    pub fn cluster_identity(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.cluster_identity.as_deref())
    }
}
