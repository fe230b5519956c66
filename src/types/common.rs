// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status and reference types shared by all gardener resources

use chrono::{DateTime, Utc};
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A named health signal. Conditions of one object are unique by `type`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum LastOperationType {
    Create,
    Reconcile,
    Delete,
    Migrate,
    Restore,
}

impl fmt::Display for LastOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LastOperationType::Create => "Create",
            LastOperationType::Reconcile => "Reconcile",
            LastOperationType::Delete => "Delete",
            LastOperationType::Migrate => "Migrate",
            LastOperationType::Restore => "Restore",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum LastOperationState {
    Pending,
    Processing,
    Succeeded,
    Error,
    Failed,
    Aborted,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    #[serde(rename = "type")]
    pub type_: LastOperationType,
    pub state: LastOperationState,
    pub progress: i32,
    #[serde(default)]
    pub description: String,
    pub last_update_time: DateTime<Utc>,
}

impl LastOperation {
    pub fn is_succeeded(&self) -> bool {
        self.state == LastOperationState::Succeeded
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl SecretReference {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(&self.namespace, &self.name)
    }
}

/// Reference to another object by name only.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NameReference {
    pub name: String,
}

/// Identifies an object within one cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn cluster_scoped(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl<K: Resource> From<&kube::runtime::reflector::ObjectRef<K>> for ObjectKey {
    fn from(r: &kube::runtime::reflector::ObjectRef<K>) -> Self {
        Self {
            namespace: r.namespace.clone(),
            name: r.name.clone(),
        }
    }
}

/// The cluster an object lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClusterRole {
    Garden,
    Seed,
    Shoot,
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterRole::Garden => "garden",
            ClusterRole::Seed => "seed",
            ClusterRole::Shoot => "shoot",
        };
        f.write_str(s)
    }
}

/// Identifies an object across clusters; unique per (cluster, namespace, name).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub cluster: ClusterRole,
    pub key: ObjectKey,
}

impl ResourceRef {
    pub fn new(cluster: ClusterRole, key: ObjectKey) -> Self {
        Self { cluster, key }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cluster, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::namespaced("garden", "s1").to_string(), "garden/s1");
        assert_eq!(ObjectKey::cluster_scoped("bucket").to_string(), "bucket");
    }

    #[test]
    fn test_object_key_of_object() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("creds".to_string()),
                namespace: Some("garden-dev".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(ObjectKey::of(&secret), ObjectKey::namespaced("garden-dev", "creds"));
    }

    #[test]
    fn test_resource_ref_display() {
        let r = ResourceRef::new(ClusterRole::Seed, ObjectKey::namespaced("garden", "bucket-a"));
        assert_eq!(r.to_string(), "seed:garden/bucket-a");
    }

    #[test]
    fn test_condition_serializes_gardener_shape() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let cond = Condition {
            type_: "Installed".to_string(),
            status: ConditionStatus::True,
            reason: "InstallationSuccessful".to_string(),
            message: "ok".to_string(),
            last_transition_time: ts,
            last_update_time: ts,
            codes: vec![],
        };

        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Installed");
        assert_eq!(json["status"], "True");
        assert!(json.get("codes").is_none());

        let back: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(back, cond);
    }

    #[test]
    fn test_last_operation_parses_states() {
        let op: LastOperation = serde_json::from_value(serde_json::json!({
            "type": "Reconcile",
            "state": "Failed",
            "progress": 50,
            "description": "boom",
            "lastUpdateTime": "2026-01-02T03:04:05Z"
        }))
        .unwrap();

        assert_eq!(op.type_, LastOperationType::Reconcile);
        assert_eq!(op.state, LastOperationState::Failed);
        assert!(!op.is_succeeded());
    }
}
