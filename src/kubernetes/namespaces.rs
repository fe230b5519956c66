// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace management utilities

use super::patch::{create_or_merge_patch, OperationResult};
use super::store::ObjectStore;
use crate::error::Result;
use crate::types::ObjectKey;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Ensure a namespace exists and carries `labels` and `annotations`. Other
/// labels and annotations on an existing namespace are left alone.
#[instrument(skip(store, labels, annotations))]
pub async fn ensure_namespace<S: ObjectStore>(
    store: &S,
    name: &str,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Result<Namespace> {
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let (result, namespace) = create_or_merge_patch(store, ns, |ns: &mut Namespace| {
        if !labels.is_empty() {
            ns.metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .extend(labels.clone());
        }
        if !annotations.is_empty() {
            ns.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .extend(annotations.clone());
        }
        Ok(())
    })
    .await?;

    match result {
        OperationResult::Created => info!("Namespace {} created successfully", name),
        OperationResult::Updated => info!("Namespace {} updated", name),
        OperationResult::Unchanged => debug!("Namespace {} already exists", name),
    }
    Ok(namespace)
}

/// Issues the delete of a namespace. Returns `true` while it may still exist.
#[instrument(skip(store))]
pub async fn delete_namespace<S: ObjectStore>(store: &S, name: &str) -> Result<bool> {
    let outcome = store
        .delete::<Namespace>(&ObjectKey::cluster_scoped(name))
        .await?;
    Ok(outcome != super::store::DeleteOutcome::NotFound)
}
