// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Copying secrets between clusters: mirrors from the garden into a target
//! cluster, and reflections of generated secrets back into the garden.

use crate::constants::annotations;
use crate::error::{Result, SeedletError};
use crate::kubernetes::finalizers::remove_finalizer;
use crate::kubernetes::patch::{create_or_merge_patch, OperationResult};
use crate::kubernetes::store::{ObjectStore, StoreObject};
use crate::types::{ObjectKey, ResourceRef};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Annotations that describe the source object and must not travel with a copy
fn is_local_annotation(key: &str) -> bool {
    key == annotations::OPERATION
        || key == annotations::TIMESTAMP
        || key.starts_with("kubectl.kubernetes.io/")
}

/// Reads `source`, failing when it does not exist.
#[instrument(skip(store), fields(secret = %source))]
pub async fn read_source<S: ObjectStore>(store: &S, source: &ResourceRef) -> Result<Secret> {
    store
        .get::<Secret>(&source.key)
        .await?
        .ok_or_else(|| SeedletError::SecretSyncError(format!("source secret {} not found", source)))
}

/// Template of the copy of `source` at `target`, carrying its labels and
/// annotations minus the ones local to the source.
pub fn mirrored_secret(source: &Secret, target: &ObjectKey) -> Secret {
    let filtered_annotations = source.metadata.annotations.as_ref().map(|a| {
        a.iter()
            .filter(|(k, _)| !is_local_annotation(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });

    Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: target.namespace.clone(),
            labels: source.metadata.labels.clone(),
            annotations: filtered_annotations,
            ..Default::default()
        },
        data: source.data.clone(),
        type_: source.type_.clone(),
        ..Default::default()
    }
}

/// Upserts the copy of an already read `source` at `target`. Only the data
/// and metadata taken from the source are written; an unchanged copy causes
/// no write.
#[instrument(skip(store, source), fields(target = %target))]
pub async fn mirror_from<S: ObjectStore>(
    store: &S,
    source: &Secret,
    target: &ResourceRef,
) -> Result<OperationResult> {
    let desired = mirrored_secret(source, &target.key);
    let empty = Secret {
        metadata: ObjectMeta {
            name: desired.metadata.name.clone(),
            namespace: desired.metadata.namespace.clone(),
            ..Default::default()
        },
        ..Default::default()
    };

    let (result, _) = create_or_merge_patch(store, empty, |s: &mut Secret| {
        copy_into(s, &desired);
        Ok(())
    })
    .await?;

    if result != OperationResult::Unchanged {
        info!("Secret {} {:?}", target, result);
    }
    Ok(result)
}

fn copy_into(current: &mut Secret, desired: &Secret) {
    if let Some(labels) = &desired.metadata.labels {
        current
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
    if let Some(annotations) = &desired.metadata.annotations {
        current
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
    }
    // the type of an existing secret is immutable
    if current.metadata.resource_version.is_none() {
        current.type_ = desired.type_.clone();
    }
    current.data = desired.data.clone();
}

/// Copies the secret `source` from one cluster into `target` on another.
/// Nothing is written when the source cannot be read.
pub async fn mirror_secret<F, T>(
    from: &F,
    source: &ResourceRef,
    to: &T,
    target: &ResourceRef,
) -> Result<OperationResult>
where
    F: ObjectStore,
    T: ObjectStore,
{
    let secret = read_source(from, source).await?;
    mirror_from(to, &secret, target).await
}

/// Mirrors a secret generated in another cluster back as `target`, owned by
/// `owner` for garbage collection and held by `finalizer` until released
/// with [`release_secret`].
#[instrument(skip(from, to, owner), fields(source = %generated, target = %target))]
pub async fn reflect_secret<F, T, O>(
    from: &F,
    generated: &ResourceRef,
    to: &T,
    target: &ResourceRef,
    owner: &O,
    finalizer: &str,
) -> Result<OperationResult>
where
    F: ObjectStore,
    T: ObjectStore,
    O: StoreObject,
{
    let source = read_source(from, generated).await?;
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        SeedletError::Precondition(format!(
            "owner {} of {} has no uid yet",
            ObjectKey::of(owner),
            target
        ))
    })?;

    let empty = Secret {
        metadata: ObjectMeta {
            name: Some(target.key.name.clone()),
            namespace: target.key.namespace.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    let (result, _) = create_or_merge_patch(to, empty, |s: &mut Secret| {
        s.metadata.owner_references = Some(vec![owner_ref]);
        let finalizers = s.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        s.data = source.data.clone();
        Ok(())
    })
    .await?;

    debug!("Reflected secret {}: {:?}", target, result);
    Ok(result)
}

/// Drops `finalizer` from the secret at `key` and deletes it. A missing
/// secret counts as released.
#[instrument(skip(store))]
pub async fn release_secret<S: ObjectStore>(store: &S, key: &ObjectKey, finalizer: &str) -> Result<()> {
    if let Some(mut secret) = store.get::<Secret>(key).await? {
        remove_finalizer(store, &mut secret, finalizer).await?;
    }
    delete_secret(store, key).await
}

/// Deletes the secret at `key` if it exists.
pub async fn delete_secret<S: ObjectStore>(store: &S, key: &ObjectKey) -> Result<()> {
    let outcome = store.delete::<Secret>(key).await?;
    debug!("Deleting secret {}: {:?}", key, outcome);
    Ok(())
}
