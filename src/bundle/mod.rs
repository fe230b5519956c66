// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bundles of manifests applied through a ManagedResource and its data secret

pub mod health;

use crate::error::Result;
use crate::kubernetes::patch::create_or_merge_patch;
use crate::kubernetes::store::{DeleteOutcome, ObjectStore};
use crate::types::{ManagedResource, ManagedResourceSpec, NameReference, ObjectKey};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Everything needed to install one bundle.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub keep_objects: bool,
    pub class: Option<String>,
    pub data: BTreeMap<String, ByteString>,
}

pub fn secret_name(bundle_name: &str) -> String {
    format!("managedresource-{}", bundle_name)
}

/// Upserts the data secret and then the ManagedResource pointing at it.
#[instrument(skip(store, bundle), fields(bundle = %format!("{}/{}", bundle.namespace, bundle.name)))]
pub async fn create<S: ObjectStore>(store: &S, bundle: &Bundle) -> Result<()> {
    let secret_name = secret_name(&bundle.name);

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.clone()),
            namespace: Some(bundle.namespace.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    let (secret_result, _) = create_or_merge_patch(store, secret, |s: &mut Secret| {
        s.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(bundle.labels.clone());
        s.type_ = Some("Opaque".to_string());
        s.data = Some(bundle.data.clone());
        Ok(())
    })
    .await?;
    debug!("Bundle secret {}: {:?}", secret_name, secret_result);

    let managed_resource = ManagedResource {
        metadata: ObjectMeta {
            name: Some(bundle.name.clone()),
            namespace: Some(bundle.namespace.clone()),
            ..Default::default()
        },
        spec: ManagedResourceSpec::default(),
        status: None,
    };
    let (result, _) = create_or_merge_patch(store, managed_resource, |mr: &mut ManagedResource| {
        mr.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(bundle.labels.clone());
        mr.spec.class = bundle.class.clone();
        mr.spec.secret_refs = vec![NameReference {
            name: secret_name.clone(),
        }];
        mr.spec.keep_objects = Some(bundle.keep_objects);
        Ok(())
    })
    .await?;

    info!("Bundle {}/{} applied: {:?}", bundle.namespace, bundle.name, result);
    Ok(())
}

/// Issues the delete of a ManagedResource. Returns `true` while it may still
/// exist, so callers wait for a later pass to confirm it is gone.
#[instrument(skip(store))]
pub async fn delete<S: ObjectStore>(store: &S, namespace: &str, name: &str) -> Result<bool> {
    let outcome = store
        .delete::<ManagedResource>(&ObjectKey::namespaced(namespace, name))
        .await?;
    Ok(outcome != DeleteOutcome::NotFound)
}

#[instrument(skip(store))]
pub async fn delete_secret<S: ObjectStore>(store: &S, namespace: &str, name: &str) -> Result<()> {
    store
        .delete::<Secret>(&ObjectKey::namespaced(namespace, &secret_name(name)))
        .await?;
    Ok(())
}
