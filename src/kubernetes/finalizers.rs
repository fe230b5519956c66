// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Finalizer add/remove with optimistic locking

use super::store::{ObjectStore, StoreObject};
use crate::error::Result;
use crate::types::ObjectKey;
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, instrument};

fn finalizer_patch<K: StoreObject>(obj: &K, finalizers: Vec<String>) -> serde_json::Value {
    json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": obj.resource_version(),
        }
    })
}

/// Adds `finalizer` to `obj` unless present. `obj` is refreshed from the
/// server response. Returns whether a write happened.
#[instrument(skip(store, obj), fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn add_finalizer<K, S>(store: &S, obj: &mut K, finalizer: &str) -> Result<bool>
where
    K: StoreObject,
    S: ObjectStore,
{
    if obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(false);
    }

    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    debug!("Adding finalizer {}", finalizer);
    *obj = store
        .patch::<K>(&ObjectKey::of(&*obj), &finalizer_patch(obj, finalizers))
        .await?;
    Ok(true)
}

/// Removes `finalizer` from `obj` if present. An object that is already gone
/// counts as released.
#[instrument(skip(store, obj), fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn remove_finalizer<K, S>(store: &S, obj: &mut K, finalizer: &str) -> Result<bool>
where
    K: StoreObject,
    S: ObjectStore,
{
    if !obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(false);
    }

    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();

    debug!("Removing finalizer {}", finalizer);
    match store
        .patch::<K>(&ObjectKey::of(&*obj), &finalizer_patch(obj, finalizers))
        .await
    {
        Ok(updated) => {
            *obj = updated;
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn has_finalizer<K: kube::Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}
