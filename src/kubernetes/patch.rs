// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! JSON merge patch helpers (RFC 7386) for diff-based writes

use super::store::{ObjectStore, StoreObject};
use crate::error::Result;
use crate::types::ObjectKey;
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

/// What `create_or_merge_patch` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Computes the merge patch that turns `old` into `new`. Keys missing from
/// `new` become `null`; arrays and scalars are replaced wholesale. An empty
/// object means both documents are equal.
pub fn merge_diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_val) in new_map {
                match old_map.get(key) {
                    None => {
                        patch.insert(key.clone(), new_val.clone());
                    }
                    Some(old_val) if old_val == new_val => {}
                    Some(old_val @ Value::Object(_)) if new_val.is_object() => {
                        patch.insert(key.clone(), merge_diff(old_val, new_val));
                    }
                    Some(_) => {
                        patch.insert(key.clone(), new_val.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Applies a merge patch to `target` in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let entry = target_map.entry(key.clone()).or_insert(Value::Null);
                apply_merge_patch(entry, value);
            }
        }
    }
}

pub fn is_empty_patch(patch: &Value) -> bool {
    patch.as_object().is_some_and(|m| m.is_empty())
}

/// Reads the object named by `obj`, applies `mutate` and writes the result:
/// a create when the object is missing, a merge patch of only the changed
/// fields otherwise, and nothing when `mutate` changed nothing.
#[instrument(skip(store, obj, mutate), fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn create_or_merge_patch<K, S, F>(
    store: &S,
    obj: K,
    mutate: F,
) -> Result<(OperationResult, K)>
where
    K: StoreObject,
    S: ObjectStore,
    F: FnOnce(&mut K) -> Result<()> + Send,
{
    let key = ObjectKey::of(&obj);

    let Some(current) = store.get::<K>(&key).await? else {
        let mut obj = obj;
        mutate(&mut obj)?;
        let created = store.create(&obj).await?;
        return Ok((OperationResult::Created, created));
    };

    let before = serde_json::to_value(&current)?;
    let mut desired = current.clone();
    mutate(&mut desired)?;
    let after = serde_json::to_value(&desired)?;

    let mut patch = merge_diff(&before, &after);
    if let Value::Object(map) = &mut patch {
        // status goes through the status subresource
        map.remove("status");
    }
    if is_empty_patch(&patch) {
        debug!("{} {} unchanged", K::kind(&()), key);
        return Ok((OperationResult::Unchanged, current));
    }

    let updated = store.patch::<K>(&key, &patch).await?;
    Ok((OperationResult::Updated, updated))
}

async fn write_status<K, S, F>(store: &S, obj: &mut K, lock: bool, mutate: F) -> Result<bool>
where
    K: StoreObject,
    S: ObjectStore,
    F: FnOnce(&mut K),
{
    let before = serde_json::to_value(&*obj)?;
    mutate(obj);
    let after = serde_json::to_value(&*obj)?;

    let old_status = before.get("status").unwrap_or(&Value::Null);
    let new_status = after.get("status").unwrap_or(&Value::Null);
    if old_status == new_status {
        return Ok(false);
    }

    let mut patch = json!({ "status": merge_diff(old_status, new_status) });
    if lock {
        patch["metadata"] = json!({ "resourceVersion": obj.resource_version() });
    }

    *obj = store.patch_status::<K>(&ObjectKey::of(&*obj), &patch).await?;
    Ok(true)
}

/// Patches the status of `obj` with the changes made by `mutate`, computed
/// against a snapshot taken before. Skips the write when nothing changed and
/// refreshes `obj` from the server response. Returns whether it wrote.
#[instrument(skip_all, fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn patch_status<K, S, F>(store: &S, obj: &mut K, mutate: F) -> Result<bool>
where
    K: StoreObject,
    S: ObjectStore,
    F: FnOnce(&mut K),
{
    write_status(store, obj, false, mutate).await
}

/// Like `patch_status` but guarded by the object's resourceVersion. Merge
/// patches replace lists wholesale, so condition lists need the lock to not
/// drop entries written concurrently by another controller.
#[instrument(skip_all, fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn patch_conditions<K, S, F>(store: &S, obj: &mut K, mutate: F) -> Result<bool>
where
    K: StoreObject,
    S: ObjectStore,
    F: FnOnce(&mut K),
{
    write_status(store, obj, true, mutate).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryStore;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("garden".to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_diff_equal_documents_is_empty() {
        let doc = json!({"a": 1, "b": {"c": [1, 2]}});
        assert!(is_empty_patch(&merge_diff(&doc, &doc)));
    }

    #[test]
    fn test_merge_diff_nested_change_and_removal() {
        let old = json!({"a": 1, "b": {"c": 1, "d": 2}, "gone": true});
        let new = json!({"a": 1, "b": {"c": 3, "d": 2}, "added": "x"});

        let diff = merge_diff(&old, &new);

        assert_eq!(diff, json!({"b": {"c": 3}, "added": "x", "gone": null}));
    }

    #[test]
    fn test_merge_diff_replaces_arrays() {
        let old = json!({"finalizers": ["a", "b"]});
        let new = json!({"finalizers": ["a"]});

        assert_eq!(merge_diff(&old, &new), json!({"finalizers": ["a"]}));
    }

    #[test]
    fn test_apply_merge_patch_round_trips_diff() {
        let old = json!({"a": {"b": 1, "c": 2}, "d": [1], "e": "x"});
        let new = json!({"a": {"b": 5}, "d": [2, 3], "f": {"g": null}});

        let mut target = old.clone();
        apply_merge_patch(&mut target, &merge_diff(&old, &new));

        // null leaves are dropped by merge patch semantics
        assert_eq!(target, json!({"a": {"b": 5}, "d": [2, 3], "f": {}}));
    }

    #[tokio::test]
    async fn test_create_or_merge_patch_creates_missing() {
        let store = MemoryStore::new();

        let (result, created) =
            create_or_merge_patch(&store, config_map("cm", &[]), |cm: &mut ConfigMap| {
                cm.data = Some(BTreeMap::from([("k".to_string(), "v".to_string())]));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(result, OperationResult::Created);
        assert_eq!(created.data.unwrap()["k"], "v");
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_create_or_merge_patch_skips_unchanged() {
        let store = MemoryStore::new();
        store.insert(&config_map("cm", &[("k", "v")]));

        let (result, _) =
            create_or_merge_patch(&store, config_map("cm", &[]), |cm: &mut ConfigMap| {
                cm.data = Some(BTreeMap::from([("k".to_string(), "v".to_string())]));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(result, OperationResult::Unchanged);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_create_or_merge_patch_updates_changed() {
        let store = MemoryStore::new();
        store.insert(&config_map("cm", &[("k", "v"), ("keep", "1")]));

        let (result, updated) =
            create_or_merge_patch(&store, config_map("cm", &[]), |cm: &mut ConfigMap| {
                if let Some(data) = cm.data.as_mut() {
                    data.insert("k".to_string(), "w".to_string());
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(result, OperationResult::Updated);
        let data = updated.data.unwrap();
        assert_eq!(data["k"], "w");
        assert_eq!(data["keep"], "1");
    }

    #[tokio::test]
    async fn test_create_or_merge_patch_propagates_mutate_error() {
        let store = MemoryStore::new();

        let res = create_or_merge_patch(&store, config_map("cm", &[]), |_: &mut ConfigMap| {
            Err(crate::error::SeedletError::InvalidConfiguration("bad".into()))
        })
        .await;

        assert!(res.is_err());
        assert_eq!(store.writes(), 0);
    }
}
