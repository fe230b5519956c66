// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Helpers for chart value maps

use serde_json::{Map, Value};

/// Deep-merges `overlay` into `base`. Nested objects merge key by key,
/// everything else in `overlay` replaces the value in `base`.
pub fn merge_maps(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut out = b.clone();
            for (key, value) in o {
                let merged = match out.get(key) {
                    Some(existing) => merge_maps(existing, value),
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (_, Value::Null) => base.clone(),
        _ => overlay.clone(),
    }
}

/// Removes the value at `path` (dot separated keys) if present.
pub fn delete_from_values(values: &mut Value, path: &str) {
    let keys: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = values;
    for key in parents {
        match current.get_mut(*key) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Value::Object(map) = current {
        map.remove(*last);
    }
}

/// Wraps `value` into nested objects along `path`.
pub fn nest(path: &[&str], value: Value) -> Value {
    path.iter().rev().fold(value, |acc, key| {
        let mut map = Map::new();
        map.insert(key.to_string(), acc);
        Value::Object(map)
    })
}
