// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{annotations, operations};
use crate::types::{LastOperation, LastOperationState, LastOperationType};
use kube::api::ObjectMeta;

/// Which operation a reconcile pass performs, from the object's metadata and
/// the previous LastOperation. Unfinished create, migrate and restore
/// operations keep their type until they succeed.
pub fn compute_operation_type(
    meta: &ObjectMeta,
    last_operation: Option<&LastOperation>,
) -> LastOperationType {
    let requested = meta
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::OPERATION))
        .map(String::as_str);

    match requested {
        Some(operations::MIGRATE) => return LastOperationType::Migrate,
        Some(operations::RESTORE) => return LastOperationType::Restore,
        _ => {}
    }
    if meta.deletion_timestamp.is_some() {
        return LastOperationType::Delete;
    }

    match last_operation {
        None => LastOperationType::Create,
        Some(op) if op.state != LastOperationState::Succeeded => match op.type_ {
            t @ (LastOperationType::Create
            | LastOperationType::Migrate
            | LastOperationType::Restore) => t,
            _ => LastOperationType::Reconcile,
        },
        Some(_) => LastOperationType::Reconcile,
    }
}
