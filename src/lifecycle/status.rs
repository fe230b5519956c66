// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! LastOperation / LastError status transitions

use super::operation::compute_operation_type;
use crate::clock::Clock;
use crate::error::Result;
use crate::kubernetes::patch::patch_status;
use crate::kubernetes::store::{ObjectStore, StoreObject};
use crate::types::{
    BackupBucket, BackupBucketStatus, LastError, LastOperation, LastOperationState,
    LastOperationType,
};
use kube::Resource;

pub const PROGRESS_STARTED: i32 = 0;
pub const PROGRESS_ERROR: i32 = 50;
pub const PROGRESS_SUCCEEDED: i32 = 100;

/// Objects whose status carries LastOperation, LastError and observedGeneration.
pub trait LifecycleStatus: StoreObject {
    fn last_operation(&self) -> Option<&LastOperation>;
    fn set_last_operation(&mut self, op: LastOperation);
    fn set_last_error(&mut self, err: Option<LastError>);
    fn set_observed_generation(&mut self, generation: Option<i64>);

    fn operation_type(&self) -> LastOperationType {
        compute_operation_type(self.meta(), self.last_operation())
    }
}

impl LifecycleStatus for BackupBucket {
    fn last_operation(&self) -> Option<&LastOperation> {
        self.status.as_ref().and_then(|s| s.last_operation.as_ref())
    }

    fn set_last_operation(&mut self, op: LastOperation) {
        self.status
            .get_or_insert_with(BackupBucketStatus::default)
            .last_operation = Some(op);
    }

    fn set_last_error(&mut self, err: Option<LastError>) {
        self.status
            .get_or_insert_with(BackupBucketStatus::default)
            .last_error = err;
    }

    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.status
            .get_or_insert_with(BackupBucketStatus::default)
            .observed_generation = generation;
    }
}

/// "Reconciliation of BackupBucket state initialized." and friends
pub fn start_description(kind: &str, type_: LastOperationType) -> String {
    let verb = match type_ {
        LastOperationType::Create | LastOperationType::Reconcile => "Reconciliation",
        LastOperationType::Restore => "Restoration",
        LastOperationType::Migrate => "Migration",
        LastOperationType::Delete => "Deletion",
    };
    format!("{} of {} state initialized.", verb, kind)
}

/// Marks the start of an operation (`Processing`, progress 0) and records the
/// observed generation. Returns the operation type.
pub async fn mark_started<K, S>(store: &S, obj: &mut K, clock: &dyn Clock) -> Result<LastOperationType>
where
    K: LifecycleStatus,
    S: ObjectStore,
{
    let type_ = obj.operation_type();
    let description = start_description(&K::kind(&()), type_);
    let now = clock.now();
    patch_status(store, obj, |o: &mut K| {
        let generation = o.meta().generation;
        o.set_last_operation(LastOperation {
            type_,
            state: LastOperationState::Processing,
            progress: PROGRESS_STARTED,
            description,
            last_update_time: now,
        });
        o.set_observed_generation(generation);
    })
    .await?;
    Ok(type_)
}

/// `Succeeded`, progress 100, LastError cleared.
pub async fn mark_succeeded<K, S>(store: &S, obj: &mut K, clock: &dyn Clock, message: &str) -> Result<()>
where
    K: LifecycleStatus,
    S: ObjectStore,
{
    let type_ = obj.operation_type();
    let now = clock.now();
    patch_status(store, obj, |o: &mut K| {
        let generation = o.meta().generation;
        o.set_last_error(None);
        o.set_last_operation(LastOperation {
            type_,
            state: LastOperationState::Succeeded,
            progress: PROGRESS_SUCCEEDED,
            description: message.to_string(),
            last_update_time: now,
        });
        o.set_observed_generation(generation);
    })
    .await?;
    Ok(())
}

/// `Error`, progress 50, with the given LastError.
pub async fn mark_error<K, S>(
    store: &S,
    obj: &mut K,
    clock: &dyn Clock,
    message: &str,
    last_error: LastError,
) -> Result<()>
where
    K: LifecycleStatus,
    S: ObjectStore,
{
    let type_ = obj.operation_type();
    let now = clock.now();
    patch_status(store, obj, |o: &mut K| {
        o.set_last_operation(LastOperation {
            type_,
            state: LastOperationState::Error,
            progress: PROGRESS_ERROR,
            description: message.to_string(),
            last_update_time: now,
        });
        o.set_last_error(Some(last_error));
    })
    .await?;
    Ok(())
}
