// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Plumbing shared by all controllers: deadline and panic guard around a
//! reconcile pass, per-key error backoff and the error policy.

use crate::config::ErrorBackoffConfig;
use crate::error::{Result, SeedletError};
use crate::types::ObjectKey;
use futures::FutureExt;
use kube::runtime::controller::Action;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, warn};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one reconcile pass under `timeout`. Timeouts and panics come back as
/// transient errors so the queue retries the key.
pub async fn guarded<F>(timeout: Duration, pass: F) -> Result<Action>
where
    F: Future<Output = Result<Action>> + Send,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(pass).catch_unwind()).await {
        Err(_) => Err(SeedletError::Timeout(timeout)),
        Ok(Err(payload)) => {
            let message = panic_message(payload.as_ref());
            error!("Reconciliation panicked: {}", message);
            Err(SeedletError::Panicked(message))
        }
        Ok(Ok(result)) => result,
    }
}

/// Exponential backoff per object key: `initial` doubling up to `max`.
pub struct ErrorBackoff {
    initial: Duration,
    max: Duration,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl ErrorBackoff {
    pub fn new(config: &ErrorBackoffConfig) -> Self {
        Self {
            initial: config.initial,
            max: config.max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `key` and returns how long to wait.
    pub fn next(&self, key: &ObjectKey) -> Duration {
        let attempt = match self.failures.lock() {
            Ok(mut failures) => {
                let count = failures.entry(key.clone()).or_insert(0);
                *count = count.saturating_add(1);
                *count
            }
            Err(e) => {
                warn!("Failed to lock error backoff state: {}", e);
                1
            }
        };
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&self, key: &ObjectKey) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(key);
        }
    }
}

/// Maps a failed pass to the next action. Business errors wait for the
/// object to change; everything else is retried with backoff.
pub fn error_action(error: &SeedletError, key: &ObjectKey, backoff: &ErrorBackoff) -> Action {
    if error.is_terminal() {
        warn!("Reconciliation of {} failed permanently: {}", key, error);
        return Action::await_change();
    }
    let delay = backoff.next(key);
    debug!("Reconciliation of {} failed: {}, retrying in {:?}", key, error, delay);
    Action::requeue(delay)
}
