// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Condition bookkeeping and bundle health aggregation

use crate::bundle::health;
use crate::types::{Condition, ConditionStatus, ManagedResource};
use chrono::{DateTime, Utc};

/// Condition types written by the controllers
pub mod kinds {
    pub const VALID: &str = "Valid";
    pub const INSTALLED: &str = "Installed";
    pub const HEALTHY: &str = "Healthy";
    pub const PROGRESSING: &str = "Progressing";
    pub const SHOOT_RECONCILED: &str = "ShootReconciled";
    pub const SEED_REGISTERED: &str = "SeedRegistered";
}

const INITIALIZED_REASON: &str = "ConditionInitialized";
const INITIALIZED_MESSAGE: &str =
    "The condition has been initialized but its semantic check has not been performed yet.";

pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// The existing condition of `type_`, or a fresh `Unknown` one.
pub fn get_or_init(conditions: &[Condition], type_: &str, now: DateTime<Utc>) -> Condition {
    get_condition(conditions, type_)
        .cloned()
        .unwrap_or_else(|| Condition {
            type_: type_.to_string(),
            status: ConditionStatus::Unknown,
            reason: INITIALIZED_REASON.to_string(),
            message: INITIALIZED_MESSAGE.to_string(),
            last_transition_time: now,
            last_update_time: now,
            codes: Vec::new(),
        })
}

/// Returns `condition` with new status, reason and message. The transition
/// time only moves when the status changes.
pub fn updated_condition(
    condition: &Condition,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Condition {
    let mut updated = condition.clone();
    updated.status = status;
    updated.reason = reason.to_string();
    updated.message = message.to_string();

    if condition.status != status {
        updated.last_transition_time = now;
    }
    if condition.status != status || condition.reason != reason || condition.message != message {
        updated.last_update_time = now;
    }
    updated
}

/// Merges `updates` into `existing` by type. Existing order is kept, new
/// types are appended, untouched conditions are left as they are.
pub fn merge_conditions(existing: &[Condition], updates: &[Condition]) -> Vec<Condition> {
    let mut merged = existing.to_vec();
    for update in updates {
        match merged.iter_mut().find(|c| c.type_ == update.type_) {
            Some(slot) => *slot = update.clone(),
            None => merged.push(update.clone()),
        }
    }
    merged
}

/// Installed, Healthy and Progressing derived from a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleConditions {
    pub installed: Condition,
    pub healthy: Condition,
    pub progressing: Condition,
}

impl BundleConditions {
    pub fn into_vec(self) -> Vec<Condition> {
        vec![self.installed, self.healthy, self.progressing]
    }
}

/// Computes the three health conditions for a bundle. `bundle` is the read
/// result; a read failure sets all three to `Unknown`. The checks are
/// independent of each other.
pub fn aggregate_bundle_health(
    current: &[Condition],
    bundle: std::result::Result<&ManagedResource, &str>,
    now: DateTime<Utc>,
) -> BundleConditions {
    let installed = get_or_init(current, kinds::INSTALLED, now);
    let healthy = get_or_init(current, kinds::HEALTHY, now);
    let progressing = get_or_init(current, kinds::PROGRESSING, now);

    let bundle = match bundle {
        Ok(b) => b,
        Err(msg) => {
            let unknown = |c: &Condition| {
                updated_condition(c, ConditionStatus::Unknown, "SeedReadError", msg, now)
            };
            return BundleConditions {
                installed: unknown(&installed),
                healthy: unknown(&healthy),
                progressing: unknown(&progressing),
            };
        }
    };

    let installed = match health::check_applied(bundle) {
        Err(e) => updated_condition(&installed, ConditionStatus::False, "InstallationPending", &e, now),
        Ok(()) => updated_condition(
            &installed,
            ConditionStatus::True,
            "InstallationSuccessful",
            "The controller was successfully installed in the seed cluster.",
            now,
        ),
    };

    let healthy = match health::check_healthy(bundle) {
        Err(e) => updated_condition(&healthy, ConditionStatus::False, "ControllerNotHealthy", &e, now),
        Ok(()) => updated_condition(
            &healthy,
            ConditionStatus::True,
            "ControllerHealthy",
            "The controller running in the seed cluster is healthy.",
            now,
        ),
    };

    let progressing = match health::check_progressing(bundle) {
        Err(e) => updated_condition(
            &progressing,
            ConditionStatus::True,
            "ControllerNotRolledOut",
            &e,
            now,
        ),
        Ok(()) => updated_condition(
            &progressing,
            ConditionStatus::False,
            "ControllerRolledOut",
            "The controller has been rolled out successfully.",
            now,
        ),
    };

    BundleConditions {
        installed,
        healthy,
        progressing,
    }
}
