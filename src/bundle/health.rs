// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Health predicates over a ManagedResource's reported status

use crate::conditions::get_condition;
use crate::types::{ConditionStatus, ManagedResource, ObjectKey};

pub const RESOURCES_APPLIED: &str = "ResourcesApplied";
pub const RESOURCES_HEALTHY: &str = "ResourcesHealthy";
pub const RESOURCES_PROGRESSING: &str = "ResourcesProgressing";

fn require_true(bundle: &ManagedResource, type_: &str) -> Result<(), String> {
    let key = ObjectKey::of(bundle);
    match get_condition(bundle.conditions(), type_) {
        None => Err(format!(
            "condition {} of managed resource {} is missing",
            type_, key
        )),
        Some(c) if c.status != ConditionStatus::True => Err(format!(
            "condition {} of managed resource {} is {}: {}",
            type_, key, c.status, c.message
        )),
        Some(_) => Ok(()),
    }
}

/// The resource manager observed the current generation and applied it.
pub fn check_applied(bundle: &ManagedResource) -> Result<(), String> {
    let generation = bundle.metadata.generation.unwrap_or_default();
    let observed = bundle
        .status
        .as_ref()
        .and_then(|s| s.observed_generation)
        .unwrap_or_default();
    if observed != generation {
        return Err(format!(
            "observed generation of managed resource {} outdated ({}/{})",
            ObjectKey::of(bundle),
            observed,
            generation
        ));
    }
    require_true(bundle, RESOURCES_APPLIED)
}

pub fn check_healthy(bundle: &ManagedResource) -> Result<(), String> {
    require_true(bundle, RESOURCES_HEALTHY)
}

/// Errors while a rollout is still converging.
pub fn check_progressing(bundle: &ManagedResource) -> Result<(), String> {
    match get_condition(bundle.conditions(), RESOURCES_PROGRESSING) {
        Some(c) if c.status == ConditionStatus::True => Err(format!(
            "managed resource {} is progressing: {}",
            ObjectKey::of(bundle),
            c.message
        )),
        _ => Ok(()),
    }
}
