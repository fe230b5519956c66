// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod bundle;
pub mod clock;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod kubernetes;
pub mod lifecycle;
pub mod reconcilers;
pub mod render;
pub mod scheduler;
pub mod sync;
pub mod types;
pub mod values;

#[cfg(test)]
pub mod test_utils;
