// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cross-cluster secret synchronization.

pub mod secrets;

pub use secrets::{delete_secret, mirror_from, mirror_secret, read_source, reflect_secret, release_secret};
