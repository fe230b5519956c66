// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Controllers that react to watch events on the garden and the seed.

pub mod backup_bucket;
pub mod controller_installation;
pub mod controller_installation_care;
pub mod managed_seed;
pub mod runtime;

pub use backup_bucket::BackupBucketReconciler;
pub use controller_installation::ControllerInstallationReconciler;
pub use controller_installation_care::ControllerInstallationCareReconciler;
pub use managed_seed::{ManagedSeedReconciler, DEFAULT_GARDENLET_CHART};
