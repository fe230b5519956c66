// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Gardener resource types handled by the controllers

pub mod backup_bucket;
pub mod common;
pub mod controller_installation;
pub mod extensions;
pub mod managed_resource;
pub mod managed_seed;

pub use backup_bucket::{BackupBucket, BackupBucketSpec, BackupBucketStatus};
pub use common::{
    ClusterRole, Condition, ConditionStatus, LastError, LastOperation, LastOperationState,
    LastOperationType, NameReference, ObjectKey, ResourceRef, SecretReference,
};
pub use controller_installation::{
    ControllerDeployment, ControllerInstallation, ControllerInstallationSpec,
    ControllerInstallationStatus, ControllerRegistration, ControllerRegistrationSpec, Seed,
    SeedSpec,
};
pub use extensions::{ExtensionBackupBucket, ExtensionBackupBucketSpec, ExtensionBackupBucketStatus};
pub use managed_resource::{ManagedResource, ManagedResourceSpec, ManagedResourceStatus};
pub use managed_seed::{ManagedSeed, ManagedSeedSpec, ManagedSeedStatus, Shoot, ShootSpec};
