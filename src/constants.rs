// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by the controllers
pub mod annotations {
    /// Requests an operation on an object ("reconcile", "migrate", "restore")
    pub const OPERATION: &str = "gardener.cloud/operation";
    /// Timestamp written together with the operation annotation
    pub const TIMESTAMP: &str = "gardener.cloud/timestamp";
    /// Zones used when spreading extension controllers
    pub const HA_CONFIG_ZONES: &str = "high-availability-config.resources.gardener.cloud/zones";
}

/// Values of the operation annotation
pub mod operations {
    pub const RECONCILE: &str = "reconcile";
    pub const MIGRATE: &str = "migrate";
    pub const RESTORE: &str = "restore";
}

/// Label keys set on objects in the seed cluster
pub mod labels {
    pub const GARDEN_ROLE: &str = "gardener.cloud/role";
    pub const GARDEN_ROLE_EXTENSION: &str = "extension";
    pub const CONTROLLER_REGISTRATION_NAME: &str =
        "controllerregistration.core.gardener.cloud/name";
    pub const CONTROLLER_INSTALLATION_NAME: &str =
        "controllerinstallation.core.gardener.cloud/name";
    pub const HA_CONFIG_CONSIDER: &str = "high-availability-config.resources.gardener.cloud/consider";
}

/// Finalizers owned by this process
pub mod finalizers {
    /// Set on BackupBuckets
    pub const GARDENER: &str = "gardener";
    /// Set on secrets referenced by garden objects
    pub const EXTERNAL_GARDENER: &str = "gardener.cloud/gardener";
    /// Set on generated BackupBucket secrets reflected into the garden
    pub const BACKUP_BUCKET: &str = "core.gardener.cloud/backupbucket";
    pub const CONTROLLER_INSTALLATION: &str = "core.gardener.cloud/controllerinstallation";
    pub const MANAGED_SEED: &str = "seedmanagement.gardener.cloud/managedseed";
}

/// Event reasons
pub mod reasons {
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    pub const DELETE_ERROR: &str = "DeleteError";
    pub const RECONCILED: &str = "Reconciled";
    pub const DELETED: &str = "Deleted";
}

/// The operator name used as field manager and event reporter
pub const OPERATOR_NAME: &str = "seedlet";

/// Namespace hosting gardener-owned objects in every cluster
pub const GARDEN_NAMESPACE: &str = "garden";

/// Resource manager class for bundles applied to the seed
pub const SEED_RESOURCE_MANAGER_CLASS: &str = "seed";

/// Prefix of the extension controller namespaces in the seed
pub const EXTENSION_NAMESPACE_PREFIX: &str = "extension-";

/// Name prefix of seed-side copies of BackupBucket secrets
pub const BACKUP_BUCKET_SECRET_PREFIX: &str = "bucket-";

/// Name prefix of garden-side copies of generated BackupBucket secrets
pub const GENERATED_BACKUP_BUCKET_SECRET_PREFIX: &str = "generated-bucket-";

/// Name of the gardenlet bundle inside a managed seed's shoot
pub const GARDENLET_BUNDLE_NAME: &str = "gardenlet";

/// Bootstrap kubeconfig secret name inside a managed seed's shoot
pub const GARDENLET_BOOTSTRAP_SECRET_NAME: &str = "gardenlet-kubeconfig-bootstrap";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
