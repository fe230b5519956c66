// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ControllerInstallation reconciler: renders the extension chart of a
//! registration for this seed and installs it as a bundle. The `Valid` and
//! `Installed` conditions are written back after every pass.

use super::runtime::{error_action, guarded, ErrorBackoff};
use crate::bundle::{self, Bundle};
use crate::clock::Clock;
use crate::conditions::{get_or_init, kinds, merge_conditions, updated_condition};
use crate::config::Config;
use crate::constants::{
    annotations, finalizers, labels, EXTENSION_NAMESPACE_PREFIX, GARDEN_NAMESPACE,
    SEED_RESOURCE_MANAGER_CLASS,
};
use crate::error::{Result, SeedletError};
use crate::kubernetes::finalizers::{add_finalizer, has_finalizer, remove_finalizer};
use crate::kubernetes::namespaces::{delete_namespace, ensure_namespace};
use crate::kubernetes::patch::patch_conditions;
use crate::kubernetes::store::{KubeStore, ObjectStore};
use crate::render::{decode_chart, ChartRenderer};
use crate::scheduler::{trigger_stream, PredicateFilter, TriggerPolicy};
use crate::types::{
    Condition, ConditionStatus, ControllerDeployment, ControllerInstallation,
    ControllerInstallationStatus, ControllerRegistration, ObjectKey, Seed,
};
use crate::values::merge_maps;
use futures::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector;
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, ResourceExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const PROTECTED_TAINT: &str = "seed.gardener.cloud/protected";

/// Namespace in the seed the extension is installed into.
pub fn extension_namespace(installation: &str) -> String {
    format!("{}{}", EXTENSION_NAMESPACE_PREFIX, installation)
}

/// Provider config of a helm ControllerDeployment.
#[derive(Debug, Deserialize)]
struct HelmDeployment {
    chart: String,
    #[serde(default)]
    values: Value,
}

/// Working copy of the two conditions owned by this controller.
struct InstallationConditions {
    valid: Condition,
    installed: Condition,
    now: chrono::DateTime<chrono::Utc>,
}

impl InstallationConditions {
    fn load(installation: &ControllerInstallation, now: chrono::DateTime<chrono::Utc>) -> Self {
        let current = installation.conditions();
        Self {
            valid: get_or_init(current, kinds::VALID, now),
            installed: get_or_init(current, kinds::INSTALLED, now),
            now,
        }
    }

    fn valid(&mut self, status: ConditionStatus, reason: &str, message: &str) {
        self.valid = updated_condition(&self.valid, status, reason, message, self.now);
    }

    fn installed(&mut self, status: ConditionStatus, reason: &str, message: &str) {
        self.installed = updated_condition(&self.installed, status, reason, message, self.now);
    }
}

pub struct ControllerInstallationReconciler<G, S> {
    garden: G,
    seed: S,
    config: Arc<Config>,
    renderer: Arc<dyn ChartRenderer>,
    clock: Arc<dyn Clock>,
    backoff: ErrorBackoff,
}

impl<G: ObjectStore, S: ObjectStore> ControllerInstallationReconciler<G, S> {
    pub fn new(
        garden: G,
        seed: S,
        config: Arc<Config>,
        renderer: Arc<dyn ChartRenderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let backoff = ErrorBackoff::new(&config.error_backoff);
        Self {
            garden,
            seed,
            config,
            renderer,
            clock,
            backoff,
        }
    }

    #[instrument(skip(self), fields(installation = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(mut installation) = self.garden.get::<ControllerInstallation>(key).await? else {
            debug!("ControllerInstallation {} is gone", key);
            return Ok(Action::await_change());
        };
        if installation.spec.seed_ref.name != self.config.seed_name {
            debug!("ControllerInstallation {} belongs to another seed", key);
            return Ok(Action::await_change());
        }

        let deleting = installation.metadata.deletion_timestamp.is_some();
        if deleting && !has_finalizer(&installation, finalizers::CONTROLLER_INSTALLATION) {
            return Ok(Action::await_change());
        }
        if !deleting {
            add_finalizer(&self.garden, &mut installation, finalizers::CONTROLLER_INSTALLATION).await?;
        }

        let mut conditions = InstallationConditions::load(&installation, self.clock.now());
        let result = if deleting {
            self.delete(&installation, &mut conditions).await
        } else {
            self.install(&installation, &mut conditions).await
        };

        if let Err(e) = self.write_conditions(&mut installation, conditions).await {
            warn!("Failed to update conditions of ControllerInstallation {}: {}", key, e);
            if result.is_ok() {
                return Err(e);
            }
        }

        let done = matches!(result, Ok(ref action) if deleting && *action == Action::await_change());
        if done {
            remove_finalizer(&self.garden, &mut installation, finalizers::CONTROLLER_INSTALLATION).await?;
            info!("ControllerInstallation {} released", key);
        }
        result
    }

    async fn write_conditions(
        &self,
        installation: &mut ControllerInstallation,
        conditions: InstallationConditions,
    ) -> Result<bool> {
        let updates = [conditions.valid, conditions.installed];
        patch_conditions(&self.garden, installation, |i: &mut ControllerInstallation| {
            let status = i
                .status
                .get_or_insert_with(ControllerInstallationStatus::default);
            status.conditions = merge_conditions(&status.conditions, &updates);
        })
        .await
    }

    async fn read_registration(
        &self,
        installation: &ControllerInstallation,
        conditions: &mut InstallationConditions,
    ) -> Result<ControllerRegistration> {
        let name = &installation.spec.registration_ref.name;
        match self
            .garden
            .get::<ControllerRegistration>(&ObjectKey::cluster_scoped(name))
            .await
        {
            Ok(Some(registration)) => Ok(registration),
            Ok(None) => {
                let message = format!("Referenced ControllerRegistration does not exist: {}", name);
                conditions.valid(ConditionStatus::False, "RegistrationNotFound", &message);
                Err(SeedletError::InvalidReference(message))
            }
            Err(e) => {
                let message = format!("Failed to get ControllerRegistration {}: {}", name, e);
                conditions.valid(ConditionStatus::Unknown, "RegistrationReadError", &message);
                Err(e)
            }
        }
    }

    async fn read_seed(
        &self,
        installation: &ControllerInstallation,
        conditions: &mut InstallationConditions,
    ) -> Result<Seed> {
        let name = &installation.spec.seed_ref.name;
        match self.garden.get::<Seed>(&ObjectKey::cluster_scoped(name)).await {
            Ok(Some(seed)) => Ok(seed),
            Ok(None) => {
                let message = format!("Referenced Seed does not exist: {}", name);
                conditions.valid(ConditionStatus::False, "SeedNotFound", &message);
                Err(SeedletError::InvalidReference(message))
            }
            Err(e) => {
                let message = format!("Failed to get Seed {}: {}", name, e);
                conditions.valid(ConditionStatus::Unknown, "SeedReadError", &message);
                Err(e)
            }
        }
    }

    /// Chart text and default values from the referenced ControllerDeployment.
    async fn read_chart(
        &self,
        installation: &ControllerInstallation,
        conditions: &mut InstallationConditions,
    ) -> Result<(String, Value)> {
        let invalid = |conditions: &mut InstallationConditions, message: String| {
            conditions.valid(ConditionStatus::False, "ChartInformationInvalid", &message);
            SeedletError::InvalidConfiguration(message)
        };

        let Some(deployment_ref) = &installation.spec.deployment_ref else {
            return Err(invalid(conditions, "no ControllerDeployment referenced".to_string()));
        };
        let deployment = match self
            .garden
            .get::<ControllerDeployment>(&ObjectKey::cluster_scoped(&deployment_ref.name))
            .await?
        {
            Some(d) => d,
            None => {
                let message = format!("Referenced ControllerDeployment does not exist: {}", deployment_ref.name);
                conditions.valid(ConditionStatus::False, "DeploymentNotFound", &message);
                return Err(SeedletError::InvalidReference(message));
            }
        };

        let provider_config = deployment.provider_config.unwrap_or(Value::Null);
        let helm: HelmDeployment = match serde_json::from_value(provider_config) {
            Ok(h) => h,
            Err(e) => return Err(invalid(conditions, format!("invalid deployment provider config: {}", e))),
        };
        match decode_chart(&helm.chart) {
            Ok(chart) => Ok((chart, helm.values)),
            Err(e) => Err(invalid(conditions, e.to_string())),
        }
    }

    async fn install(
        &self,
        installation: &ControllerInstallation,
        conditions: &mut InstallationConditions,
    ) -> Result<Action> {
        let registration = self.read_registration(installation, conditions).await?;
        let seed = self.read_seed(installation, conditions).await?;
        let (chart, chart_values) = self.read_chart(installation, conditions).await?;

        let namespace = extension_namespace(&installation.name_any());
        let namespace_labels = BTreeMap::from([
            (labels::GARDEN_ROLE.to_string(), labels::GARDEN_ROLE_EXTENSION.to_string()),
            (
                labels::CONTROLLER_REGISTRATION_NAME.to_string(),
                registration.name_any(),
            ),
            (labels::HA_CONFIG_CONSIDER.to_string(), "true".to_string()),
        ]);
        let mut namespace_annotations = BTreeMap::new();
        if !seed.spec.provider.zones.is_empty() {
            namespace_annotations.insert(
                annotations::HA_CONFIG_ZONES.to_string(),
                seed.spec.provider.zones.join(","),
            );
        }
        ensure_namespace(&self.seed, &namespace, &namespace_labels, &namespace_annotations).await?;

        let Some(seed_identity) = seed.cluster_identity() else {
            return Err(SeedletError::Precondition(format!(
                "cluster identity of seed {} is not yet set",
                seed.name_any()
            )));
        };
        let values = merge_maps(
            &chart_values,
            &gardener_values(&seed, seed_identity, &self.config.garden_cluster_identity)?,
        );

        let release = match self
            .renderer
            .render(&chart, &registration.name_any(), &namespace, &values)
        {
            Ok(r) => r,
            Err(e) => {
                conditions.valid(ConditionStatus::False, "ChartCannotBeRendered", &e.to_string());
                return Err(e);
            }
        };
        conditions.valid(
            ConditionStatus::True,
            "RegistrationValid",
            "chart could be rendered successfully.",
        );

        let name = installation.name_any();
        let bundle = Bundle {
            namespace: GARDEN_NAMESPACE.to_string(),
            name: name.clone(),
            labels: BTreeMap::from([(labels::CONTROLLER_INSTALLATION_NAME.to_string(), name.clone())]),
            keep_objects: false,
            class: Some(SEED_RESOURCE_MANAGER_CLASS.to_string()),
            data: release.as_secret_data(),
        };
        if let Err(e) = bundle::create(&self.seed, &bundle).await {
            conditions.installed(
                ConditionStatus::False,
                "InstallationFailed",
                &format!("Creation of ManagedResource {:?} failed: {}", name, e),
            );
            return Err(e);
        }

        if conditions.installed.status == ConditionStatus::Unknown {
            conditions.installed(
                ConditionStatus::False,
                "InstallationPending",
                &format!("Installation of ManagedResource {:?} is still pending.", name),
            );
        }
        info!("ControllerInstallation {} applied to namespace {}", name, namespace);
        Ok(Action::await_change())
    }

    /// Removes the bundle and the extension namespace. Returns
    /// `await_change` once both are gone, a requeue while they linger.
    async fn delete(
        &self,
        installation: &ControllerInstallation,
        conditions: &mut InstallationConditions,
    ) -> Result<Action> {
        self.read_seed(installation, conditions).await?;

        let name = installation.name_any();
        let pending = |conditions: &mut InstallationConditions, what: &str| {
            conditions.installed(
                ConditionStatus::False,
                "DeletionPending",
                &format!("Deletion of {} is still pending.", what),
            );
            Action::requeue(self.config.controller_installation.deletion_requeue)
        };

        match bundle::delete(&self.seed, GARDEN_NAMESPACE, &name).await {
            Ok(true) => return Ok(pending(conditions, &format!("ManagedResource {:?}", name))),
            Ok(false) => {}
            Err(e) => {
                conditions.installed(
                    ConditionStatus::False,
                    "DeletionFailed",
                    &format!("Deletion of ManagedResource {:?} failed: {}", name, e),
                );
                return Err(e);
            }
        }

        if let Err(e) = bundle::delete_secret(&self.seed, GARDEN_NAMESPACE, &name).await {
            conditions.installed(
                ConditionStatus::False,
                "DeletionFailed",
                &format!("Deletion of ManagedResource secret {:?} failed: {}", name, e),
            );
            return Err(e);
        }

        let namespace = extension_namespace(&name);
        match delete_namespace(&self.seed, &namespace).await {
            Ok(true) => return Ok(pending(conditions, &format!("Namespace {:?}", namespace))),
            Ok(false) => {}
            Err(e) if e.is_conflict() => return Ok(pending(conditions, &format!("Namespace {:?}", namespace))),
            Err(e) => {
                conditions.installed(
                    ConditionStatus::False,
                    "DeletionFailed",
                    &format!("Deletion of Namespace {:?} failed: {}", namespace, e),
                );
                return Err(e);
            }
        }

        conditions.installed(
            ConditionStatus::False,
            "DeletionSuccessful",
            "Deletion of old resources succeeded.",
        );
        Ok(Action::await_change())
    }
}

/// The `gardener` block merged over the chart's own values.
fn gardener_values(seed: &Seed, seed_identity: &str, garden_identity: &str) -> Result<Value> {
    let spec = &seed.spec;
    let ingress_domain = spec
        .dns
        .as_ref()
        .and_then(|dns| dns.get("ingressDomain"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| spec.ingress.as_ref().map(|i| i.domain.clone()));
    let volume_providers = spec
        .volume
        .as_ref()
        .and_then(|v| v.get("providers"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    let volume_provider = volume_providers
        .get(0)
        .and_then(|p| p.get("name"))
        .cloned()
        .unwrap_or(Value::Null);
    let visible = spec
        .settings
        .as_ref()
        .and_then(|s| s.pointer("/scheduling/visible"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let protected = spec.taints.iter().any(|t| t.key == PROTECTED_TAINT);
    let networks = spec.networks.clone().unwrap_or(Value::Null);
    let block_cidrs = networks.get("blockCIDRs").cloned().unwrap_or_else(|| json!([]));

    Ok(json!({
        "gardener": {
            "version": env!("CARGO_PKG_VERSION"),
            "garden": {
                "clusterIdentity": garden_identity,
            },
            "seed": {
                "name": seed.name_any(),
                "identity": seed.name_any(),
                "clusterIdentity": seed_identity,
                "annotations": seed.annotations(),
                "labels": seed.labels(),
                "provider": spec.provider.type_,
                "region": spec.provider.region,
                "volumeProvider": volume_provider,
                "volumeProviders": volume_providers,
                "ingressDomain": ingress_domain,
                "protected": protected,
                "visible": visible,
                "taints": serde_json::to_value(&spec.taints)?,
                "networks": networks,
                "blockCIDRs": block_cidrs,
                "spec": serde_json::to_value(spec)?,
            },
        }
    }))
}

impl ControllerInstallationReconciler<KubeStore, KubeStore> {
    /// Watches the ControllerInstallations that target this seed.
    pub async fn run(self) -> anyhow::Result<()> {
        let installations: Api<ControllerInstallation> = Api::all(self.garden.client().clone());
        let seed_name = self.config.seed_name.clone();
        let concurrency = self.config.controller_installation.concurrent_syncs;

        let (reader, writer) = reflector::store();
        let events = watcher(installations, watcher::Config::default())
            .default_backoff()
            .reflect(writer);
        let filter = PredicateFilter(move |i: &ControllerInstallation| i.spec.seed_ref.name == seed_name);
        let triggers = trigger_stream(events, TriggerPolicy::GenerationChanged, Arc::new(filter));

        Controller::for_stream(triggers, reader)
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::new(self))
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled ControllerInstallation: {:?}", o),
                    Err(e) => warn!("ControllerInstallation reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(
    installation: Arc<ControllerInstallation>,
    ctx: Arc<ControllerInstallationReconciler<KubeStore, KubeStore>>,
) -> Result<Action> {
    let key = ObjectKey::of(installation.as_ref());
    let action = guarded(ctx.config.reconcile_timeout, ctx.reconcile(&key)).await?;
    ctx.backoff.reset(&key);
    Ok(action)
}

fn error_policy(
    installation: Arc<ControllerInstallation>,
    error: &SeedletError,
    ctx: Arc<ControllerInstallationReconciler<KubeStore, KubeStore>>,
) -> Action {
    error_action(error, &ObjectKey::of(installation.as_ref()), &ctx.backoff)
}
