// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ManagedSeed reconciler: installs a gardenlet into the shoot a ManagedSeed
//! references so the shoot registers itself as a new seed.

use super::runtime::{error_action, guarded, ErrorBackoff};
use crate::bundle::{self, Bundle};
use crate::clock::Clock;
use crate::conditions::{get_or_init, kinds, merge_conditions, updated_condition};
use crate::config::{Config, ManagedSeedConfig};
use crate::constants::{
    finalizers, reasons, GARDENLET_BOOTSTRAP_SECRET_NAME, GARDENLET_BUNDLE_NAME, GARDEN_NAMESPACE,
};
use crate::error::{Result, SeedletError};
use crate::events::{normal_event, warn_event, EventPublisher};
use crate::kubernetes::finalizers::{add_finalizer, has_finalizer, remove_finalizer};
use crate::kubernetes::namespaces::ensure_namespace;
use crate::kubernetes::patch::patch_conditions;
use crate::kubernetes::store::{DeleteOutcome, KubeStore, ObjectStore};
use crate::kubernetes::{KubeShootConnector, ShootConnector};
use crate::render::ChartRenderer;
use crate::scheduler::{trigger_stream, ResponsibilityFilter, TriggerPolicy};
use crate::sync::{delete_secret, mirror_secret};
use crate::types::managed_seed::Bootstrap;
use crate::types::{
    ClusterRole, Condition, ConditionStatus, ManagedSeed, ManagedSeedStatus, ObjectKey,
    ResourceRef, Seed, Shoot,
};
use crate::values::{delete_from_values, merge_maps, nest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, ResourceExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Chart used when no chart file is configured.
pub const DEFAULT_GARDENLET_CHART: &str = include_str!("../../charts/gardenlet.yaml");

/// Parent configuration that only makes sense for the parent gardenlet.
const PARENT_ONLY_CONFIG: [&str; 3] = [
    "gardenClientConnection.bootstrapKubeconfig",
    "seedClientConnection.kubeconfig",
    "seedConfig",
];

const RECONCILE_ACTION: &str = "Reconcile";
const DELETE_ACTION: &str = "Delete";

fn shoot_key(managed_seed: &ManagedSeed) -> Option<ObjectKey> {
    let namespace = managed_seed.namespace()?;
    let name = managed_seed.shoot_name().filter(|n| !n.is_empty())?;
    Some(ObjectKey::namespaced(&namespace, name))
}

fn bootstrap_secret_key() -> ObjectKey {
    ObjectKey::namespaced(GARDEN_NAMESPACE, GARDENLET_BOOTSTRAP_SECRET_NAME)
}

/// A ManagedSeed belongs to this process when its shoot is hosted on this
/// seed. Without a shoot, only a pending deletion is still picked up.
fn is_responsible(managed_seed: &ManagedSeed, shoot: Option<&Shoot>, seed_name: &str) -> bool {
    match shoot {
        Some(shoot) => shoot.responsible_seed_name() == Some(seed_name),
        None => managed_seed.metadata.deletion_timestamp.is_some(),
    }
}

/// Chart values for the gardenlet of `managed_seed`: deployment settings at
/// the top level, the component configuration under `config`.
pub fn gardenlet_values(managed_seed: &ManagedSeed, config: &ManagedSeedConfig) -> Value {
    let gardenlet = managed_seed.spec.gardenlet.clone().unwrap_or_default();
    let own_deployment = gardenlet.deployment.unwrap_or(Value::Null);
    let own_config = gardenlet.config.unwrap_or(Value::Null);

    let (deployment, component_config) = if managed_seed.merge_with_parent() {
        let mut parent_config = config.parent_gardenlet_config.clone();
        for path in PARENT_ONLY_CONFIG {
            delete_from_values(&mut parent_config, path);
        }
        (
            merge_maps(&config.parent_gardenlet_deployment, &own_deployment),
            merge_maps(&parent_config, &own_config),
        )
    } else {
        (own_deployment, own_config)
    };

    let mut values = if deployment.is_object() { deployment } else { json!({}) };
    let mut component_config = if component_config.is_object() {
        component_config
    } else {
        json!({})
    };
    component_config = merge_maps(
        &component_config,
        &nest(&["seedConfig", "metadata", "name"], json!(managed_seed.name_any())),
    );

    if managed_seed.bootstrap() != Bootstrap::None {
        let secret = json!({
            "name": GARDENLET_BOOTSTRAP_SECRET_NAME,
            "namespace": GARDEN_NAMESPACE,
        });
        component_config = merge_maps(
            &component_config,
            &nest(&["gardenClientConnection", "bootstrapKubeconfig"], secret.clone()),
        );
        values["bootstrapKubeconfig"] = secret;
    }
    values["config"] = component_config;
    values
}

/// Follows ManagedSeed -> Shoot -> responsible seed in the garden. When the
/// shoot cannot be read the event is let through and `reconcile` decides.
pub struct ShootResponsibility<G> {
    garden: G,
    seed_name: String,
}

impl<G: ObjectStore> ShootResponsibility<G> {
    pub fn new(garden: G, seed_name: String) -> Self {
        Self { garden, seed_name }
    }
}

#[async_trait]
impl<G: ObjectStore> ResponsibilityFilter<ManagedSeed> for ShootResponsibility<G> {
    async fn is_responsible(&self, managed_seed: &ManagedSeed) -> bool {
        let Some(key) = shoot_key(managed_seed) else {
            return false;
        };
        match self.garden.get::<Shoot>(&key).await {
            Ok(shoot) => is_responsible(managed_seed, shoot.as_ref(), &self.seed_name),
            Err(e) => {
                warn!("Failed to read shoot {}, forwarding event: {}", key, e);
                true
            }
        }
    }
}

struct SeedConditions {
    shoot_reconciled: Condition,
    seed_registered: Condition,
    /// The gardenlet bundle was applied for the current generation
    installed: bool,
    now: DateTime<Utc>,
}

impl SeedConditions {
    fn load(managed_seed: &ManagedSeed, now: DateTime<Utc>) -> Self {
        let current = managed_seed.conditions();
        Self {
            shoot_reconciled: get_or_init(current, kinds::SHOOT_RECONCILED, now),
            seed_registered: get_or_init(current, kinds::SEED_REGISTERED, now),
            installed: false,
            now,
        }
    }

    fn shoot_reconciled(&mut self, status: ConditionStatus, reason: &str, message: &str) {
        self.shoot_reconciled =
            updated_condition(&self.shoot_reconciled, status, reason, message, self.now);
    }

    fn seed_registered(&mut self, status: ConditionStatus, reason: &str, message: &str) {
        self.seed_registered =
            updated_condition(&self.seed_registered, status, reason, message, self.now);
    }
}

pub struct ManagedSeedReconciler<G, C> {
    garden: G,
    shoots: C,
    config: Arc<Config>,
    renderer: Arc<dyn ChartRenderer>,
    chart: String,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    backoff: ErrorBackoff,
}

impl<G: ObjectStore, C: ShootConnector> ManagedSeedReconciler<G, C> {
    pub fn new(
        garden: G,
        shoots: C,
        config: Arc<Config>,
        renderer: Arc<dyn ChartRenderer>,
        chart: String,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let backoff = ErrorBackoff::new(&config.error_backoff);
        Self {
            garden,
            shoots,
            config,
            renderer,
            chart,
            events,
            clock,
            backoff,
        }
    }

    fn wait(&self) -> Action {
        Action::requeue(self.config.managed_seed.wait_sync_period)
    }

    #[instrument(skip(self), fields(managed_seed = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(mut managed_seed) = self.garden.get::<ManagedSeed>(key).await? else {
            debug!("ManagedSeed {} is gone", key);
            return Ok(Action::await_change());
        };
        let Some(shoot_key) = shoot_key(&managed_seed) else {
            debug!("ManagedSeed {} references no shoot", key);
            return Ok(Action::await_change());
        };
        let shoot = self.garden.get::<Shoot>(&shoot_key).await?;
        if !is_responsible(&managed_seed, shoot.as_ref(), &self.config.seed_name) {
            debug!("Shoot of ManagedSeed {} is not hosted on this seed", key);
            return Ok(Action::await_change());
        }

        if managed_seed.metadata.deletion_timestamp.is_some() {
            let result = self.delete(&mut managed_seed, shoot.as_ref(), &shoot_key).await;
            if let Err(e) = &result {
                warn_event(&*self.events, &managed_seed, reasons::DELETE_ERROR, DELETE_ACTION, e.to_string())
                    .await;
            }
            return result;
        }

        add_finalizer(&self.garden, &mut managed_seed, finalizers::MANAGED_SEED).await?;

        let mut conditions = SeedConditions::load(&managed_seed, self.clock.now());
        let result = self
            .install(&managed_seed, shoot.as_ref(), &shoot_key, &mut conditions)
            .await;
        if let Err(e) = &result {
            warn_event(&*self.events, &managed_seed, reasons::RECONCILE_ERROR, RECONCILE_ACTION, e.to_string())
                .await;
        }

        if let Err(e) = self.write_status(&mut managed_seed, conditions).await {
            warn!("Failed to update status of ManagedSeed {}: {}", key, e);
            if result.is_ok() {
                return Err(e);
            }
        }
        result
    }

    async fn write_status(&self, managed_seed: &mut ManagedSeed, conditions: SeedConditions) -> Result<bool> {
        let generation = managed_seed.metadata.generation;
        let installed = conditions.installed;
        let updates = [conditions.shoot_reconciled, conditions.seed_registered];
        patch_conditions(&self.garden, managed_seed, |ms: &mut ManagedSeed| {
            let status = ms.status.get_or_insert_with(ManagedSeedStatus::default);
            status.conditions = merge_conditions(&status.conditions, &updates);
            if installed {
                status.observed_generation = generation;
            }
        })
        .await
    }

    async fn install(
        &self,
        managed_seed: &ManagedSeed,
        shoot: Option<&Shoot>,
        shoot_key: &ObjectKey,
        conditions: &mut SeedConditions,
    ) -> Result<Action> {
        let Some(shoot) = shoot else {
            conditions.shoot_reconciled(
                ConditionStatus::False,
                "ShootNotFound",
                &format!("Shoot {} does not exist", shoot_key),
            );
            return Ok(self.wait());
        };
        if !shoot.is_reconciled() {
            conditions.shoot_reconciled(
                ConditionStatus::False,
                "ShootNotReconciled",
                &format!("Waiting for shoot {} to be reconciled", shoot_key),
            );
            return Ok(self.wait());
        }
        conditions.shoot_reconciled(
            ConditionStatus::True,
            "ShootReconciled",
            &format!("Shoot {} has been reconciled", shoot_key),
        );

        let Some(target) = self.shoots.connect(shoot_key).await? else {
            info!("Kubeconfig of shoot {} is not available yet", shoot_key);
            return Ok(self.wait());
        };

        ensure_namespace(&target, GARDEN_NAMESPACE, &BTreeMap::new(), &BTreeMap::new()).await?;
        if managed_seed.bootstrap() != Bootstrap::None {
            let source = ResourceRef::new(
                ClusterRole::Garden,
                self.config.managed_seed.bootstrap_kubeconfig_secret.key(),
            );
            let destination = ResourceRef::new(ClusterRole::Shoot, bootstrap_secret_key());
            mirror_secret(&self.garden, &source, &target, &destination).await?;
        }

        let values = gardenlet_values(managed_seed, &self.config.managed_seed);
        let release = self
            .renderer
            .render(&self.chart, GARDENLET_BUNDLE_NAME, GARDEN_NAMESPACE, &values)?;
        bundle::create(
            &target,
            &Bundle {
                namespace: GARDEN_NAMESPACE.to_string(),
                name: GARDENLET_BUNDLE_NAME.to_string(),
                data: release.as_secret_data(),
                ..Default::default()
            },
        )
        .await?;
        conditions.installed = true;
        info!("Gardenlet applied to shoot {}", shoot_key);

        let seed_name = managed_seed.name_any();
        if self
            .garden
            .get::<Seed>(&ObjectKey::cluster_scoped(&seed_name))
            .await?
            .is_none()
        {
            conditions.seed_registered(
                ConditionStatus::False,
                "SeedNotRegistered",
                &format!("Waiting for seed {} to be registered", seed_name),
            );
            return Ok(self.wait());
        }

        let message = format!("Seed {} has been registered", seed_name);
        if conditions.seed_registered.status != ConditionStatus::True {
            normal_event(&*self.events, managed_seed, reasons::RECONCILED, RECONCILE_ACTION, message.clone())
                .await;
        }
        conditions.seed_registered(ConditionStatus::True, "SeedRegistered", &message);
        Ok(Action::requeue(self.config.managed_seed.sync_period))
    }

    /// Tears down the seed registration and the gardenlet. Each step waits
    /// for its predecessor to be gone before moving on.
    async fn delete(
        &self,
        managed_seed: &mut ManagedSeed,
        shoot: Option<&Shoot>,
        shoot_key: &ObjectKey,
    ) -> Result<Action> {
        if !has_finalizer(managed_seed, finalizers::MANAGED_SEED) {
            return Ok(Action::await_change());
        }

        let seed_key = ObjectKey::cluster_scoped(&managed_seed.name_any());
        if self.garden.delete::<Seed>(&seed_key).await? != DeleteOutcome::NotFound {
            info!("Waiting for seed {} to be deleted", seed_key);
            return Ok(self.wait());
        }

        // A connect error keeps the finalizer; only a missing shoot or
        // kubeconfig skips the cleanup in the shoot.
        if shoot.is_some() {
            match self.shoots.connect(shoot_key).await? {
                Some(target) => {
                    if bundle::delete(&target, GARDEN_NAMESPACE, GARDENLET_BUNDLE_NAME).await? {
                        info!("Waiting for gardenlet in shoot {} to be deleted", shoot_key);
                        return Ok(self.wait());
                    }
                    bundle::delete_secret(&target, GARDEN_NAMESPACE, GARDENLET_BUNDLE_NAME).await?;
                    delete_secret(&target, &bootstrap_secret_key()).await?;
                }
                None => info!("Shoot {} has no kubeconfig, skipping cleanup in the shoot", shoot_key),
            }
        }

        remove_finalizer(&self.garden, managed_seed, finalizers::MANAGED_SEED).await?;
        normal_event(
            &*self.events,
            managed_seed,
            reasons::DELETED,
            DELETE_ACTION,
            format!("Seed {} has been deleted", seed_key),
        )
        .await;
        Ok(Action::await_change())
    }
}

impl ManagedSeedReconciler<KubeStore, KubeShootConnector> {
    /// Watches ManagedSeeds in the garden namespace whose shoot runs on this
    /// seed, and the seeds they register.
    pub async fn run(self) -> anyhow::Result<()> {
        let namespace = self.config.garden_namespace.clone();
        let managed_seeds: Api<ManagedSeed> = Api::namespaced(self.garden.client().clone(), &namespace);
        let seeds: Api<Seed> = Api::all(self.garden.client().clone());
        let policy = TriggerPolicy::Jittered {
            period: self.config.managed_seed.sync_jitter_period,
            jitter_updates: self.config.managed_seed.jitter_updates,
        };
        let filter = ShootResponsibility::new(self.garden.clone(), self.config.seed_name.clone());
        let concurrency = self.config.managed_seed.concurrent_syncs;

        let (reader, writer) = reflector::store();
        let events = watcher(managed_seeds, watcher::Config::default())
            .default_backoff()
            .reflect(writer);
        let triggers = trigger_stream(events, policy, Arc::new(filter));
        let seed_events = watcher(seeds, watcher::Config::default())
            .default_backoff()
            .touched_objects();

        Controller::for_stream(triggers, reader)
            .with_config(controller::Config::default().concurrency(concurrency))
            .watches_stream(seed_events, move |seed: Seed| {
                Some(ObjectRef::<ManagedSeed>::new(&seed.name_any()).within(&namespace))
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::new(self))
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled ManagedSeed: {:?}", o),
                    Err(e) => warn!("ManagedSeed reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(
    managed_seed: Arc<ManagedSeed>,
    ctx: Arc<ManagedSeedReconciler<KubeStore, KubeShootConnector>>,
) -> Result<Action> {
    let key = ObjectKey::of(managed_seed.as_ref());
    let action = guarded(ctx.config.reconcile_timeout, ctx.reconcile(&key)).await?;
    ctx.backoff.reset(&key);
    Ok(action)
}

fn error_policy(
    managed_seed: Arc<ManagedSeed>,
    error: &SeedletError,
    ctx: Arc<ManagedSeedReconciler<KubeStore, KubeShootConnector>>,
) -> Action {
    error_action(error, &ObjectKey::of(managed_seed.as_ref()), &ctx.backoff)
}
