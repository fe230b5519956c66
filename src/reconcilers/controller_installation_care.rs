// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Health poll for ControllerInstallations: turns the state of the
//! installation bundle in the seed into `Installed`, `Healthy` and
//! `Progressing` conditions.

use super::runtime::{error_action, guarded, ErrorBackoff};
use crate::clock::Clock;
use crate::conditions::{aggregate_bundle_health, merge_conditions};
use crate::config::Config;
use crate::constants::{labels, GARDEN_NAMESPACE};
use crate::error::{Result, SeedletError};
use crate::kubernetes::patch::patch_conditions;
use crate::kubernetes::store::{KubeStore, ObjectStore};
use crate::scheduler::{trigger_stream, PredicateFilter, TriggerPolicy};
use crate::types::{ControllerInstallation, ControllerInstallationStatus, ManagedResource, ObjectKey};
use futures::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct ControllerInstallationCareReconciler<G, S> {
    garden: G,
    seed: S,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    backoff: ErrorBackoff,
}

impl<G: ObjectStore, S: ObjectStore> ControllerInstallationCareReconciler<G, S> {
    pub fn new(garden: G, seed: S, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        let backoff = ErrorBackoff::new(&config.error_backoff);
        Self {
            garden,
            seed,
            config,
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
        if installation.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        let bundle_key = ObjectKey::namespaced(GARDEN_NAMESPACE, &installation.name_any());
        let now = self.clock.now();

        let (conditions, outcome) = match self.seed.get::<ManagedResource>(&bundle_key).await {
            Ok(Some(mr)) => (
                aggregate_bundle_health(installation.conditions(), Ok(&mr), now),
                Ok(Action::requeue(self.config.controller_installation_care.sync_period)),
            ),
            Ok(None) => {
                let message = format!("Failed to get ManagedResource {:?}: not found", bundle_key.to_string());
                info!("ManagedResource {} was not found yet, requeuing", bundle_key);
                (
                    aggregate_bundle_health(installation.conditions(), Err(&message), now),
                    Ok(Action::requeue(self.config.controller_installation_care.not_found_requeue)),
                )
            }
            Err(e) => {
                let message = format!("Failed to get ManagedResource {:?}: {}", bundle_key.to_string(), e);
                (
                    aggregate_bundle_health(installation.conditions(), Err(&message), now),
                    Err(e),
                )
            }
        };

        let updates = conditions.into_vec();
        patch_conditions(&self.garden, &mut installation, |i: &mut ControllerInstallation| {
            let status = i
                .status
                .get_or_insert_with(ControllerInstallationStatus::default);
            status.conditions = merge_conditions(&status.conditions, &updates);
        })
        .await?;

        outcome
    }
}

impl ControllerInstallationCareReconciler<KubeStore, KubeStore> {
    /// Polls ControllerInstallations of this seed and reacts to changes of
    /// their bundles.
    pub async fn run(self) -> anyhow::Result<()> {
        let installations: Api<ControllerInstallation> = Api::all(self.garden.client().clone());
        let bundles: Api<ManagedResource> = Api::namespaced(self.seed.client().clone(), GARDEN_NAMESPACE);
        let seed_name = self.config.seed_name.clone();
        let concurrency = self.config.controller_installation_care.concurrent_syncs;

        let (reader, writer) = reflector::store();
        let events = watcher(installations, watcher::Config::default())
            .default_backoff()
            .reflect(writer);
        let filter = PredicateFilter(move |i: &ControllerInstallation| i.spec.seed_ref.name == seed_name);
        let triggers = trigger_stream(events, TriggerPolicy::GenerationChanged, Arc::new(filter));
        let bundle_events = watcher(
            bundles,
            watcher::Config::default().labels(labels::CONTROLLER_INSTALLATION_NAME),
        )
        .default_backoff()
        .touched_objects();

        Controller::for_stream(triggers, reader)
            .with_config(controller::Config::default().concurrency(concurrency))
            .watches_stream(bundle_events, |mr: ManagedResource| {
                mr.labels()
                    .get(labels::CONTROLLER_INSTALLATION_NAME)
                    .map(|name| ObjectRef::<ControllerInstallation>::new(name))
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::new(self))
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Checked ControllerInstallation health: {:?}", o),
                    Err(e) => warn!("ControllerInstallation care error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(
    installation: Arc<ControllerInstallation>,
    ctx: Arc<ControllerInstallationCareReconciler<KubeStore, KubeStore>>,
) -> Result<Action> {
    let key = ObjectKey::of(installation.as_ref());
    let action = guarded(ctx.config.reconcile_timeout, ctx.reconcile(&key)).await?;
    ctx.backoff.reset(&key);
    Ok(action)
}

fn error_policy(
    installation: Arc<ControllerInstallation>,
    error: &SeedletError,
    ctx: Arc<ControllerInstallationCareReconciler<KubeStore, KubeStore>>,
) -> Action {
    error_action(error, &ObjectKey::of(installation.as_ref()), &ctx.backoff)
}
