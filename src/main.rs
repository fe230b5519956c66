// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use seedlet::clock::{Clock, SystemClock};
use seedlet::config::Config;
use seedlet::constants::OPERATOR_NAME;
use seedlet::events::{EventPublisher, KubeEventPublisher};
use seedlet::kubernetes::{create_garden_client, wait_for_crd, KubeShootConnector, KubeStore};
use seedlet::reconcilers::{
    BackupBucketReconciler, ControllerInstallationCareReconciler, ControllerInstallationReconciler,
    ManagedSeedReconciler, DEFAULT_GARDENLET_CHART,
};
use seedlet::render::{ChartRenderer, TemplateRenderer};
use seedlet::types::{ExtensionBackupBucket, ManagedResource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting seedlet");

    let config = Arc::new(Config::from_env()?);
    info!(
        "Configuration loaded: seed_name={}, garden_namespace={}",
        config.seed_name, config.garden_namespace
    );

    let seed_client = Client::try_default()
        .await
        .context("Failed to create seed client")?;
    let garden_client = create_garden_client(&config)
        .await
        .context("Failed to create garden client")?;
    info!("Connected to garden and seed clusters");

    info!("Waiting for extension and ManagedResource CRDs to become available...");
    wait_for_crd::<ExtensionBackupBucket>(&seed_client).await?;
    wait_for_crd::<ManagedResource>(&seed_client).await?;

    let gardenlet_chart = match &config.managed_seed.chart_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read gardenlet chart {}", path))?,
        None => DEFAULT_GARDENLET_CHART.to_string(),
    };

    let garden = KubeStore::new(garden_client.clone());
    let seed = KubeStore::new(seed_client);
    let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(garden_client, OPERATOR_NAME));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let renderer: Arc<dyn ChartRenderer> = Arc::new(TemplateRenderer);

    let backup_buckets = BackupBucketReconciler::new(
        garden.clone(),
        seed.clone(),
        config.clone(),
        events.clone(),
        clock.clone(),
    );
    let installations = ControllerInstallationReconciler::new(
        garden.clone(),
        seed.clone(),
        config.clone(),
        renderer.clone(),
        clock.clone(),
    );
    let installation_care =
        ControllerInstallationCareReconciler::new(garden.clone(), seed, config.clone(), clock.clone());
    let managed_seeds = ManagedSeedReconciler::new(
        garden.clone(),
        KubeShootConnector::new(garden),
        config,
        renderer,
        gardenlet_chart,
        events,
        clock,
    );

    info!("Starting controllers...");

    tokio::try_join!(
        backup_buckets.run(),
        installations.run(),
        installation_care.run(),
        managed_seeds.run()
    )?;

    warn!("All controllers stopped");
    Ok(())
}
