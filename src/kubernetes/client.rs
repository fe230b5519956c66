// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Clients for the garden, seed and shoot clusters

use super::store::{KubeStore, ObjectStore};
use crate::config::Config;
use crate::error::{Result, SeedletError};
use crate::types::ObjectKey;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::{debug, info, instrument};

/// Data key of kubeconfig secrets
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Client for the garden cluster: from `garden_kubeconfig` when set, the
/// in-cluster or default client otherwise.
pub async fn create_garden_client(config: &Config) -> Result<Client> {
    match &config.garden_kubeconfig {
        Some(path) => {
            info!("Connecting to garden cluster with kubeconfig {}", path);
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                SeedletError::KubeconfigError(format!("Failed to read {}: {}", path, e))
            })?;
            client_from_kubeconfig(kubeconfig).await
        }
        None => Ok(Client::try_default().await?),
    }
}

/// Create a Kubernetes client from kubeconfig text
pub async fn create_client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| SeedletError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;
    client_from_kubeconfig(kubeconfig_parsed).await
}

async fn client_from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Client> {
    let client_config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| SeedletError::KubeconfigError(format!("Failed to create config: {}", e)))?;

    Client::try_from(client_config)
        .map_err(|e| SeedletError::KubeconfigError(format!("Failed to create client: {}", e)))
}

/// Name of the garden secret holding the admin kubeconfig of a shoot
pub fn shoot_kubeconfig_secret(shoot: &ObjectKey) -> ObjectKey {
    ObjectKey {
        namespace: shoot.namespace.clone(),
        name: format!("{}.kubeconfig", shoot.name),
    }
}

/// Reads the kubeconfig stored in the secret at `key`. `None` when the
/// secret does not exist yet.
#[instrument(skip(store))]
pub async fn read_kubeconfig<S: ObjectStore>(store: &S, key: &ObjectKey) -> Result<Option<String>> {
    let Some(secret) = store.get::<Secret>(key).await? else {
        debug!("Kubeconfig secret {} not found", key);
        return Ok(None);
    };

    let Some(data) = secret.data.as_ref().and_then(|d| d.get(KUBECONFIG_KEY)) else {
        return Err(SeedletError::KubeconfigError(format!(
            "Kubeconfig secret {} does not contain '{}' key",
            key, KUBECONFIG_KEY
        )));
    };

    String::from_utf8(data.0.clone())
        .map(Some)
        .map_err(|e| SeedletError::KubeconfigError(format!("Failed to decode kubeconfig {}: {}", key, e)))
}

/// Opens a store on a shoot cluster.
#[async_trait]
pub trait ShootConnector: Send + Sync {
    type Store: ObjectStore;

    /// `None` while the shoot has no kubeconfig yet.
    async fn connect(&self, shoot: &ObjectKey) -> Result<Option<Self::Store>>;
}

/// Connects to shoots with the kubeconfig secret published in the garden.
#[derive(Clone)]
pub struct KubeShootConnector {
    garden: KubeStore,
}

impl KubeShootConnector {
    pub fn new(garden: KubeStore) -> Self {
        Self { garden }
    }
}

#[async_trait]
impl ShootConnector for KubeShootConnector {
    type Store = KubeStore;

    #[instrument(skip(self))]
    async fn connect(&self, shoot: &ObjectKey) -> Result<Option<KubeStore>> {
        let Some(kubeconfig) = read_kubeconfig(&self.garden, &shoot_kubeconfig_secret(shoot)).await? else {
            return Ok(None);
        };
        let client = create_client_from_kubeconfig(&kubeconfig).await?;
        Ok(Some(KubeStore::new(client)))
    }
}
