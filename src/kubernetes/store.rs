// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed object store abstraction over one cluster's API server

use crate::error::Result;
use crate::types::ObjectKey;
use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object is gone.
    Deleted,
    /// Deletion was accepted but finalizers keep the object around.
    Pending,
    /// The object did not exist.
    NotFound,
}

/// Picks the right `Api` constructor for a resource scope.
pub trait ApiScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>;
}

impl ApiScope for NamespaceResourceScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl ApiScope for ClusterResourceScope {
    fn api<K>(client: Client, _namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        Api::all(client)
    }
}

/// Any typed Kubernetes object the controllers read or write.
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

impl<K> StoreObject for K
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    K::Scope: ApiScope,
{
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        <K::Scope as ApiScope>::api::<K>(client, namespace)
    }
}

/// CRUD access to one cluster. Patches are JSON merge patches.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>>;

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>>;

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K>;

    async fn patch<K: StoreObject>(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<K>;

    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<K>;

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome>;
}

/// `ObjectStore` backed by a real API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        let api = K::api(self.client.clone(), key.namespace());
        Ok(api.get_opt(&key.name).await?)
    }

    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>> {
        let api = K::api(self.client.clone(), namespace);
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        Ok(api.list(&lp).await?.items)
    }

    #[instrument(skip(self, obj), fields(kind = %K::kind(&()), name = %obj.name_any()))]
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let api = K::api(self.client.clone(), obj.meta().namespace.as_deref());
        let created = api.create(&PostParams::default(), obj).await?;
        debug!("Created {} {}", K::kind(&()), ObjectKey::of(&created));
        Ok(created)
    }

    #[instrument(skip(self, patch), fields(kind = %K::kind(&())))]
    async fn patch<K: StoreObject>(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<K> {
        let api = K::api(self.client.clone(), key.namespace());
        Ok(api
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    #[instrument(skip(self, patch), fields(kind = %K::kind(&())))]
    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<K> {
        let api = K::api(self.client.clone(), key.namespace());
        Ok(api
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
        let api = K::api(self.client.clone(), key.namespace());
        match api.delete(&key.name, &DeleteParams::default()).await {
            Ok(res) if res.is_left() => Ok(DeleteOutcome::Pending),
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
