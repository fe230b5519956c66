// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock HTTP service for kube clients and an in-memory
//! object store with API server semantics.

use crate::clock::Clock;
use crate::error::{Result, SeedletError};
use crate::events::EventPublisher;
use crate::kubernetes::patch::apply_merge_patch;
use crate::kubernetes::store::{DeleteOutcome, ObjectStore, StoreObject};
use crate::render::{ChartRenderer, RenderedRelease};
use crate::types::ObjectKey;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use http::{Request, Response};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::runtime::events::EventType;
use kube::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for DELETE requests matching the exact path
    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();
        responses
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, not_found_json("object", &path)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

pub fn api_error(code: u16, reason: &str, message: &str) -> SeedletError {
    SeedletError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

/// Store operations, for error injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Patch,
    PatchStatus,
    Delete,
}

type StoreKey = (String, Option<String>, String);

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<StoreKey, Value>,
    resource_version: u64,
    writes: Vec<(String, Verb)>,
    failures: HashSet<(String, Verb)>,
}

/// In-memory `ObjectStore` that behaves like an API server for the parts the
/// controllers rely on: resourceVersion preconditions, generation bumps on
/// spec changes, status only written through the status verb, and deletion
/// blocked by finalizers. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

fn type_key<K: StoreObject>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn store_key<K: StoreObject>(key: &ObjectKey) -> StoreKey {
    (type_key::<K>(), key.namespace.clone(), key.name.clone())
}

fn matches_selector(obj: &Value, selector: &str) -> bool {
    let labels = &obj["metadata"]["labels"];
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels[k.trim()].as_str() == Some(v.trim()),
            None => !labels[term.trim()].is_null(),
        })
}

fn has_finalizers(obj: &Value) -> bool {
    obj["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|f| !f.is_empty())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object without counting it as a write. Status is kept.
    pub fn insert<K: StoreObject>(&self, obj: &K) -> K {
        let mut state = self.state.lock().unwrap();
        state.resource_version += 1;
        let mut value = serde_json::to_value(obj).unwrap();
        value["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
        if value["metadata"]["generation"].is_null() {
            value["metadata"]["generation"] = json!(1);
        }
        let key = store_key::<K>(&ObjectKey::of(obj));
        state.objects.insert(key, value.clone());
        serde_json::from_value(value).unwrap()
    }

    /// Reads an object without going through the trait.
    pub fn fetch<K: StoreObject>(&self, key: &ObjectKey) -> Option<K> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&store_key::<K>(key))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn contains<K: StoreObject>(&self, key: &ObjectKey) -> bool {
        self.fetch::<K>(key).is_some()
    }

    /// Removes an object regardless of finalizers.
    pub fn remove<K: StoreObject>(&self, key: &ObjectKey) {
        self.state.lock().unwrap().objects.remove(&store_key::<K>(key));
    }

    /// Makes every `verb` call on objects of type `K` fail with a 500.
    pub fn fail<K: StoreObject>(&self, verb: Verb) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((type_key::<K>(), verb));
    }

    pub fn heal<K: StoreObject>(&self, verb: Verb) {
        self.state
            .lock()
            .unwrap()
            .failures
            .remove(&(type_key::<K>(), verb));
    }

    /// Number of write calls (create, patch, status patch, delete)
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    /// Number of write calls against objects of type `K`, excluding status patches
    pub fn writes_of<K: StoreObject>(&self) -> usize {
        let kind = type_key::<K>();
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(k, v)| *k == kind && *v != Verb::PatchStatus)
            .count()
    }

    pub fn reset_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    fn check(&self, state: &MemoryState, kind: &str, verb: Verb) -> Result<()> {
        if state.failures.contains(&(kind.to_string(), verb)) {
            return Err(api_error(500, "InternalError", "injected failure"));
        }
        Ok(())
    }

    fn apply_patch<K: StoreObject>(
        &self,
        key: &ObjectKey,
        patch: &Value,
        verb: Verb,
    ) -> Result<K> {
        let mut state = self.state.lock().unwrap();
        let kind = type_key::<K>();
        self.check(&state, &kind, verb)?;
        state.writes.push((kind, verb));
        state.resource_version += 1;
        let rv = state.resource_version.to_string();

        let skey = store_key::<K>(key);
        let Some(current) = state.objects.get(&skey).cloned() else {
            return Err(api_error(404, "NotFound", &format!("{} not found", key)));
        };

        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if current["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(api_error(409, "Conflict", "the object has been modified"));
            }
        }

        let mut effective = patch.clone();
        if let Value::Object(map) = &mut effective {
            match verb {
                Verb::PatchStatus => {
                    map.retain(|k, _| k == "status");
                }
                _ => {
                    map.remove("status");
                }
            }
            if let Some(Value::Object(meta)) = map.get_mut("metadata") {
                meta.remove("resourceVersion");
            }
        }

        let mut updated = current.clone();
        apply_merge_patch(&mut updated, &effective);
        if updated.get("spec") != current.get("spec") {
            let generation = current["metadata"]["generation"].as_i64().unwrap_or(1);
            updated["metadata"]["generation"] = json!(generation + 1);
        }
        updated["metadata"]["resourceVersion"] = json!(rv);

        if !updated["metadata"]["deletionTimestamp"].is_null() && !has_finalizers(&updated) {
            state.objects.remove(&skey);
        } else {
            state.objects.insert(skey, updated.clone());
        }

        Ok(serde_json::from_value(updated)?)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        {
            let state = self.state.lock().unwrap();
            self.check(&state, &type_key::<K>(), Verb::Get)?;
        }
        Ok(self.fetch(key))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>> {
        let state = self.state.lock().unwrap();
        let kind = type_key::<K>();
        self.check(&state, &kind, Verb::List)?;
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (namespace.is_none() || ns.as_deref() == namespace))
            .filter(|(_, v)| label_selector.map_or(true, |s| matches_selector(v, s)))
            .map(|(_, v)| Ok(serde_json::from_value(v.clone())?))
            .collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let mut state = self.state.lock().unwrap();
        let kind = type_key::<K>();
        self.check(&state, &kind, Verb::Create)?;
        state.writes.push((kind, Verb::Create));

        let key = store_key::<K>(&ObjectKey::of(obj));
        if state.objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists", "object already exists"));
        }

        state.resource_version += 1;
        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
        value["metadata"]["generation"] = json!(1);
        value["metadata"]["uid"] = json!(format!("uid-{}", state.resource_version));
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn patch<K: StoreObject>(&self, key: &ObjectKey, patch: &Value) -> Result<K> {
        self.apply_patch(key, patch, Verb::Patch)
    }

    async fn patch_status<K: StoreObject>(&self, key: &ObjectKey, patch: &Value) -> Result<K> {
        self.apply_patch(key, patch, Verb::PatchStatus)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        let kind = type_key::<K>();
        self.check(&state, &kind, Verb::Delete)?;
        state.writes.push((kind, Verb::Delete));

        let skey = store_key::<K>(key);
        let Some(current) = state.objects.get(&skey).cloned() else {
            return Ok(DeleteOutcome::NotFound);
        };

        if !has_finalizers(&current) {
            state.objects.remove(&skey);
            return Ok(DeleteOutcome::Deleted);
        }

        if current["metadata"]["deletionTimestamp"].is_null() {
            state.resource_version += 1;
            let rv = state.resource_version.to_string();
            let mut updated = current;
            updated["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
            updated["metadata"]["resourceVersion"] = json!(rv);
            state.objects.insert(skey, updated);
        }
        Ok(DeleteOutcome::Pending)
    }
}

/// A clock that only moves when told to.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(
            DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Event publisher that keeps everything it was given.
#[derive(Default, Clone)]
pub struct RecordingEvents {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| e.warning).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: resource_ref.name.clone().unwrap_or_default(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}

/// Renderer that echoes its inputs as a single manifest, or fails on demand.
#[derive(Default, Clone)]
pub struct FakeRenderer {
    pub fail: bool,
    calls: Arc<Mutex<Vec<(String, String, Value)>>>,
}

impl FakeRenderer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// (release, namespace, values) of every render call
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChartRenderer for FakeRenderer {
    fn render(
        &self,
        chart: &str,
        release_name: &str,
        namespace: &str,
        values: &Value,
    ) -> Result<RenderedRelease> {
        self.calls.lock().unwrap().push((
            release_name.to_string(),
            namespace.to_string(),
            values.clone(),
        ));
        if self.fail {
            return Err(SeedletError::RenderError("chart cannot be rendered".to_string()));
        }
        Ok(RenderedRelease {
            name: release_name.to_string(),
            namespace: namespace.to_string(),
            manifests: BTreeMap::from([(
                "chart/templates/all.yaml".to_string(),
                format!("{}\nvalues: {}", chart, values),
            )]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;

    fn cm(name: &str, finalizers: &[&str]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("garden".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_memory_store_create_twice_conflicts() {
        let store = MemoryStore::new();
        store.create(&cm("a", &[])).await.unwrap();

        let err = store.create(&cm("a", &[])).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_memory_store_delete_waits_for_finalizers() {
        let store = MemoryStore::new();
        store.insert(&cm("a", &["x"]));
        let key = ObjectKey::namespaced("garden", "a");

        assert_eq!(store.delete::<ConfigMap>(&key).await.unwrap(), DeleteOutcome::Pending);
        let pending: ConfigMap = store.fetch(&key).unwrap();
        assert!(pending.metadata.deletion_timestamp.is_some());

        store
            .patch::<ConfigMap>(&key, &json!({"metadata": {"finalizers": []}}))
            .await
            .unwrap();
        assert!(!store.contains::<ConfigMap>(&key));
    }

    #[tokio::test]
    async fn test_memory_store_list_by_label() {
        let store = MemoryStore::new();
        store.insert(&cm("a", &[]));
        store.insert(&cm("b", &[]));

        let found: Vec<ConfigMap> = store.list(Some("garden"), Some("app=b")).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_any(), "b");
    }

    #[tokio::test]
    async fn test_memory_store_injected_failure() {
        let store = MemoryStore::new();
        store.fail::<ConfigMap>(Verb::Get);

        let res = store.get::<ConfigMap>(&ObjectKey::namespaced("garden", "a")).await;
        assert!(res.is_err());

        store.heal::<ConfigMap>(Verb::Get);
        assert!(store
            .get::<ConfigMap>(&ObjectKey::namespaced("garden", "a"))
            .await
            .unwrap()
            .is_none());
    }
}
