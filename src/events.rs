// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes Event recording. Publishing never fails a reconciliation:
//! errors are logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Object reference used as the event target
pub fn event_ref<K: Resource<DynamicType = ()>>(obj: &K) -> ObjectReference {
    obj.object_ref(&())
}

/// Shorthand for a warning event on `obj`.
pub async fn warn_event<K, E>(events: &E, obj: &K, reason: &str, action: &str, note: String)
where
    K: Resource<DynamicType = ()>,
    E: EventPublisher + ?Sized,
{
    events
        .publish(&event_ref(obj), EventType::Warning, reason, action, Some(note))
        .await;
}

/// Shorthand for a normal event on `obj`.
pub async fn normal_event<K, E>(events: &E, obj: &K, reason: &str, action: &str, note: String)
where
    K: Resource<DynamicType = ()>,
    E: EventPublisher + ?Sized,
{
    events
        .publish(&event_ref(obj), EventType::Normal, reason, action, Some(note))
        .await;
}
