// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Event filtering and enqueue timing for the controllers.
//!
//! Watch events are filtered by a [`ResponsibilityFilter`], then
//! [`enqueue_delay`] decides whether and when the object is handed to the
//! controller. Delayed triggers sleep on their own task, so no reconcile
//! worker is held while waiting.

use crate::types::{BackupBucket, ControllerInstallation, ManagedSeed, ObjectKey};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// How watch events become reconcile triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Every create and delete; updates only when the generation moved or
    /// the object is being deleted.
    GenerationChanged,
    /// Spreads work over `period` to smooth load across a large fleet.
    Jittered { period: Duration, jitter_updates: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// First sighting, including the initial list after a restart
    Create,
    Update,
    Delete,
}

/// What the scheduler needs to know about one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub kind: EventKind,
    pub generation: i64,
    pub observed_generation: i64,
    pub deleting: bool,
    /// Generation carried by the previous event for the same object
    pub previous_generation: Option<i64>,
}

impl Trigger {
    fn is_new_or_deleting(&self) -> bool {
        self.deleting || self.generation == 1
    }

    fn generation_changed(&self) -> bool {
        self.generation != self.observed_generation
    }
}

/// A uniformly random delay in `[0, period)`.
pub fn random_delay(period: Duration) -> Duration {
    if period.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..period)
}

/// When to enqueue the object for `trigger`: `None` drops the event,
/// `Some(Duration::ZERO)` enqueues immediately.
pub fn enqueue_delay(policy: &TriggerPolicy, trigger: &Trigger) -> Option<Duration> {
    match (policy, trigger.kind) {
        (_, EventKind::Delete) => Some(Duration::ZERO),
        (TriggerPolicy::GenerationChanged, EventKind::Create) => Some(Duration::ZERO),
        (TriggerPolicy::GenerationChanged, EventKind::Update) => {
            let moved = trigger.previous_generation != Some(trigger.generation);
            (moved || trigger.deleting).then_some(Duration::ZERO)
        }
        (TriggerPolicy::Jittered { period, jitter_updates }, EventKind::Create) => {
            if trigger.is_new_or_deleting() {
                Some(Duration::ZERO)
            } else if trigger.generation_changed() && !jitter_updates {
                Some(Duration::ZERO)
            } else {
                // changed generation with jitter, or a plain resync after a restart
                Some(random_delay(*period))
            }
        }
        (TriggerPolicy::Jittered { period, jitter_updates }, EventKind::Update) => {
            if trigger.previous_generation == Some(trigger.generation) && !trigger.deleting {
                return None;
            }
            if !trigger.generation_changed() {
                return None;
            }
            if trigger.is_new_or_deleting() || !jitter_updates {
                return Some(Duration::ZERO);
            }
            Some(random_delay(*period))
        }
    }
}

/// Objects whose status records the last generation acted upon.
pub trait ObservesGeneration: Resource {
    fn observed_generation(&self) -> Option<i64>;
}

impl ObservesGeneration for BackupBucket {
    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }
}

impl ObservesGeneration for ManagedSeed {
    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }
}

impl ObservesGeneration for ControllerInstallation {
    fn observed_generation(&self) -> Option<i64> {
        None
    }
}

/// Decides whether this process is responsible for an object.
#[async_trait]
pub trait ResponsibilityFilter<K>: Send + Sync {
    async fn is_responsible(&self, obj: &K) -> bool;
}

/// Filter from a plain predicate over the object.
pub struct PredicateFilter<F>(pub F);

#[async_trait]
impl<K, F> ResponsibilityFilter<K> for PredicateFilter<F>
where
    K: Send + Sync,
    F: Fn(&K) -> bool + Send + Sync,
{
    async fn is_responsible(&self, obj: &K) -> bool {
        (self.0)(obj)
    }
}

/// Tracks the last generation seen per object and classifies events.
#[derive(Default)]
struct GenerationTracker {
    seen: HashMap<ObjectKey, i64>,
}

impl GenerationTracker {
    fn observe<K: ObservesGeneration>(&mut self, obj: &K, initial: bool, deleted: bool) -> Trigger {
        let key = ObjectKey::of(obj);
        let generation = obj.meta().generation.unwrap_or_default();
        let previous_generation = if deleted {
            self.seen.remove(&key)
        } else {
            self.seen.insert(key, generation)
        };

        let kind = match (deleted, initial, previous_generation) {
            (true, _, _) => EventKind::Delete,
            (false, true, _) | (false, false, None) => EventKind::Create,
            (false, false, Some(_)) => EventKind::Update,
        };

        Trigger {
            kind,
            generation,
            observed_generation: obj.observed_generation().unwrap_or_default(),
            deleting: obj.meta().deletion_timestamp.is_some(),
            previous_generation,
        }
    }
}

/// Turns a (reflected) watch event stream into a trigger stream for
/// `Controller::for_stream`. Events are filtered for responsibility and
/// forwarded now, later or not at all according to `policy`.
pub fn trigger_stream<K, S, F>(
    events: S,
    policy: TriggerPolicy,
    filter: Arc<F>,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send + 'static
where
    K: ObservesGeneration + Clone + Send + Sync + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
    F: ResponsibilityFilter<K> + ?Sized + 'static,
{
    let (tx, rx) = mpsc::unbounded();

    tokio::spawn(async move {
        let mut tracker = GenerationTracker::default();
        let mut events = std::pin::pin!(events);

        while let Some(event) = events.next().await {
            let (obj, initial, deleted) = match event {
                Ok(watcher::Event::Apply(obj)) => (obj, false, false),
                Ok(watcher::Event::InitApply(obj)) => (obj, true, false),
                Ok(watcher::Event::Delete(obj)) => (obj, false, true),
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => continue,
                Err(e) => {
                    if tx.unbounded_send(Err(e)).is_err() {
                        return;
                    }
                    continue;
                }
            };

            let trigger = tracker.observe(&obj, initial, deleted);
            if !filter.is_responsible(&obj).await {
                trace!("Ignoring {}: not responsible", obj.name_any());
                continue;
            }

            match enqueue_delay(&policy, &trigger) {
                None => trace!("Dropping {:?} event for {}", trigger.kind, obj.name_any()),
                Some(delay) if delay.is_zero() => {
                    if tx.unbounded_send(Ok(obj)).is_err() {
                        return;
                    }
                }
                Some(delay) => {
                    debug!("Enqueueing {} in {:?}", obj.name_any(), delay);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.unbounded_send(Ok(obj));
                    });
                }
            }
        }
    });

    rx
}
