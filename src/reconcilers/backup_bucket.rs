// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! BackupBucket reconciler: drives a garden BackupBucket through its
//! lifecycle by mirroring its credentials into the seed, applying the
//! extension BackupBucket and reporting the extension's result back.

use super::runtime::{error_action, guarded, ErrorBackoff};
use crate::clock::Clock;
use crate::config::Config;
use crate::constants::{
    annotations, finalizers, operations, reasons, BACKUP_BUCKET_SECRET_PREFIX,
    GENERATED_BACKUP_BUCKET_SECRET_PREFIX,
};
use crate::error::{Result, SeedletError};
use crate::events::{normal_event, warn_event, EventPublisher};
use crate::kubernetes::finalizers::{add_finalizer, has_finalizer, remove_finalizer};
use crate::kubernetes::patch::{create_or_merge_patch, patch_status};
use crate::kubernetes::store::{DeleteOutcome, KubeStore, ObjectStore};
use crate::lifecycle::{last_error_from, mark_error, mark_started, mark_succeeded};
use crate::scheduler::{trigger_stream, PredicateFilter, TriggerPolicy};
use crate::sync::{delete_secret, mirror_from, reflect_secret, release_secret};
use crate::types::{
    BackupBucket, BackupBucketStatus, ClusterRole, ExtensionBackupBucket,
    ExtensionBackupBucketSpec, LastError, LastOperationState, ObjectKey, ResourceRef,
    SecretReference,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const RECONCILE_ACTION: &str = "Reconcile";
const DELETE_ACTION: &str = "Delete";

pub struct BackupBucketReconciler<G, S> {
    garden: G,
    seed: S,
    config: Arc<Config>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    backoff: ErrorBackoff,
}

/// Outcome of looking at the extension BackupBucket.
enum ExtensionState {
    /// Absent, outdated or failed: apply it and wait for its next status
    MustApply,
    /// The extension has not reported anything yet
    Pending,
    Failed,
    Succeeded(Box<ExtensionBackupBucket>),
}

fn mirror_secret_name(bucket: &str) -> String {
    format!("{}{}", BACKUP_BUCKET_SECRET_PREFIX, bucket)
}

fn generated_secret_name(bucket: &str) -> String {
    format!("{}{}", GENERATED_BACKUP_BUCKET_SECRET_PREFIX, bucket)
}

impl<G: ObjectStore, S: ObjectStore> BackupBucketReconciler<G, S> {
    pub fn new(
        garden: G,
        seed: S,
        config: Arc<Config>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let backoff = ErrorBackoff::new(&config.error_backoff);
        Self {
            garden,
            seed,
            config,
            events,
            clock,
            backoff,
        }
    }

    fn mirror_key(&self, bucket: &BackupBucket) -> ObjectKey {
        ObjectKey::namespaced(&self.config.garden_namespace, &mirror_secret_name(&bucket.name_any()))
    }

    /// The extension spec this bucket should have in the seed.
    fn desired_extension_spec(&self, bucket: &BackupBucket) -> ExtensionBackupBucketSpec {
        ExtensionBackupBucketSpec {
            type_: bucket.spec.provider.type_.clone(),
            provider_config: bucket.spec.provider_config.clone(),
            region: bucket.spec.provider.region.clone(),
            secret_ref: SecretReference {
                name: mirror_secret_name(&bucket.name_any()),
                namespace: self.config.garden_namespace.clone(),
            },
        }
    }

    #[instrument(skip(self), fields(bucket = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(mut bucket) = self.garden.get::<BackupBucket>(key).await? else {
            debug!("BackupBucket {} is gone", key);
            return Ok(Action::await_change());
        };
        if !bucket.is_scheduled_on(&self.config.seed_name) {
            debug!("BackupBucket {} is not scheduled on this seed", key);
            return Ok(Action::await_change());
        }

        if bucket.metadata.deletion_timestamp.is_some() {
            self.delete(&mut bucket).await
        } else {
            self.apply(&mut bucket).await
        }
    }

    async fn apply(&self, bucket: &mut BackupBucket) -> Result<Action> {
        let was_succeeded = bucket.last_operation().is_some_and(|op| op.is_succeeded());

        add_finalizer(&self.garden, bucket, finalizers::GARDENER).await?;
        mark_started(&self.garden, bucket, &*self.clock).await?;

        let mut secret = self.read_bucket_secret(bucket).await?;
        add_finalizer(&self.garden, &mut secret, finalizers::EXTERNAL_GARDENER).await?;

        // rotated credentials must reach the extension
        let mirror_key = self.mirror_key(bucket);
        let mut must_apply = self
            .seed
            .get::<Secret>(&mirror_key)
            .await?
            .is_some_and(|mirror| mirror.data != secret.data);
        mirror_from(&self.seed, &secret, &ResourceRef::new(ClusterRole::Seed, mirror_key)).await?;

        let desired = self.desired_extension_spec(bucket);
        match self.inspect_extension(bucket, &desired).await? {
            ExtensionState::MustApply => must_apply = true,
            ExtensionState::Failed => {}
            ExtensionState::Pending => {
                debug!("Extension BackupBucket {} has not reported yet", bucket.name_any());
                if !must_apply {
                    return Ok(Action::await_change());
                }
            }
            ExtensionState::Succeeded(extension) => {
                if !must_apply {
                    self.sync_generated_secret(bucket, &extension).await?;
                    mark_succeeded(
                        &self.garden,
                        bucket,
                        &*self.clock,
                        "Backup Bucket has been successfully reconciled.",
                    )
                    .await?;
                    if !was_succeeded {
                        normal_event(
                            &*self.events,
                            &*bucket,
                            reasons::RECONCILED,
                            RECONCILE_ACTION,
                            "Backup Bucket has been successfully reconciled.".to_string(),
                        )
                        .await;
                    }
                    return Ok(Action::await_change());
                }
            }
        }

        if must_apply {
            self.apply_extension(bucket, desired).await?;
        }
        // the extension's status update triggers the next pass
        Ok(Action::await_change())
    }

    async fn read_bucket_secret(&self, bucket: &mut BackupBucket) -> Result<Secret> {
        let secret_ref = &bucket.spec.secret_ref;
        let key = secret_ref.key();
        let result = match self.garden.get::<Secret>(&key).await {
            Ok(Some(secret)) => return Ok(secret),
            Ok(None) => SeedletError::InvalidReference(format!("secret {} not found", key)),
            Err(e) => e,
        };

        let note = format!(
            "Failed to get backup secret {}/{}: {}",
            secret_ref.namespace, secret_ref.name, result
        );
        warn_event(&*self.events, &*bucket, reasons::RECONCILE_ERROR, RECONCILE_ACTION, note.clone()).await;
        if result.is_terminal() {
            let last_error = last_error_from(&note, &[], self.clock.now());
            mark_error(&self.garden, bucket, &*self.clock, &note, last_error).await?;
        }
        Err(result)
    }

    /// Reads the extension bucket and records its error, if any, on `bucket`.
    async fn inspect_extension(
        &self,
        bucket: &mut BackupBucket,
        desired: &ExtensionBackupBucketSpec,
    ) -> Result<ExtensionState> {
        let key = ObjectKey::cluster_scoped(&bucket.name_any());
        let Some(extension) = self.seed.get::<ExtensionBackupBucket>(&key).await? else {
            return Ok(ExtensionState::MustApply);
        };
        if extension.spec != *desired {
            debug!("Extension BackupBucket {} is outdated", key);
            return Ok(ExtensionState::MustApply);
        }
        let Some(last_operation) = extension.last_operation() else {
            return Ok(ExtensionState::Pending);
        };

        let state = last_operation.state;
        let errored = matches!(state, LastOperationState::Error | LastOperationState::Failed);
        if !errored && extension.last_error().is_none() {
            return Ok(match state {
                LastOperationState::Succeeded => ExtensionState::Succeeded(Box::new(extension)),
                _ => ExtensionState::Pending,
            });
        }

        let policy = &self.config.downstream_retry;
        let retry = match state {
            LastOperationState::Failed => policy.reapply_on_failed,
            LastOperationState::Error => policy.reapply_on_error,
            _ => false,
        };

        let last_error = match extension.last_error() {
            Some(reported) => last_error_from(
                &format!("error during reconciliation: {}", reported.description),
                &reported.codes,
                self.clock.now(),
            ),
            None => last_error_from(
                &format!("extension state is not Succeeded but {:?}", state),
                &[],
                self.clock.now(),
            ),
        };
        warn_event(
            &*self.events,
            &*bucket,
            reasons::RECONCILE_ERROR,
            RECONCILE_ACTION,
            last_error.description.clone(),
        )
        .await;

        let mut description = last_error.description.clone();
        if retry {
            description.push_str(". Operation will be retried.");
        }
        mark_error(&self.garden, bucket, &*self.clock, &description, last_error).await?;

        Ok(if retry {
            ExtensionState::MustApply
        } else {
            ExtensionState::Failed
        })
    }

    async fn apply_extension(&self, bucket: &BackupBucket, desired: ExtensionBackupBucketSpec) -> Result<()> {
        let timestamp = self.clock.now().to_rfc3339();
        let empty = ExtensionBackupBucket::new(&bucket.name_any(), ExtensionBackupBucketSpec::default());
        let (result, _) = create_or_merge_patch(&self.seed, empty, |ext: &mut ExtensionBackupBucket| {
            let annotations = ext.annotations_mut();
            annotations.insert(annotations::OPERATION.to_string(), operations::RECONCILE.to_string());
            annotations.insert(annotations::TIMESTAMP.to_string(), timestamp);
            ext.spec = desired;
            Ok(())
        })
        .await?;
        info!("Extension BackupBucket {} {:?}", bucket.name_any(), result);
        Ok(())
    }

    /// Reflects the secret generated by the extension into the garden and
    /// copies the provider status.
    async fn sync_generated_secret(&self, bucket: &mut BackupBucket, extension: &ExtensionBackupBucket) -> Result<()> {
        let status = extension.status.clone().unwrap_or_default();

        let mut generated_ref = None;
        if let Some(seed_ref) = &status.generated_secret_ref {
            let target = ObjectKey::namespaced(
                &self.config.garden_namespace,
                &generated_secret_name(&bucket.name_any()),
            );
            reflect_secret(
                &self.seed,
                &ResourceRef::new(ClusterRole::Seed, seed_ref.key()),
                &self.garden,
                &ResourceRef::new(ClusterRole::Garden, target.clone()),
                &*bucket,
                finalizers::BACKUP_BUCKET,
            )
            .await?;
            generated_ref = Some(SecretReference {
                name: target.name,
                namespace: self.config.garden_namespace.clone(),
            });
        }

        if generated_ref.is_some() || status.provider_status.is_some() {
            patch_status(&self.garden, bucket, |b: &mut BackupBucket| {
                let s = b.status.get_or_insert_with(BackupBucketStatus::default);
                s.generated_secret_ref = generated_ref;
                s.provider_status = status.provider_status;
            })
            .await?;
        }
        Ok(())
    }

    async fn delete(&self, bucket: &mut BackupBucket) -> Result<Action> {
        if !has_finalizer(bucket, finalizers::GARDENER) {
            return Ok(Action::await_change());
        }
        mark_started(&self.garden, bucket, &*self.clock).await?;

        if let Some(generated) = bucket.status.as_ref().and_then(|s| s.generated_secret_ref.clone()) {
            release_secret(&self.garden, &generated.key(), finalizers::BACKUP_BUCKET).await?;
        }

        // the extension may still need credentials for its own teardown
        let secret = self.read_bucket_secret(bucket).await?;
        let mirror_key = self.mirror_key(bucket);
        mirror_from(&self.seed, &secret, &ResourceRef::new(ClusterRole::Seed, mirror_key.clone())).await?;

        let extension_key = ObjectKey::cluster_scoped(&bucket.name_any());
        if self.seed.delete::<ExtensionBackupBucket>(&extension_key).await? != DeleteOutcome::NotFound {
            if let Some(extension) = self.seed.get::<ExtensionBackupBucket>(&extension_key).await? {
                return self.extension_still_present(bucket, &extension).await;
            }
        }

        delete_secret(&self.seed, &mirror_key).await?;
        mark_succeeded(
            &self.garden,
            bucket,
            &*self.clock,
            "Backup Bucket has been successfully deleted.",
        )
        .await?;
        normal_event(
            &*self.events,
            &*bucket,
            reasons::DELETED,
            DELETE_ACTION,
            "Backup Bucket has been successfully deleted.".to_string(),
        )
        .await;

        self.release_bucket_secret(bucket).await?;
        remove_finalizer(&self.garden, bucket, finalizers::GARDENER).await?;
        Ok(Action::await_change())
    }

    async fn extension_still_present(
        &self,
        bucket: &mut BackupBucket,
        extension: &ExtensionBackupBucket,
    ) -> Result<Action> {
        let Some(reported) = extension.last_error() else {
            debug!("Extension BackupBucket {} is still being deleted", bucket.name_any());
            return Ok(Action::requeue(self.config.backup_bucket.deletion_requeue));
        };

        let last_error: LastError = last_error_from(&reported.description, &reported.codes, self.clock.now());
        warn_event(
            &*self.events,
            &*bucket,
            reasons::DELETE_ERROR,
            DELETE_ACTION,
            last_error.description.clone(),
        )
        .await;
        let description = format!("{} Operation will be retried.", last_error.description);
        mark_error(&self.garden, bucket, &*self.clock, &description, last_error).await?;
        Err(SeedletError::Downstream(reported.description.clone()))
    }

    /// Drops the external finalizer from the credentials unless another
    /// live bucket still uses them.
    async fn release_bucket_secret(&self, bucket: &BackupBucket) -> Result<()> {
        let secret_ref = &bucket.spec.secret_ref;
        let still_used = self
            .garden
            .list::<BackupBucket>(None, None)
            .await?
            .iter()
            .any(|other| {
                other.name_any() != bucket.name_any()
                    && other.metadata.deletion_timestamp.is_none()
                    && other.spec.secret_ref == *secret_ref
            });
        if still_used {
            debug!("Secret {} is still referenced by another BackupBucket", secret_ref.key());
            return Ok(());
        }

        if let Some(mut secret) = self.garden.get::<Secret>(&secret_ref.key()).await? {
            remove_finalizer(&self.garden, &mut secret, finalizers::EXTERNAL_GARDENER).await?;
        }
        Ok(())
    }
}

impl BackupBucketReconciler<KubeStore, KubeStore> {
    /// Watches garden BackupBuckets scheduled on this seed and their
    /// extension counterparts in the seed.
    pub async fn run(self) -> anyhow::Result<()> {
        let buckets: Api<BackupBucket> = Api::all(self.garden.client().clone());
        let extensions: Api<ExtensionBackupBucket> = Api::all(self.seed.client().clone());
        let seed_name = self.config.seed_name.clone();
        let concurrency = self.config.backup_bucket.concurrent_syncs;

        let (reader, writer) = reflector::store();
        let events = watcher(buckets, watcher::Config::default())
            .default_backoff()
            .reflect(writer);
        let filter = PredicateFilter(move |b: &BackupBucket| b.is_scheduled_on(&seed_name));
        let triggers = trigger_stream(events, TriggerPolicy::GenerationChanged, Arc::new(filter));
        let extension_events = watcher(extensions, watcher::Config::default())
            .default_backoff()
            .touched_objects();

        let context = Arc::new(self);
        Controller::for_stream(triggers, reader)
            .with_config(controller::Config::default().concurrency(concurrency))
            .watches_stream(extension_events, |ext: ExtensionBackupBucket| {
                Some(ObjectRef::<BackupBucket>::new(&ext.name_any()))
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled BackupBucket: {:?}", o),
                    Err(e) => warn!("BackupBucket reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(
    bucket: Arc<BackupBucket>,
    ctx: Arc<BackupBucketReconciler<KubeStore, KubeStore>>,
) -> Result<Action> {
    let key = ObjectKey::of(bucket.as_ref());
    let action = guarded(ctx.config.reconcile_timeout, ctx.reconcile(&key)).await?;
    ctx.backoff.reset(&key);
    Ok(action)
}

fn error_policy(
    bucket: Arc<BackupBucket>,
    error: &SeedletError,
    ctx: Arc<BackupBucketReconciler<KubeStore, KubeStore>>,
) -> Action {
    error_action(error, &ObjectKey::of(bucket.as_ref()), &ctx.backoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeClock, MemoryStore, RecordingEvents, Verb};
    use crate::types::backup_bucket::BackupBucketProvider;
    use crate::types::{BackupBucketSpec, ExtensionBackupBucketStatus, LastOperation, LastOperationType};
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Fixture {
        garden: MemoryStore,
        seed: MemoryStore,
        events: RecordingEvents,
        clock: Arc<FakeClock>,
        reconciler: BackupBucketReconciler<MemoryStore, MemoryStore>,
    }

    fn fixture() -> Fixture {
        let garden = MemoryStore::new();
        let seed = MemoryStore::new();
        let events = RecordingEvents::new();
        let clock = Arc::new(FakeClock::default());
        let config = Config {
            seed_name: "seed-1".to_string(),
            ..Default::default()
        };
        let reconciler = BackupBucketReconciler::new(
            garden.clone(),
            seed.clone(),
            Arc::new(config),
            Arc::new(events.clone()),
            clock.clone(),
        );
        Fixture {
            garden,
            seed,
            events,
            clock,
            reconciler,
        }
    }

    fn credentials(password: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("creds".to_string()),
                namespace: Some("garden-dev".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "password".to_string(),
                ByteString(password.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn bucket(name: &str, seed: &str) -> BackupBucket {
        BackupBucket {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: Some(format!("uid-{}", name)),
                ..Default::default()
            },
            spec: BackupBucketSpec {
                provider: BackupBucketProvider {
                    type_: "aws".to_string(),
                    region: "eu-west-1".to_string(),
                },
                provider_config: None,
                secret_ref: SecretReference {
                    name: "creds".to_string(),
                    namespace: "garden-dev".to_string(),
                },
                seed_name: Some(seed.to_string()),
            },
            status: None,
        }
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::cluster_scoped(name)
    }

    fn stored(f: &Fixture) -> BackupBucket {
        f.garden.fetch(&key("b1")).unwrap()
    }

    fn state_of(f: &Fixture) -> (LastOperationState, i32) {
        let op = stored(f).status.unwrap().last_operation.unwrap();
        (op.state, op.progress)
    }

    /// Plays the extension controller: drops the operation annotation and
    /// reports `state`.
    fn report(f: &Fixture, state: LastOperationState, last_error: Option<&str>) {
        let mut ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
        ext.annotations_mut().remove(annotations::OPERATION);
        let status = ext.status.get_or_insert_with(ExtensionBackupBucketStatus::default);
        status.last_operation = Some(LastOperation {
            type_: LastOperationType::Reconcile,
            state,
            progress: 100,
            description: "done".to_string(),
            last_update_time: f.clock.now(),
        });
        status.last_error = last_error.map(|d| LastError {
            description: d.to_string(),
            task_id: None,
            codes: vec![],
            last_update_time: None,
        });
        f.seed.insert(&ext);
    }

    async fn reconcile(f: &Fixture) -> Result<Action> {
        f.reconciler.reconcile(&key("b1")).await
    }

    #[tokio::test]
    async fn test_first_pass_adds_finalizer_and_applies_extension() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));

        let action = reconcile(&f).await.unwrap();

        assert_eq!(action, Action::await_change());
        let b = stored(&f);
        assert!(has_finalizer(&b, finalizers::GARDENER));
        assert_eq!(state_of(&f), (LastOperationState::Processing, 0));

        let ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
        assert_eq!(ext.annotations()[annotations::OPERATION], operations::RECONCILE);
        assert_eq!(ext.spec.secret_ref.name, "bucket-b1");
        assert_eq!(ext.spec.region, "eu-west-1");

        let mirror: Secret = f.seed.fetch(&ObjectKey::namespaced("garden", "bucket-b1")).unwrap();
        assert_eq!(mirror.data, credentials("s3cr3t").data);

        let creds: Secret = f.garden.fetch(&ObjectKey::namespaced("garden-dev", "creds")).unwrap();
        assert!(has_finalizer(&creds, finalizers::EXTERNAL_GARDENER));
    }

    #[tokio::test]
    async fn test_extension_success_marks_succeeded() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(&f).await.unwrap();

        report(&f, LastOperationState::Succeeded, None);
        reconcile(&f).await.unwrap();

        assert_eq!(state_of(&f), (LastOperationState::Succeeded, 100));
        let status = stored(&f).status.unwrap();
        assert!(status.last_error.is_none());
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(f.events.events().last().unwrap().reason, reasons::RECONCILED);
    }

    #[tokio::test]
    async fn test_second_pass_on_unchanged_bucket_writes_no_objects() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(&f).await.unwrap();
        report(&f, LastOperationState::Succeeded, None);
        reconcile(&f).await.unwrap();
        f.garden.reset_writes();
        f.seed.reset_writes();

        reconcile(&f).await.unwrap();

        // Status patches are left out: every pass marks Processing first.
        assert_eq!(f.garden.writes_of::<BackupBucket>(), 0);
        assert_eq!(f.garden.writes_of::<Secret>(), 0);
        assert_eq!(f.seed.writes(), 0);
        assert_eq!(state_of(&f), (LastOperationState::Succeeded, 100));
    }

    #[tokio::test]
    async fn test_failed_extension_is_reapplied_without_success() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(&f).await.unwrap();

        report(&f, LastOperationState::Failed, None);
        reconcile(&f).await.unwrap();

        let status = stored(&f).status.unwrap();
        let op = status.last_operation.unwrap();
        assert_eq!(op.state, LastOperationState::Error);
        assert_eq!(op.progress, 50);
        assert_eq!(
            op.description,
            "extension state is not Succeeded but Failed. Operation will be retried."
        );
        assert!(status.last_error.is_some());

        let ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
        assert_eq!(ext.annotations()[annotations::OPERATION], operations::RECONCILE);
        assert_eq!(f.events.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_error_with_reported_last_error_waits_by_default() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(&f).await.unwrap();

        report(&f, LastOperationState::Error, Some("AccessDenied: not allowed"));
        reconcile(&f).await.unwrap();

        let status = stored(&f).status.unwrap();
        let last_error = status.last_error.unwrap();
        assert_eq!(last_error.description, "error during reconciliation: AccessDenied: not allowed");
        assert_eq!(last_error.codes, vec!["ERR_INFRA_UNAUTHORIZED".to_string()]);
        assert_eq!(status.last_operation.unwrap().state, LastOperationState::Error);

        let ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
        assert!(!ext.annotations().contains_key(annotations::OPERATION));
    }

    #[tokio::test]
    async fn test_rotated_credentials_trigger_reapply() {
        let f = fixture();
        f.garden.insert(&credentials("old"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(&f).await.unwrap();
        report(&f, LastOperationState::Succeeded, None);
        reconcile(&f).await.unwrap();

        let mut rotated = credentials("new");
        rotated.metadata.finalizers = Some(vec![finalizers::EXTERNAL_GARDENER.to_string()]);
        f.garden.insert(&rotated);
        reconcile(&f).await.unwrap();

        let ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
        assert_eq!(ext.annotations()[annotations::OPERATION], operations::RECONCILE);
        assert_eq!(state_of(&f).0, LastOperationState::Processing);
        let mirror: Secret = f.seed.fetch(&ObjectKey::namespaced("garden", "bucket-b1")).unwrap();
        assert_eq!(mirror.data, credentials("new").data);
    }

    #[tokio::test]
    async fn test_generated_secret_is_reflected_into_garden() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(&f).await.unwrap();

        let mut generated = credentials("generated");
        generated.metadata.name = Some("generated-b1".to_string());
        generated.metadata.namespace = Some("garden".to_string());
        f.seed.insert(&generated);
        report(&f, LastOperationState::Succeeded, None);
        let mut ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
        if let Some(status) = ext.status.as_mut() {
            status.generated_secret_ref = Some(SecretReference {
                name: "generated-b1".to_string(),
                namespace: "garden".to_string(),
            });
            status.provider_status = Some(serde_json::json!({"bucketName": "b1-xyz"}));
        }
        f.seed.insert(&ext);

        reconcile(&f).await.unwrap();

        let reflected: Secret = f
            .garden
            .fetch(&ObjectKey::namespaced("garden", "generated-bucket-b1"))
            .unwrap();
        assert_eq!(reflected.data, generated.data);
        assert_eq!(reflected.owner_references()[0].uid, "uid-b1");
        assert!(has_finalizer(&reflected, finalizers::BACKUP_BUCKET));

        let status = stored(&f).status.unwrap();
        assert_eq!(status.generated_secret_ref.unwrap().name, "generated-bucket-b1");
        assert_eq!(status.provider_status.unwrap()["bucketName"], "b1-xyz");
    }

    #[tokio::test]
    async fn test_missing_secret_is_surfaced() {
        let f = fixture();
        f.garden.insert(&bucket("b1", "seed-1"));

        let err = reconcile(&f).await.unwrap_err();

        assert!(err.is_terminal());
        let warnings = f.events.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0]
            .note
            .as_deref()
            .unwrap()
            .starts_with("Failed to get backup secret garden-dev/creds"));
        assert_eq!(state_of(&f).0, LastOperationState::Error);
        assert!(!f.seed.contains::<ExtensionBackupBucket>(&key("b1")));
    }

    #[tokio::test]
    async fn test_unreadable_secret_is_retried() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        f.garden.fail::<Secret>(Verb::Get);

        let err = reconcile(&f).await.unwrap_err();

        assert!(!err.is_terminal());
        assert_eq!(state_of(&f).0, LastOperationState::Processing);
        assert_eq!(f.seed.writes(), 0);
    }

    #[tokio::test]
    async fn test_bucket_of_other_seed_is_ignored() {
        let f = fixture();
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-2"));

        reconcile(&f).await.unwrap();

        assert_eq!(f.garden.writes(), 0);
        assert_eq!(f.seed.writes(), 0);
    }

    async fn deleting_bucket(f: &Fixture, extension_finalizer: bool) {
        f.garden.insert(&credentials("s3cr3t"));
        f.garden.insert(&bucket("b1", "seed-1"));
        reconcile(f).await.unwrap();
        report(f, LastOperationState::Succeeded, None);
        reconcile(f).await.unwrap();

        if extension_finalizer {
            let mut ext: ExtensionBackupBucket = f.seed.fetch(&key("b1")).unwrap();
            ext.metadata.finalizers = Some(vec!["extensions.gardener.cloud/aws".to_string()]);
            f.seed.insert(&ext);
        }
        f.garden.delete::<BackupBucket>(&key("b1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_waits_for_extension_and_keeps_finalizer() {
        let f = fixture();
        deleting_bucket(&f, true).await;

        let action = reconcile(&f).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
        let b = stored(&f);
        assert!(has_finalizer(&b, finalizers::GARDENER));
        assert_eq!(b.status.unwrap().last_operation.unwrap().type_, LastOperationType::Delete);
        assert!(f.seed.contains::<Secret>(&ObjectKey::namespaced("garden", "bucket-b1")));

        // the extension finishes its teardown
        f.seed.remove::<ExtensionBackupBucket>(&key("b1"));
        let action = reconcile(&f).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(!f.garden.contains::<BackupBucket>(&key("b1")));
        assert!(!f.seed.contains::<Secret>(&ObjectKey::namespaced("garden", "bucket-b1")));
        let creds: Secret = f.garden.fetch(&ObjectKey::namespaced("garden-dev", "creds")).unwrap();
        assert!(!has_finalizer(&creds, finalizers::EXTERNAL_GARDENER));
    }

    #[tokio::test]
    async fn test_delete_surfaces_extension_error() {
        let f = fixture();
        deleting_bucket(&f, true).await;
        report(&f, LastOperationState::Error, Some("bucket not empty"));

        let err = reconcile(&f).await.unwrap_err();

        assert!(matches!(err, SeedletError::Downstream(_)));
        let b = stored(&f);
        assert!(has_finalizer(&b, finalizers::GARDENER));
        let op = b.status.unwrap().last_operation.unwrap();
        assert_eq!(op.state, LastOperationState::Error);
        assert_eq!(op.description, "bucket not empty Operation will be retried.");
        assert_eq!(f.events.warnings().last().unwrap().reason, reasons::DELETE_ERROR);
    }

    #[tokio::test]
    async fn test_delete_keeps_secret_finalizer_for_other_buckets() {
        let f = fixture();
        f.garden.insert(&bucket("b2", "seed-1"));
        deleting_bucket(&f, false).await;

        reconcile(&f).await.unwrap();

        assert!(!f.garden.contains::<BackupBucket>(&key("b1")));
        let creds: Secret = f.garden.fetch(&ObjectKey::namespaced("garden-dev", "creds")).unwrap();
        assert!(has_finalizer(&creds, finalizers::EXTERNAL_GARDENER));
    }

    #[tokio::test]
    async fn test_delete_releases_reflected_secret() {
        let f = fixture();
        deleting_bucket(&f, false).await;
        let reflected_key = ObjectKey::namespaced("garden", "generated-bucket-b1");
        let mut reflected = credentials("generated");
        reflected.metadata.name = Some(reflected_key.name.clone());
        reflected.metadata.namespace = Some("garden".to_string());
        reflected.metadata.finalizers = Some(vec![finalizers::BACKUP_BUCKET.to_string()]);
        f.garden.insert(&reflected);
        let mut b = stored(&f);
        if let Some(status) = b.status.as_mut() {
            status.generated_secret_ref = Some(SecretReference {
                name: reflected_key.name.clone(),
                namespace: "garden".to_string(),
            });
        }
        f.garden.insert(&b);

        reconcile(&f).await.unwrap();

        assert!(!f.garden.contains::<Secret>(&reflected_key));
        assert!(!f.garden.contains::<BackupBucket>(&key("b1")));
    }
}
