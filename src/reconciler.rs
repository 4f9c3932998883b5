// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcile workers and the finalizer state machine.

use crate::constants::retry;
use crate::error::Result;
use crate::exporter::LogExporter;
use crate::informer::PodCache;
use crate::kubernetes::{pods, retry_on_conflict, ClusterClient, ResourceKey};
use crate::queue::WorkQueue;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The single step a reconcile pass performs for one pod.
///
/// Recomputed fresh from the cached object every pass; no state is carried
/// between passes, so a crash or requeue can never leave a half-applied
/// decision behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Live matching pod without our finalizer: gate its future deletion.
    AddFinalizer,
    /// Deletion-marked pod still gated: export logs, then release it.
    ExportAndRelease,
    /// Steady state, out-of-scope pod, or already released.
    Nothing,
}

/// Decide what a reconcile pass should do for the observed pod.
pub fn plan(pod: &Pod, selectors: &BTreeMap<String, String>) -> Step {
    if pods::is_being_deleted(pod) {
        if pods::has_finalizer(pod) {
            Step::ExportAndRelease
        } else {
            Step::Nothing
        }
    } else if pods::matches_selectors(pod, selectors) && !pods::has_finalizer(pod) {
        Step::AddFinalizer
    } else {
        Step::Nothing
    }
}

/// Pulls keys off the work queue and drives each pod through the finalizer
/// state machine. Safe to run from multiple workers: the queue guarantees no
/// key is processed by two workers at once.
pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    cache: PodCache,
    queue: WorkQueue<ResourceKey>,
    exporter: LogExporter,
    selectors: BTreeMap<String, String>,
    max_attempts: u32,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        cache: PodCache,
        queue: WorkQueue<ResourceKey>,
        exporter: LogExporter,
        selectors: BTreeMap<String, String>,
    ) -> Self {
        Self {
            cluster,
            cache,
            queue,
            exporter,
            selectors,
            max_attempts: retry::MAX_RECONCILE_ATTEMPTS,
        }
    }

    #[cfg(test)]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Worker loop. Runs until the queue is shut down; a shutdown signal is a
    /// hard stop, not a retry condition.
    pub async fn run(self: Arc<Self>) {
        while let Some(key) = self.queue.get().await {
            let result = self.reconcile(&key).await;
            self.complete(&key, result);
            self.queue.done(&key);
        }

        debug!("work queue shut down, stopping worker");
    }

    fn complete(&self, key: &ResourceKey, result: Result<()>) {
        match result {
            Ok(()) => self.queue.forget(key),
            Err(e) => {
                let attempts = self.queue.num_requeues(key);
                if attempts < self.max_attempts {
                    warn!(%key, error = %e, attempts, "reconcile failed, requeueing");
                    self.queue.add_rate_limited(key.clone());
                } else {
                    error!(%key, error = %e, attempts, "reconcile failed too often, giving up");
                    self.queue.forget(key);
                }
            }
        }
    }

    /// One reconcile pass for a key, working from the cached snapshot.
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<()> {
        let Some(pod) = self.cache.get(key) else {
            debug!(%key, "pod no longer observed, nothing to do");
            return Ok(());
        };

        match plan(&pod, &self.selectors) {
            Step::AddFinalizer => self.add_finalizer(key).await,
            Step::ExportAndRelease => {
                self.exporter.export(key).await?;
                self.remove_finalizer(key).await
            }
            Step::Nothing => Ok(()),
        }
    }

    /// Add our finalizer via fetch-modify-submit, retrying on conflicts. A
    /// pod that disappears mid-flight counts as settled.
    async fn add_finalizer(&self, key: &ResourceKey) -> Result<()> {
        let outcome = retry_on_conflict(retry::MAX_CONFLICT_ATTEMPTS, || async move {
            let pod = self.cluster.get(key).await?;

            // Re-check against the fresh object: the pod may have started
            // deleting or lost its labels since the cached snapshot.
            if pods::has_finalizer(&pod)
                || pods::is_being_deleted(&pod)
                || !pods::matches_selectors(&pod, &self.selectors)
            {
                return Ok(());
            }

            self.cluster.update(&pods::with_finalizer(&pod)).await?;
            info!(%key, "finalizer added");
            Ok(())
        })
        .await;

        match outcome {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Remove our finalizer, unblocking the pod's deletion. Only called after
    /// a successful log export.
    async fn remove_finalizer(&self, key: &ResourceKey) -> Result<()> {
        let outcome = retry_on_conflict(retry::MAX_CONFLICT_ATTEMPTS, || async move {
            let pod = self.cluster.get(key).await?;

            if !pods::has_finalizer(&pod) {
                return Ok(());
            }

            self.cluster.update(&pods::without_finalizer(&pod)).await?;
            info!(%key, "finalizer removed");
            Ok(())
        })
        .await;

        match outcome {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}
