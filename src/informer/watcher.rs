// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! List/watch loop feeding the cache and the work queue.

use crate::constants::resync;
use crate::error::Result;
use crate::informer::PodCache;
use crate::kubernetes::{ClusterClient, PodEvent, ResourceKey};
use crate::queue::WorkQueue;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Mirrors the filtered pod set into the cache and turns watch notifications
/// into queued keys. Downstream components only ever see keys; watch stream
/// breakage and re-listing are handled here and are invisible to them.
pub struct Informer {
    cluster: Arc<dyn ClusterClient>,
    cache: PodCache,
    queue: WorkQueue<ResourceKey>,
    shutdown: watch::Receiver<bool>,
}

impl Informer {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        cache: PodCache,
        queue: WorkQueue<ResourceKey>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cluster,
            cache,
            queue,
            shutdown,
        }
    }

    /// Run until shutdown. The initial list is fatal on failure: running with
    /// a partial view risks releasing pods whose logs were never exported.
    /// Every later list or watch failure is recovered by re-listing with
    /// capped backoff.
    pub async fn run(mut self) -> Result<()> {
        let mut resource_version = self.sync().await?;
        info!(pods = self.cache.len(), "initial sync complete");

        'relist: loop {
            if *self.shutdown.borrow() {
                break;
            }

            let mut events = match self.cluster.watch(&resource_version).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "failed to start watch, relisting");
                    match self.resync().await {
                        Some(rv) => {
                            resource_version = rv;
                            continue 'relist;
                        }
                        None => break 'relist,
                    }
                }
            };

            loop {
                tokio::select! {
                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            break 'relist;
                        }
                    }
                    event = events.next() => match event {
                        Some(Ok(event)) => self.handle_event(event),
                        Some(Err(e)) => {
                            warn!(error = %e, "watch stream failed, relisting");
                            break;
                        }
                        None => {
                            debug!("watch stream ended, relisting");
                            break;
                        }
                    }
                }
            }

            match self.resync().await {
                Some(rv) => resource_version = rv,
                None => break 'relist,
            }
        }

        info!("informer stopped");
        Ok(())
    }

    /// List, replace the cache, and enqueue every touched key. Returns the
    /// resourceVersion to resume watching from.
    async fn sync(&self) -> Result<String> {
        let (pods, resource_version) = self.cluster.list().await?;
        for key in self.cache.replace(pods) {
            self.queue.add(key);
        }
        Ok(resource_version)
    }

    /// Retry `sync` with exponential backoff until it succeeds or shutdown is
    /// signalled (`None`).
    async fn resync(&mut self) -> Option<String> {
        let mut delay = Duration::from_secs(resync::RELIST_INTERVAL_SECS);

        loop {
            if *self.shutdown.borrow() {
                return None;
            }

            match self.sync().await {
                Ok(resource_version) => return Some(resource_version),
                Err(e) => warn!(error = %e, "relist failed, retrying in {:?}", delay),
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return None;
                    }
                }
            }

            delay = (delay * 2).min(Duration::from_secs(resync::RELIST_MAX_INTERVAL_SECS));
        }
    }

    /// Normalize one watch notification into cache and queue effects.
    pub fn handle_event(&self, event: PodEvent) {
        match event {
            PodEvent::Applied(pod) => {
                let Some(key) = ResourceKey::from_pod(&pod) else {
                    warn!("event object is missing namespace or name, dropping");
                    return;
                };

                // A server echo with an unchanged version carries no new
                // information; enqueueing it would only cause reconcile storms.
                if let (Some(cached), Some(incoming)) = (
                    self.cache.resource_version(&key),
                    pod.metadata.resource_version.as_ref(),
                ) {
                    if cached == *incoming {
                        trace!(%key, "resource version unchanged, suppressing");
                        return;
                    }
                }

                self.cache.insert(key.clone(), pod);
                self.queue.add(key);
            }
            PodEvent::Deleted(pod) => {
                // Deletions must never be dropped, even for objects we cannot
                // fully identify; without a key there is nothing to enqueue,
                // so the best we can do is make it visible.
                let Some(key) = ResourceKey::from_pod(&pod) else {
                    warn!("delete event object is missing namespace or name, dropping");
                    return;
                };

                self.cache.remove(&key);
                self.queue.add(key);
            }
        }
    }
}
