// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Abstraction over the pod API consumed by the informer and reconciler.

use crate::constants::retry;
use crate::error::{LogstowError, Result};
use crate::kubernetes::pods::ResourceKey;
use async_trait::async_trait;
use futures::future;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams, PostParams, WatchEvent, WatchParams};
use kube::{Api, Client};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A normalized watch notification. The raw API stream is flattened into
/// these two variants at the client boundary so the informer never performs
/// runtime type inspection on opaque payloads.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// The pod was added or modified
    Applied(Pod),
    /// The pod was deleted from the API server
    Deleted(Pod),
}

/// The pod operations the controller needs from the cluster, scoped to one
/// namespace and label selector. Updates are optimistic-concurrency-checked
/// via `metadata.resourceVersion`; a stale version fails with a 409.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Full listing of matching pods plus the list's resourceVersion, which
    /// is the point to resume watching from.
    async fn list(&self) -> Result<(Vec<Pod>, String)>;

    /// Incremental event stream starting at the given resourceVersion.
    async fn watch(&self, resource_version: &str) -> Result<BoxStream<'static, Result<PodEvent>>>;

    async fn get(&self, key: &ResourceKey) -> Result<Pod>;

    async fn update(&self, pod: &Pod) -> Result<Pod>;

    /// Raw log bytes of the pod. Fails with NotFound when the pod is gone.
    async fn fetch_logs(&self, key: &ResourceKey) -> Result<Vec<u8>>;
}

/// Production implementation backed by the real API server.
pub struct KubeClusterClient {
    api: Api<Pod>,
    selector: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, namespace: &str, selector: String) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            selector,
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list(&self) -> Result<(Vec<Pod>, String)> {
        let params = ListParams::default().labels(&self.selector);
        let list = self.api.list(&params).await?;
        let resource_version = list.metadata.resource_version.unwrap_or_default();

        Ok((list.items, resource_version))
    }

    async fn watch(&self, resource_version: &str) -> Result<BoxStream<'static, Result<PodEvent>>> {
        let params = WatchParams::default().labels(&self.selector);
        let stream = self.api.watch(&params, resource_version).await?;

        let stream = stream
            .map(|event| match event {
                Ok(WatchEvent::Added(pod)) | Ok(WatchEvent::Modified(pod)) => {
                    Ok(Some(PodEvent::Applied(pod)))
                }
                Ok(WatchEvent::Deleted(pod)) => Ok(Some(PodEvent::Deleted(pod))),
                Ok(WatchEvent::Bookmark(_)) => Ok(None),
                Ok(WatchEvent::Error(status)) => {
                    Err(LogstowError::KubeError(kube::Error::Api(status)))
                }
                Err(e) => Err(LogstowError::KubeError(e)),
            })
            .filter_map(|event| future::ready(event.transpose()));

        Ok(stream.boxed())
    }

    async fn get(&self, key: &ResourceKey) -> Result<Pod> {
        Ok(self.api.get(&key.name).await?)
    }

    async fn update(&self, pod: &Pod) -> Result<Pod> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| LogstowError::MalformedObject("pod has no name".to_string()))?;

        Ok(self.api.replace(name, &PostParams::default(), pod).await?)
    }

    async fn fetch_logs(&self, key: &ResourceKey) -> Result<Vec<u8>> {
        let logs = self.api.logs(&key.name, &LogParams::default()).await?;
        Ok(logs.into_bytes())
    }
}

/// Run a fetch-modify-submit cycle, retrying with short capped backoff while
/// the submit is rejected with a version conflict. Any other error, or a
/// conflict on the last attempt, is surfaced to the caller so the queue-level
/// retry can take over.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(retry::CONFLICT_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!(attempt, "update conflict, retrying with fresh object");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(retry::CONFLICT_MAX_DELAY_MS));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
