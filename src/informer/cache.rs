// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local mirror of the watched pod set.

use crate::kubernetes::ResourceKey;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Concurrent key→pod map written by the informer and read by reconcile
/// workers. Readers get cloned snapshots; the only writer is the informer,
/// so observed state always flows through the watch stream.
#[derive(Clone, Default)]
pub struct PodCache {
    inner: Arc<RwLock<HashMap<ResourceKey, Pod>>>,
}

impl PodCache {
    /// Snapshot of the pod for a key, or `None` if it is no longer observed.
    pub fn get(&self, key: &ResourceKey) -> Option<Pod> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// The cached resourceVersion for a key, used to suppress no-op updates.
    pub fn resource_version(&self, key: &ResourceKey) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .get(key)
            .and_then(|pod| pod.metadata.resource_version.clone())
    }

    pub fn insert(&self, key: ResourceKey, pod: Pod) {
        self.inner.write().unwrap().insert(key, pod);
    }

    pub fn remove(&self, key: &ResourceKey) {
        self.inner.write().unwrap().remove(key);
    }

    /// Replace the whole cache with a freshly listed pod set. Returns every
    /// key that needs re-evaluation: the listed ones plus any previously
    /// cached key that vanished while the watch was down.
    pub fn replace(&self, pods: Vec<Pod>) -> Vec<ResourceKey> {
        let mut fresh = HashMap::new();
        for pod in pods {
            if let Some(key) = ResourceKey::from_pod(&pod) {
                fresh.insert(key, pod);
            }
        }

        let mut inner = self.inner.write().unwrap();
        let mut touched: Vec<ResourceKey> = fresh.keys().cloned().collect();
        for key in inner.keys() {
            if !fresh.contains_key(key) {
                touched.push(key.clone());
            }
        }
        *inner = fresh;

        touched
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
