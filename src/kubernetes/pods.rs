// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod inspection helpers and the key type the work queue transports.

use crate::constants::FINALIZER;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::fmt;

/// Namespace/name pair identifying a pod without carrying its payload.
///
/// The queue deliberately transports keys rather than objects: a queued key
/// means "this pod needs re-evaluation", so the reconciler always works from
/// the freshest cached state instead of a stale snapshot taken at event time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Extract the key from a pod's metadata. Returns `None` when namespace or
    /// name is missing, which callers treat as a malformed event.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let namespace = pod.metadata.namespace.as_ref()?;
        let name = pod.metadata.name.as_ref()?;
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Check whether a pod has been marked for deletion by the API server.
pub fn is_being_deleted(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Check whether our finalizer is present on the pod.
pub fn has_finalizer(pod: &Pod) -> bool {
    pod.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
}

/// Check whether the pod's labels contain every configured selector pair.
pub fn matches_selectors(pod: &Pod, selectors: &BTreeMap<String, String>) -> bool {
    let labels = pod.metadata.labels.as_ref();

    selectors.iter().all(|(key, value)| {
        labels
            .and_then(|l| l.get(key))
            .is_some_and(|v| v == value)
    })
}

/// Return a copy of the pod with our finalizer appended.
pub fn with_finalizer(pod: &Pod) -> Pod {
    let mut updated = pod.clone();
    updated
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    updated
}

/// Return a copy of the pod with our finalizer removed.
pub fn without_finalizer(pod: &Pod) -> Pod {
    let mut updated = pod.clone();
    if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
        finalizers.retain(|name| name != FINALIZER);
    }
    updated
}
