// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: pod fixtures, an in-memory cluster fake, and an HTTP-level
//! mock for exercising the real kube-backed client.

use crate::error::{LogstowError, Result};
use crate::kubernetes::{ClusterClient, PodEvent, ResourceKey};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::{Request, Response};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::client::Body;
use kube::Client;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// Build a live pod with the given labels and resourceVersion.
pub fn make_pod(name: &str, namespace: &str, labels: &[(&str, &str)], rv: &str) -> Pod {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: (!labels.is_empty()).then_some(labels),
            resource_version: Some(rv.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Build a pod that the API server has marked for deletion.
pub fn make_deleted_pod(name: &str, namespace: &str, labels: &[(&str, &str)], rv: &str) -> Pod {
    let mut pod = make_pod(name, namespace, labels, rv);
    pod.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    pod
}

fn api_error(code: u16, reason: &str, message: &str) -> LogstowError {
    LogstowError::KubeError(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

fn not_found(key: &ResourceKey) -> LogstowError {
    api_error(404, "NotFound", &format!("pod \"{}\" not found", key.name))
}

#[derive(Default)]
struct FakeState {
    pods: HashMap<ResourceKey, Pod>,
    logs: HashMap<ResourceKey, Vec<u8>>,
    logs_not_found: HashMap<ResourceKey, bool>,
    journal: Vec<String>,
    update_conflicts_remaining: u32,
    fail_gets: bool,
    fail_next_list: bool,
    watch_sessions: VecDeque<mpsc::UnboundedReceiver<Result<PodEvent>>>,
}

/// In-memory [`ClusterClient`] that journals every API call and can inject
/// conflicts and failures. Updates enforce optimistic concurrency like the
/// real API server: a stale resourceVersion is rejected with a 409.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_pod(&self, pod: Pod) {
        let key = ResourceKey::from_pod(&pod).expect("fixture pod must have a key");
        self.state.lock().unwrap().pods.insert(key, pod);
    }

    pub fn pod(&self, key: &ResourceKey) -> Option<Pod> {
        self.state.lock().unwrap().pods.get(key).cloned()
    }

    pub fn remove_pod(&self, key: &ResourceKey) {
        self.state.lock().unwrap().pods.remove(key);
    }

    /// Script one watch session. Each `watch` call consumes the next scripted
    /// session in registration order; the returned sender feeds its events,
    /// and dropping the sender terminates the stream. Unscripted sessions
    /// never produce anything.
    pub fn script_watch(&self) -> mpsc::UnboundedSender<Result<PodEvent>> {
        let (tx, rx) = mpsc::unbounded();
        self.state.lock().unwrap().watch_sessions.push_back(rx);
        tx
    }

    pub fn set_logs(&self, key: &ResourceKey, logs: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(key.clone(), logs.to_vec());
    }

    /// Make log fetches for this key fail with NotFound even while the pod
    /// object still exists.
    pub fn fail_logs_with_not_found(&self, key: &ResourceKey) {
        self.state
            .lock()
            .unwrap()
            .logs_not_found
            .insert(key.clone(), true);
    }

    /// Reject the next `count` updates with a version conflict.
    pub fn fail_updates_with_conflict(&self, count: u32) {
        self.state.lock().unwrap().update_conflicts_remaining = count;
    }

    /// Make every `get` fail with a server error.
    pub fn fail_gets_with_server_error(&self) {
        self.state.lock().unwrap().fail_gets = true;
    }

    /// Make the next `list` fail with a server error.
    pub fn fail_next_list(&self) {
        self.state.lock().unwrap().fail_next_list = true;
    }

    /// Every API call made so far, in order, as `"<op> <namespace>/<name>"`.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn calls_matching(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .journal
            .iter()
            .filter(|call| call.starts_with(op))
            .count()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list(&self) -> Result<(Vec<Pod>, String)> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("list".to_string());

        if state.fail_next_list {
            state.fail_next_list = false;
            return Err(api_error(500, "InternalError", "list failed"));
        }

        let pods = state.pods.values().cloned().collect();
        Ok((pods, "100".to_string()))
    }

    async fn watch(&self, _resource_version: &str) -> Result<BoxStream<'static, Result<PodEvent>>> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("watch".to_string());

        match state.watch_sessions.pop_front() {
            Some(events) => Ok(events.boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn get(&self, key: &ResourceKey) -> Result<Pod> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("get {}", key));

        if state.fail_gets {
            return Err(api_error(500, "InternalError", "get failed"));
        }

        state.pods.get(key).cloned().ok_or_else(|| not_found(key))
    }

    async fn update(&self, pod: &Pod) -> Result<Pod> {
        let key = ResourceKey::from_pod(pod)
            .ok_or_else(|| LogstowError::MalformedObject("pod has no key".to_string()))?;

        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("update {}", key));

        if state.update_conflicts_remaining > 0 {
            state.update_conflicts_remaining -= 1;
            return Err(api_error(409, "Conflict", "object has been modified"));
        }

        let Some(current) = state.pods.get(&key) else {
            return Err(not_found(&key));
        };

        if current.metadata.resource_version != pod.metadata.resource_version {
            return Err(api_error(409, "Conflict", "resourceVersion is stale"));
        }

        let mut stored = pod.clone();
        let next_rv = current
            .metadata
            .resource_version
            .as_deref()
            .and_then(|rv| rv.parse::<u64>().ok())
            .map_or_else(|| "1".to_string(), |rv| (rv + 1).to_string());
        stored.metadata.resource_version = Some(next_rv);

        state.pods.insert(key, stored.clone());
        Ok(stored)
    }

    async fn fetch_logs(&self, key: &ResourceKey) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("fetch-logs {}", key));

        if state.logs_not_found.get(key).copied().unwrap_or(false) {
            return Err(not_found(key));
        }

        state.logs.get(key).cloned().ok_or_else(|| not_found(key))
    }
}

/// A mock HTTP service that returns predefined responses based on request
/// method and path, for driving the real kube client without a server.
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

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PUT requests matching the exact path
    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(
                (method.to_string(), path.to_string()),
                (status, body.to_string()),
            );
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Prefix match for paths carrying query parameters
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
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

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            match response {
                Some((status, body)) => Ok(Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(Body::from(body.into_bytes()))
                    .unwrap()),
                None => {
                    // Default 404 for unmatched requests
                    let body = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#;
                    Ok(Response::builder()
                        .status(404)
                        .header("content-type", "application/json")
                        .body(Body::from(body.as_bytes().to_vec()))
                        .unwrap())
                }
            }
        })
    }
}

/// Create a pod JSON response for the mock API server
pub fn pod_json(name: &str, namespace: &str, rv: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": rv,
            "uid": "test-uid"
        }
    })
    .to_string()
}

/// Create a conflict response for the mock API server
pub fn conflict_json(name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("Operation cannot be fulfilled on pods \"{}\"", name),
        "reason": "Conflict",
        "code": 409
    })
    .to_string()
}

/// Create a 404 not found response for the mock API server
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}
