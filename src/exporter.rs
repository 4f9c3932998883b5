// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Copies pod logs to the local export directory.

use crate::error::Result;
use crate::kubernetes::{ClusterClient, ResourceKey};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Exports a pod's log stream to a file under the configured root directory.
pub struct LogExporter {
    cluster: Arc<dyn ClusterClient>,
    root: PathBuf,
}

impl LogExporter {
    pub fn new(cluster: Arc<dyn ClusterClient>, root: PathBuf) -> Self {
        Self { cluster, root }
    }

    /// Fetch the pod's logs and write them to a fresh destination file.
    /// Returns the written path, or `None` when the pod was already gone
    /// (its logs are unrecoverable, so there is nothing left to do).
    /// I/O errors propagate to the caller; retrying is the queue's job.
    pub async fn export(&self, key: &ResourceKey) -> Result<Option<PathBuf>> {
        let logs = match self.cluster.fetch_logs(key).await {
            Ok(logs) => logs,
            Err(e) if e.is_not_found() => {
                debug!(%key, "pod already gone, skipping log export");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let destination = self.destination(key);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&destination, &logs).await?;

        info!(%key, destination = %destination.display(), bytes = logs.len(), "logs exported");
        Ok(Some(destination))
    }

    /// A per-pod destination that never collides with a previous export, so
    /// a retried reconcile cannot overwrite an earlier copy.
    fn destination(&self, key: &ResourceKey) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let nonce: u32 = rand::random();

        self.root
            .join(&key.name)
            .join(format!("{}-{:08x}.log", stamp, nonce))
    }
}
