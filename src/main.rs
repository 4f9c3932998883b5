// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use logstow::config::{Args, Config};
use logstow::exporter::LogExporter;
use logstow::informer::{Informer, PodCache};
use logstow::kubernetes::{ClusterClient, KubeClusterClient, ResourceKey};
use logstow::queue::WorkQueue;
use logstow::reconciler::Reconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Invalid selector syntax is a startup error
    let config = Config::from_args(Args::parse())?;
    info!(
        namespace = %config.namespace,
        selectors = %config.selector_string(),
        workers = config.workers,
        "starting controller"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(
        client,
        &config.namespace,
        config.selector_string(),
    ));

    let cache = PodCache::default();
    let queue: WorkQueue<ResourceKey> = WorkQueue::new();
    let exporter = LogExporter::new(cluster.clone(), config.log_dir.clone());
    let reconciler = Arc::new(Reconciler::new(
        cluster.clone(),
        cache.clone(),
        queue.clone(),
        exporter,
        config.selectors.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let informer = Informer::new(cluster, cache, queue.clone(), shutdown_rx);

    let mut workers = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let reconciler = reconciler.clone();
        workers.push(tokio::spawn(reconciler.run()));
    }

    let mut informer_task = tokio::spawn(informer.run());

    tokio::select! {
        // Only returns early on a fatal initial-sync failure
        result = &mut informer_task => {
            queue.shut_down();
            for worker in workers {
                worker.await?;
            }
            return Ok(result??);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, draining in-flight work");
            let _ = shutdown_tx.send(true);
        }
    }

    // Cooperative shutdown: the informer loop stops, blocked queue gets
    // return immediately, and in-flight reconciles run to completion.
    queue.shut_down();
    informer_task.await??;
    for worker in workers {
        worker.await?;
    }

    Ok(())
}
