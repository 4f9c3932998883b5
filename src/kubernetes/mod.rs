// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster-facing types: the pod API abstraction and key/metadata helpers.

pub mod client;
pub mod pods;

pub use client::{retry_on_conflict, ClusterClient, KubeClusterClient, PodEvent};
pub use pods::ResourceKey;
