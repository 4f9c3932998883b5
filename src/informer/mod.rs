// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watcher and local cache for the filtered pod set.

pub mod cache;
pub mod watcher;

pub use cache::PodCache;
pub use watcher::Informer;
