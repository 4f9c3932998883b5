// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod error;
pub mod exporter;
pub mod informer;
pub mod kubernetes;
pub mod queue;
pub mod reconciler;

#[cfg(test)]
pub mod test_utils;
