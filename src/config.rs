// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{LogstowError, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Command line arguments for the controller
#[derive(Parser, Debug)]
#[command(name = "logstow", about = "Exports pod logs before deletion completes")]
pub struct Args {
    /// Namespace with pods to watch
    #[arg(long, env = "LOGSTOW_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Pod label selectors with comma separators, example: key1=value1,key2=value2
    #[arg(long, env = "LOGSTOW_SELECTORS", default_value = "app=busy-logger")]
    pub selectors: String,

    /// Root directory for exported log files
    #[arg(long, env = "LOGSTOW_LOG_DIR", default_value = "var/log/copy")]
    pub log_dir: PathBuf,

    /// Number of concurrent reconcile workers
    #[arg(long, env = "LOGSTOW_WORKERS", default_value_t = 1)]
    pub workers: usize,
}

/// Controller configuration with the selector expression parsed and validated
#[derive(Debug, Clone)]
pub struct Config {
    pub namespace: String,
    pub selectors: BTreeMap<String, String>,
    pub log_dir: PathBuf,
    pub workers: usize,
}

impl Config {
    /// Validate parsed arguments. An invalid selector expression is a startup
    /// error, not something to limp along with.
    pub fn from_args(args: Args) -> Result<Self> {
        let selectors = parse_selectors(&args.selectors)?;

        Ok(Config {
            namespace: args.namespace,
            selectors,
            log_dir: args.log_dir,
            workers: args.workers.max(1),
        })
    }

    /// Format the selector map back into the `key=value,...` form the API
    /// server expects as a labelSelector query parameter.
    pub fn selector_string(&self) -> String {
        self.selectors
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse a `key1=value1,key2=value2` expression. Every segment must contain
/// exactly one `=` with non-empty key and value.
pub fn parse_selectors(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut selectors = BTreeMap::new();

    for segment in raw.split(',') {
        let Some((key, value)) = segment.split_once('=') else {
            return Err(LogstowError::InvalidSelector(segment.to_string()));
        };

        if key.is_empty() || value.is_empty() || value.contains('=') {
            return Err(LogstowError::InvalidSelector(segment.to_string()));
        }

        selectors.insert(key.to_string(), value.to_string());
    }

    Ok(selectors)
}
