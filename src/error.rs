// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogstowError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Malformed object: {0}")]
    MalformedObject(String),

    #[error("Log export I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LogstowError {
    /// True if the underlying API error was a 404, meaning the resource is
    /// already gone and there is nothing left to act on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LogstowError::KubeError(kube::Error::Api(e)) if e.code == 404)
    }

    /// True if the underlying API error was a 409 optimistic-concurrency
    /// conflict (stale resourceVersion on update).
    pub fn is_conflict(&self) -> bool {
        matches!(self, LogstowError::KubeError(kube::Error::Api(e)) if e.code == 409)
    }
}

pub type Result<T> = std::result::Result<T, LogstowError>;
