// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The finalizer that blocks pod deletion until its logs are exported.
pub const FINALIZER: &str = "operator.logs/finalizer";

/// Work queue retry configuration
pub mod retry {
    /// Maximum number of rate-limited requeues before a key is given up on
    pub const MAX_RECONCILE_ATTEMPTS: u32 = 25;
    /// Maximum fetch-modify-submit cycles when an update hits a version conflict
    pub const MAX_CONFLICT_ATTEMPTS: u32 = 5;
    /// Initial delay between conflict retries in milliseconds
    pub const CONFLICT_BASE_DELAY_MS: u64 = 25;
    /// Cap on the delay between conflict retries in milliseconds
    pub const CONFLICT_MAX_DELAY_MS: u64 = 250;
}

/// Per-key exponential backoff for failed reconciles
pub mod backoff {
    /// Initial requeue delay in milliseconds
    pub const BASE_DELAY_MS: u64 = 5;
    /// Cap on the requeue delay in seconds
    pub const MAX_DELAY_SECS: u64 = 30;
}

/// Watch stream recovery configuration
pub mod resync {
    /// Initial delay before retrying a failed re-list, in seconds
    pub const RELIST_INTERVAL_SECS: u64 = 1;
    /// Maximum delay between re-list attempts (exponential backoff cap)
    pub const RELIST_MAX_INTERVAL_SECS: u64 = 60;
}
