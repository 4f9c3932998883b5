// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deduplicating, rate-limited work queue.
//!
//! The queue enforces per-key mutual exclusion: a key handed to one worker is
//! never handed to a second until the first calls [`WorkQueue::done`]. A key
//! re-added while in flight is marked dirty and re-delivered exactly once
//! after processing finishes. This is what makes the reconciler safe to scale
//! to multiple workers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::constants::backoff;

struct Inner<K> {
    queue: VecDeque<K>,
    /// Keys awaiting or requiring processing; doubles as the dedup set.
    dirty: HashSet<K>,
    /// Keys currently held by a worker.
    processing: HashSet<K>,
    /// Per-key failure counts driving the rate limiter.
    retries: HashMap<K, u32>,
    shutting_down: bool,
}

struct Shared<K> {
    inner: Mutex<Inner<K>>,
    /// One permit per queued key; closed on shutdown so blocked `get` calls
    /// return immediately.
    items: Semaphore,
    base_delay: Duration,
    max_delay: Duration,
}

pub struct WorkQueue<K> {
    state: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_backoff(
            Duration::from_millis(backoff::BASE_DELAY_MS),
            Duration::from_secs(backoff::MAX_DELAY_SECS),
        )
    }

    pub fn with_backoff(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    retries: HashMap::new(),
                    shutting_down: false,
                }),
                items: Semaphore::new(0),
                base_delay,
                max_delay,
            }),
        }
    }

    /// Enqueue a key unless it is already queued. If the key is currently
    /// being processed it is only marked dirty and will be re-delivered once
    /// the worker calls `done`.
    pub fn add(&self, key: K) {
        let mut inner = self.state.inner.lock().unwrap();
        if inner.shutting_down {
            return;
        }
        if !inner.dirty.insert(key.clone()) {
            return;
        }
        if inner.processing.contains(&key) {
            return;
        }
        inner.queue.push_back(key);
        drop(inner);

        self.state.items.add_permits(1);
    }

    /// Block until a key is available, marking it in-flight. Returns `None`
    /// once the queue has been shut down.
    pub async fn get(&self) -> Option<K> {
        let permit = self.state.items.acquire().await.ok()?;
        permit.forget();

        let mut inner = self.state.inner.lock().unwrap();
        let key = inner.queue.pop_front()?;
        inner.dirty.remove(&key);
        inner.processing.insert(key.clone());

        Some(key)
    }

    /// Mark a key no longer in flight. If it went dirty while being processed
    /// it is re-enqueued for exactly one more delivery.
    pub fn done(&self, key: &K) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.processing.remove(key);

        if inner.dirty.contains(key) && !inner.shutting_down {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.state.items.add_permits(1);
        }
    }

    /// Re-enqueue a key after an exponentially increasing delay derived from
    /// its failure count.
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut inner = self.state.inner.lock().unwrap();
            if inner.shutting_down {
                return;
            }
            let count = inner.retries.entry(key.clone()).or_insert(0);
            let delay = backoff_delay(*count, self.state.base_delay, self.state.max_delay);
            *count += 1;
            delay
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Current failure count for a key.
    pub fn num_requeues(&self, key: &K) -> u32 {
        let inner = self.state.inner.lock().unwrap();
        inner.retries.get(key).copied().unwrap_or(0)
    }

    /// Clear retry history for a key. Call on success or when giving up.
    pub fn forget(&self, key: &K) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.retries.remove(key);
    }

    /// Stop accepting work and release all blocked `get` calls. Keys already
    /// handed to workers stay valid until their `done` call.
    pub fn shut_down(&self) {
        {
            let mut inner = self.state.inner.lock().unwrap();
            inner.shutting_down = true;
        }
        self.state.items.close();
    }

    pub fn len(&self) -> usize {
        self.state.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn backoff_delay(retries: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(retries).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |delay| delay.min(max))
}
