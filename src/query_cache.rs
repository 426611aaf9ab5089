//! Keyed store for server state.
//!
//! Each key owns one entry holding the last data, the last error and the
//! bookkeeping needed to decide freshness and eviction. Fetches run on worker
//! threads and report back over a channel; [`QueryCache::poll`] drains that
//! channel on the UI thread, so every entry is only ever written from there.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{BlogError, Result};

/// Called from worker threads once a result has been queued, so the UI can
/// schedule a frame that drains it.
pub type RepaintNotifier = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    data: Option<V>,
    error: Option<BlogError>,
    fetching: bool,
    updated_at: Option<Instant>,
    fetched_at: Option<DateTime<Local>>,
    last_observed: Instant,
    // Observed since the last garbage collection pass.
    observed: bool,
}

impl<V> CacheEntry<V> {
    fn new() -> Self {
        Self {
            data: None,
            error: None,
            fetching: false,
            updated_at: None,
            fetched_at: None,
            last_observed: Instant::now(),
            observed: false,
        }
    }

    pub fn status(&self) -> FetchStatus {
        if self.fetching {
            FetchStatus::Pending
        } else if self.error.is_some() {
            FetchStatus::Error
        } else if self.data.is_some() {
            FetchStatus::Success
        } else {
            FetchStatus::Idle
        }
    }

    pub fn data(&self) -> Option<&V> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&BlogError> {
        self.error.as_ref()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    /// Wall-clock time of the last successful fetch.
    pub fn fetched_at(&self) -> Option<DateTime<Local>> {
        self.fetched_at
    }

    /// Fresh means: has data, no error, and was written less than `stale_time` ago.
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        self.error.is_none()
            && self.data.is_some()
            && self
                .updated_at
                .is_some_and(|updated| updated.elapsed() < stale_time)
    }
}

struct FetchOutcome<K, V> {
    key: K,
    result: Result<V>,
}

pub struct QueryCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    sender: Sender<FetchOutcome<K, V>>,
    receiver: Receiver<FetchOutcome<K, V>>,
    retry: RetryPolicy,
    gc_time: Duration,
    notifier: Option<RepaintNotifier>,
}

impl<K, V> QueryCache<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(gc_time: Duration, retry: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            entries: HashMap::new(),
            sender,
            receiver,
            retry,
            gc_time,
            notifier: None,
        }
    }

    pub fn set_notifier(&mut self, notifier: RepaintNotifier) {
        self.notifier = Some(notifier);
    }

    pub fn entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_fresh(&self, key: &K, stale_time: Duration) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_fresh(stale_time))
    }

    pub fn is_fetching(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.fetching)
    }

    pub fn has_pending(&self) -> bool {
        self.entries.values().any(|entry| entry.fetching)
    }

    /// Marks the entry as observed by a view, which keeps it away from eviction.
    pub fn touch(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_observed = Instant::now();
            entry.observed = true;
        }
    }

    /// Starts a fetch for `key` on a worker thread.
    ///
    /// Returns `false` without doing anything when a fetch for the same key is
    /// already in flight; the caller observes that pending entry instead.
    pub fn fetch<F>(&mut self, key: K, fetch_fn: F) -> bool
    where
        F: Fn() -> Result<V> + Send + 'static,
    {
        let entry = self.entries.entry(key).or_insert_with(CacheEntry::new);
        if entry.fetching {
            debug!(?key, "fetch already in flight, coalescing");
            return false;
        }

        entry.fetching = true;
        if entry.data.is_none() {
            entry.error = None;
        }
        debug!(?key, "starting fetch");

        let sender = self.sender.clone();
        let notifier = self.notifier.clone();
        let retry = self.retry;

        thread::spawn(move || {
            let mut attempt = 0;
            let result = loop {
                match fetch_fn() {
                    Err(err) if err.is_retryable() && attempt < retry.retries => {
                        let delay = retry.delay(attempt);
                        warn!(?key, attempt, ?delay, error = %err, "fetch failed, retrying");
                        thread::sleep(delay);
                        attempt += 1;
                    }
                    other => break other,
                }
            };

            // The receiver only goes away with the cache itself.
            let _ = sender.send(FetchOutcome { key, result });
            if let Some(notify) = notifier {
                notify();
            }
        });

        true
    }

    /// Fills `key` ahead of navigation without subscribing a view.
    ///
    /// No-op while the entry is fresh or already being fetched.
    pub fn prefetch<F>(&mut self, key: K, stale_time: Duration, fetch_fn: F) -> bool
    where
        F: Fn() -> Result<V> + Send + 'static,
    {
        if self.is_fresh(&key, stale_time) || self.is_fetching(&key) {
            debug!(?key, "prefetch skipped");
            return false;
        }
        debug!(?key, "prefetching");
        self.fetch(key, fetch_fn)
    }

    /// Applies every finished fetch to its own entry. Returns how many landed.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(FetchOutcome { key, result }) = self.receiver.try_recv() {
            let entry = self.entries.entry(key).or_insert_with(CacheEntry::new);
            entry.fetching = false;
            match result {
                Ok(data) => {
                    entry.data = Some(data);
                    entry.error = None;
                    entry.updated_at = Some(Instant::now());
                    entry.fetched_at = Some(Local::now());
                    debug!(?key, "fetch succeeded");
                }
                Err(err) => {
                    warn!(?key, error = %err, "fetch failed");
                    entry.error = Some(err);
                }
            }
            applied += 1;
        }
        applied
    }

    /// Evicts entries nobody has observed for longer than the gc time.
    /// Entries with a fetch in flight, or observed since the previous pass,
    /// are kept whatever the gc time.
    pub fn collect_garbage(&mut self) -> usize {
        let gc_time = self.gc_time;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let keep = entry.fetching || entry.observed || entry.last_observed.elapsed() < gc_time;
            entry.observed = false;
            keep
        });
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted unobserved cache entries");
        }
        evicted
    }
}
