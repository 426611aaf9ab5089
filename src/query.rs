use chrono::{DateTime, Local};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use crate::error::{BlogError, Result};
use crate::query_cache::QueryCache;

/// What a view sees of one cache entry on a given frame.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<V> {
    pub data: Option<V>,
    pub error: Option<BlogError>,
    /// No data and no error yet.
    pub is_loading: bool,
    pub is_error: bool,
    /// A fetch is in flight, possibly in the background behind cached data.
    pub is_fetching: bool,
    pub fetched_at: Option<DateTime<Local>>,
}

impl<V> QueryResult<V> {
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> QueryResult<U> {
        QueryResult {
            data: self.data.map(f),
            error: self.error,
            is_loading: self.is_loading,
            is_error: self.is_error,
            is_fetching: self.is_fetching,
            fetched_at: self.fetched_at,
        }
    }
}

/// A view's subscription to one key of a [`QueryCache`].
///
/// Fetching happens only when the subscription is (re)established: on the
/// first observation and whenever the observed key changes. Observing the
/// same key on later frames just reads the cache, unless its entry has been
/// evicted in the meantime.
#[derive(Debug)]
pub struct Query<K> {
    key: Option<K>,
    stale_time: Duration,
}

impl<K> Query<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    pub fn new(stale_time: Duration) -> Self {
        Self {
            key: None,
            stale_time,
        }
    }

    pub fn key(&self) -> Option<K> {
        self.key
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn observe<V, F>(&mut self, cache: &mut QueryCache<K, V>, key: K, fetch_fn: F) -> QueryResult<V>
    where
        V: Clone + Send + 'static,
        F: Fn() -> Result<V> + Send + 'static,
    {
        let resubscribed = self.key != Some(key);
        self.key = Some(key);
        // An evicted entry has to be refilled even for an unchanged key,
        // otherwise the view would sit on "Loading..." for good.
        if (resubscribed && !cache.is_fresh(&key, self.stale_time)) || cache.entry(&key).is_none() {
            cache.fetch(key, fetch_fn);
        }
        cache.touch(&key);
        Self::snapshot(cache, &key)
    }

    /// Fetches the subscribed key again regardless of freshness.
    pub fn refetch<V, F>(&self, cache: &mut QueryCache<K, V>, fetch_fn: F) -> bool
    where
        V: Clone + Send + 'static,
        F: Fn() -> Result<V> + Send + 'static,
    {
        match self.key {
            Some(key) => cache.fetch(key, fetch_fn),
            None => false,
        }
    }

    /// Drops the subscription; the next `observe` counts as a remount.
    pub fn unsubscribe(&mut self) {
        self.key = None;
    }

    fn snapshot<V: Clone + Send + 'static>(cache: &QueryCache<K, V>, key: &K) -> QueryResult<V> {
        match cache.entry(key) {
            Some(entry) => {
                let data = entry.data().cloned();
                let error = entry.error().cloned();
                QueryResult {
                    is_loading: data.is_none() && error.is_none(),
                    is_error: error.is_some(),
                    is_fetching: entry.is_fetching(),
                    fetched_at: entry.fetched_at(),
                    data,
                    error,
                }
            }
            None => QueryResult {
                data: None,
                error: None,
                is_loading: true,
                is_error: false,
                is_fetching: false,
                fetched_at: None,
            },
        }
    }
}
