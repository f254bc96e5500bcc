//! Staleness Cache
//!
//! Holds the last successfully fetched value of one data class together
//! with the time it was fetched.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A cached value and the instant the fetch that produced it completed
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// Value + timestamp holder for a single data class
#[derive(Debug, Clone)]
pub struct StalenessCache<T> {
    entry: Option<CacheEntry<T>>,
}

impl<T> Default for StalenessCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T: Clone> StalenessCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&T> {
        self.entry.as_ref().map(|e| &e.value)
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|e| e.fetched_at)
    }

    /// Age of the cached value, `None` when nothing has been fetched yet
    pub fn age(&self) -> Option<Duration> {
        self.fetched_at().map(|at| Instant::now().saturating_duration_since(at))
    }

    /// Whether the cached value may still be served for `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        matches!(self.age(), Some(age) if age <= ttl)
    }

    /// Return the cached value if it is within `ttl`, otherwise call
    /// `refresh` and store its result.
    ///
    /// A failed refresh leaves the cache exactly as it was.
    pub async fn get_or_refresh<F, Fut, E>(&mut self, ttl: Duration, refresh: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(entry) = &self.entry {
            if Instant::now().saturating_duration_since(entry.fetched_at) <= ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = refresh().await?;
        let fetched_at = Instant::now();
        debug!(?ttl, "Cache refreshed");
        self.entry = Some(CacheEntry {
            value: value.clone(),
            fetched_at,
        });
        Ok(value)
    }
}
