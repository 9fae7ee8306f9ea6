//! In-process cache backend.

use core::future::{self, Future};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::CacheProvider;
use crate::error::{LedgerError, Result};

/// Entry counts at or above this trigger the first sweep of expired entries.
const SWEEP_THRESHOLD: usize = 1024;

/// Thread-safe in-process cache with lazy expiry.
///
/// Expired entries are dropped when they are next touched, and swept in
/// bulk whenever a map outgrows its sweep mark.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    /// All state behind a single mutex.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Cached values.
    values: Expiring<String>,
    /// Counters keyed by name; the expiry is the end of the window.
    counters: Expiring<u64>,
}

/// A map whose entries carry an optional expiry instant.
///
/// `None` means the deadline does not fit in an [`Instant`]; such an entry
/// never expires.
#[derive(Debug)]
struct Expiring<V> {
    /// Entries with their expiry.
    entries: HashMap<String, (V, Option<Instant>)>,
    /// Length at which the next insert sweeps expired entries.
    sweep_at: usize,
}

impl<V> Default for Expiring<V> {
    #[inline]
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: SWEEP_THRESHOLD,
        }
    }
}

impl<V> Expiring<V> {
    /// Removes every entry expired at `now` once the map reaches its sweep
    /// mark, then moves the mark so live entries are not rescanned on every
    /// insert.
    fn sweep(&mut self, now: Instant) {
        if self.entries.len() < self.sweep_at {
            return;
        }
        self.entries.retain(|_, entry| is_live(entry.1, now));
        self.sweep_at = SWEEP_THRESHOLD.max(self.entries.len().saturating_mul(2));
    }
}

/// Whether an entry with expiry `expires` is still live at `now`.
fn is_live(expires: Option<Instant>, now: Instant) -> bool {
    expires.is_none_or(|at| at > now)
}

/// Expiry of an entry stored at `now` for `ttl`; `None` past the clock range.
fn expiry(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F: FnOnce(&mut Inner) -> R>(&self, f: F) -> Result<R> {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(f(&mut inner))
    }

    /// Synchronous lookup backing [`CacheProvider::get`].
    fn get_now(&self, key: &str, now: Instant) -> Result<Option<String>> {
        self.with_lock(|inner| {
            let live = inner
                .values
                .entries
                .get(key)
                .filter(|entry| is_live(entry.1, now))
                .map(|entry| entry.0.clone());
            if live.is_none() {
                let _expired = inner.values.entries.remove(key);
            }
            live
        })
    }

    /// Synchronous store backing [`CacheProvider::set_with_ttl`].
    fn set_now(&self, key: &str, value: String, ttl: Duration, now: Instant) -> Result<()> {
        self.with_lock(|inner| {
            inner.values.sweep(now);
            let _old = inner
                .values
                .entries
                .insert(key.to_owned(), (value, expiry(now, ttl)));
        })
    }

    /// Synchronous increment backing [`CacheProvider::increment_counter`].
    fn increment_now(&self, key: &str, window: Duration, now: Instant) -> Result<u64> {
        self.with_lock(|inner| {
            inner.counters.sweep(now);
            let entry = inner
                .counters
                .entries
                .entry(key.to_owned())
                .or_insert((0, expiry(now, window)));
            if !is_live(entry.1, now) {
                *entry = (0, expiry(now, window));
            }
            entry.0 = entry.0.saturating_add(1);
            entry.0
        })
    }
}

/// Wraps a mutex poison error.
fn lock_error<T>(err: &PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

impl CacheProvider for InMemoryCache {
    #[inline]
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        future::ready(self.get_now(key, Instant::now()))
    }

    #[inline]
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.set_now(key, value, ttl, Instant::now()))
    }

    #[inline]
    fn increment_counter(
        &self,
        key: &str,
        window: Duration,
    ) -> impl Future<Output = Result<u64>> + Send {
        future::ready(self.increment_now(key, window, Instant::now()))
    }
}
