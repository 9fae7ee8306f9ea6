//! Cache and quota provider boundary.
//!
//! The classification engine memoizes results and meters external calls
//! through a [`CacheProvider`]. [`InMemoryCache`] is the bundled backend;
//! a shared cache such as Redis can be plugged in by implementing the
//! trait.

mod memory;

use core::future::Future;
use core::time::Duration;

pub use memory::InMemoryCache;

use crate::error::Result;

/// Async key-value store with expiry plus windowed counters.
///
/// All methods take `&self`; implementations use interior mutability.
pub trait CacheProvider: core::fmt::Debug + Send + Sync {
    /// Returns the live value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Stores `value` under `key` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Increments the counter under `key` and returns its new value.
    ///
    /// A counter starts at zero and resets once `window` has elapsed since
    /// its first increment.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn increment_counter(
        &self,
        key: &str,
        window: Duration,
    ) -> impl Future<Output = Result<u64>> + Send;
}
