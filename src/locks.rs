//! Per-key mutual exclusion.

use core::hash::Hash;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{LedgerError, Result};

/// Entries above this count trigger a sweep of unused locks.
const SWEEP_THRESHOLD: usize = 1024;

/// A lazily populated map of one mutex per key.
///
/// Several keys are always locked in sorted order, so two callers locking
/// overlapping key sets cannot deadlock.
#[derive(Debug)]
pub(crate) struct KeyedLocks<K> {
    /// One lock per key seen so far.
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Clone + Eq + Hash + Ord> KeyedLocks<K> {
    /// Runs `op` while holding the lock of every key in `keys`.
    ///
    /// Duplicate keys are locked once.
    pub(crate) fn with_locked<R, F>(&self, keys: Vec<K>, op: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let handles = self.handles(keys)?;
        let mut guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(handles.len());
        for handle in &handles {
            guards.push(handle.lock().map_err(|err| poisoned(&err))?);
        }
        let result = op();
        drop(guards);
        result
    }

    /// Lock handles for `keys`, sorted and deduplicated.
    fn handles(&self, mut keys: Vec<K>) -> Result<Vec<Arc<Mutex<()>>>> {
        keys.sort();
        keys.dedup();
        let mut locks = self.locks.lock().map_err(|err| poisoned(&err))?;
        if locks.len() > SWEEP_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Ok(keys
            .into_iter()
            .map(|key| Arc::clone(locks.entry(key).or_default()))
            .collect())
    }
}

/// Maps a poisoned lock to a storage error.
fn poisoned<T>(err: &PoisonError<T>) -> LedgerError {
    LedgerError::Storage(format!("lock poisoned: {err}").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn serializes_same_key() {
        let locks = Arc::new(KeyedLocks::<u32>::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..8_u32)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    locks
                        .with_locked(vec![7, 7], || {
                            let now = inside.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(now, 0);
                            thread::yield_now();
                            let _prev = inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn overlapping_sets_do_not_deadlock() {
        let locks = Arc::new(KeyedLocks::<&'static str>::default());
        let first = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                for _ in 0..200 {
                    locks.with_locked(vec!["a", "b"], || Ok(())).unwrap();
                }
            })
        };
        for _ in 0..200 {
            locks.with_locked(vec!["b", "a"], || Ok(())).unwrap();
        }
        first.join().unwrap();
    }

    #[test]
    fn returns_operation_result() {
        let locks = KeyedLocks::<u8>::default();
        let value = locks.with_locked(vec![1, 2], || Ok(3)).unwrap();
        assert_eq!(value, 3);
        let err = locks
            .with_locked(vec![1], || Err::<(), _>(LedgerError::invalid("nope")))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }
}
