//! Coalescing, memoizing lookup cache shared by all resolvers.
//!
//! Every key maps to a [`Slot`]. The first caller for an unknown key moves
//! it to `Pending` and starts exactly one fetch; later callers queue as
//! waiters on that slot. The fetch runs as its own task owned by the cache,
//! so callers that go away (an unmounted view) never strand a slot: the
//! result still lands in the cache for everyone else.
//!
//! Successful values are kept for the life of the cache. Failures reset the
//! slot to `Unresolved` so the next access retries.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use classchat_shared::FetchError;

type Waiter<V> = oneshot::Sender<Result<V, FetchError>>;

enum Slot<V> {
    Pending(Vec<Waiter<V>>),
    Resolved(V),
    Unresolved(FetchError),
}

/// Non-blocking view of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<V> {
    Pending,
    Value(V),
    Failed(FetchError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fetches actually started.
    pub fetches: u64,
    /// Calls answered from a resolved slot.
    pub hits: u64,
    /// Calls that joined an in-flight fetch.
    pub coalesced: u64,
}

struct CacheInner<K, V> {
    name: &'static str,
    timeout: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
    fetches: AtomicU64,
    hits: AtomicU64,
    coalesced: AtomicU64,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Display,
    V: Clone,
{
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, key: K, result: Result<V, FetchError>) {
        let waiters = {
            let mut slots = self.lock();
            let next = match &result {
                Ok(value) => Slot::Resolved(value.clone()),
                Err(e) => Slot::Unresolved(e.clone()),
            };
            match slots.insert(key, next) {
                Some(Slot::Pending(waiters)) => waiters,
                _ => Vec::new(),
            }
        };

        for waiter in waiters {
            // A dropped receiver means its caller is gone; nothing to do.
            let _ = waiter.send(result.clone());
        }
    }
}

pub struct CoalescingCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for CoalescingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `timeout` bounds every fetch; expiry counts as a failure.
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                name,
                timeout,
                slots: Mutex::new(HashMap::new()),
                fetches: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached value for `key`, join the in-flight fetch, or start
    /// one with `fetch`. Must be called from within a tokio runtime.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut slots = self.inner.lock();
            match slots.get_mut(&key) {
                Some(Slot::Resolved(value)) => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value.clone());
                }
                Some(Slot::Pending(waiters)) => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    waiters.push(tx);
                    false
                }
                Some(Slot::Unresolved(_)) | None => {
                    self.inner.fetches.fetch_add(1, Ordering::Relaxed);
                    slots.insert(key.clone(), Slot::Pending(vec![tx]));
                    true
                }
            }
        };

        if start {
            debug!(cache = self.inner.name, key = %key, "Starting fetch");
            self.spawn_fetch(key, fetch());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transient(format!(
                "{} fetch abandoned",
                self.inner.name
            ))),
        }
    }

    /// Current state of `key` without starting any work. `None` if the key
    /// was never requested.
    pub fn peek(&self, key: &K) -> Option<Resolution<V>> {
        match self.inner.lock().get(key)? {
            Slot::Pending(_) => Some(Resolution::Pending),
            Slot::Resolved(value) => Some(Resolution::Value(value.clone())),
            Slot::Unresolved(e) => Some(Resolution::Failed(e.clone())),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            hits: self.inner.hits.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
        }
    }

    fn spawn_fetch<Fut>(&self, key: K, fut: Fut)
    where
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            // A panicking fetch still has to settle its slot, or every waiter
            // for the key would hang.
            let guarded = AssertUnwindSafe(fut).catch_unwind();
            let result = match tokio::time::timeout(inner.timeout, guarded).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(FetchError::Transient(format!(
                    "{} fetch panicked",
                    inner.name
                ))),
                Err(_) => Err(FetchError::TimedOut(inner.timeout)),
            };
            if let Err(e) = &result {
                warn!(cache = inner.name, key = %key, error = %e, "Fetch failed");
            }
            inner.complete(key, result);
        });
    }
}
