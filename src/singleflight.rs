//! Single-flight coordinator: collapses concurrent requests for the
//! same fingerprint into one in-flight origin fetch, fanning the shared
//! outcome out to every waiter. Grounded in
//! `enterprise::cache::invalidation`'s use of `DashMap` +
//! `tokio::sync::broadcast` for pub/sub fan-out, adapted here to a
//! request-coalescing rendezvous instead of an invalidation event bus.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::{CacheError, CacheResult};
use crate::fingerprint::Fingerprint;

type SharedOutcome<T> = Result<Arc<T>, Arc<CacheError>>;

/// Coalesces concurrent calls to [`SingleFlight::run`] for the same key
/// into a single execution of the supplied future. At most one fetch is
/// ever in flight per key; every
/// waiter receives the same success or error outcome; a waiter dropping
/// its own future never cancels the shared fetch, since the leader task
/// runs detached from any one caller.
pub struct SingleFlight<T> {
    inflight: DashMap<Fingerprint, broadcast::Sender<SharedOutcome<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { inflight: DashMap::new() }
    }
}

impl<T> SingleFlight<T>
where
    T: Send + Sync + 'static,
{
    /// Construct an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `produce` for `key`, or join the fetch already in flight for it.
    ///
    /// The first caller for a given `key` becomes the leader: it spawns
    /// `produce` on the Tokio runtime (so a panic inside it surfaces as a
    /// `JoinError`, not an aborted future for every waiter), publishes the
    /// shared result to any followers, then removes the entry so the next
    /// call starts a fresh fetch. Followers subscribe to the leader's
    /// broadcast channel and block only on the leader's outcome, never on
    /// the leader's own caller.
    pub async fn run<F, Fut>(self: &Arc<Self>, key: Fingerprint, produce: F) -> CacheResult<Arc<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let mut rx = match self.inflight.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied.get().subscribe(),
            Entry::Vacant(vacant) => {
                let (tx, rx) = broadcast::channel(1);
                vacant.insert(tx.clone());
                self.spawn_leader(key, produce, tx);
                rx
            }
        };

        match rx.recv().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(shared_err)) => Err((*shared_err).clone()),
            Err(_) => Err(CacheError::Cancellation),
        }
    }

    fn spawn_leader<F, Fut>(
        self: &Arc<Self>,
        key: Fingerprint,
        produce: F,
        tx: broadcast::Sender<SharedOutcome<T>>,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let joined = tokio::spawn(produce()).await;
            let outcome: SharedOutcome<T> = match joined {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(err)) => Err(Arc::new(err)),
                Err(join_err) => Err(Arc::new(CacheError::OriginFailure(format!(
                    "origin fetch task failed: {join_err}"
                )))),
            };
            this.inflight.remove(&key);
            // No receivers left (every waiter already gave up) is not an
            // error for the leader; the outcome simply has nowhere to go.
            let _ = tx.send(outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(Fingerprint::testing_from_raw("shared-key"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42u32)
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_outcome_is_shared_by_all_waiters() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flight = flight.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(Fingerprint::testing_from_raw("failing-key"), || async move {
                        Err(CacheError::OriginFailure("boom".to_string()))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
    }

    #[tokio::test]
    async fn sequential_calls_after_completion_run_again() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            flight
                .run(Fingerprint::testing_from_raw("seq-key"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1u32)
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
