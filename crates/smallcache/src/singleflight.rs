//! Request coalescing for concurrent computations of the same key.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::Instrument;

use crate::utils::defer::defer;

type CallChannel<T> = Shared<oneshot::Receiver<T>>;
type CallMap<T> = Arc<Mutex<HashMap<String, CallChannel<T>>>>;

/// The in-flight computation went away without producing a result.
///
/// This happens when the computation panics or the runtime shuts down while it is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("in-flight computation was dropped before completing")]
pub struct Cancelled;

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key spawns its computation, every caller arriving while it runs joins
/// that computation and receives a clone of its result. The call is forgotten as soon as it
/// completes, so a later caller starts a fresh computation. Results are never memoized here.
///
/// The lock guarding the bookkeeping is only held while registering or removing a call, never
/// while a computation runs, so computations for different keys proceed in parallel.
pub struct SingleFlight<T> {
    calls: CallMap<T>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `computation` for `key`, unless one is already in flight.
    ///
    /// NOTE: This function itself is *not* `async`, the call is registered (or joined) eagerly and
    /// the computation is spawned onto the current tokio runtime even if the returned future is
    /// never awaited. Dropping the returned future does not cancel the computation.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn work<F>(&self, key: &str, computation: F) -> BoxFuture<'static, Result<T, Cancelled>>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let channel = {
            let mut calls = self.calls.lock();
            if let Some(channel) = calls.get(key) {
                crate::metric!(counter("singleflight.joined") += 1);
                tracing::trace!(key, "Joining in-flight computation");
                channel.clone()
            } else {
                crate::metric!(counter("singleflight.started") += 1);
                let channel = self.spawn_call(key.to_owned(), computation);
                let evicted = calls.insert(key.to_owned(), channel.clone());
                debug_assert!(evicted.is_none());
                channel
            }
        };

        channel.map(|result| result.map_err(|_| Cancelled)).boxed()
    }

    /// The number of computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn spawn_call<F>(&self, key: String, computation: F) -> CallChannel<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let calls = self.calls.clone();
        let remove_call = defer(move || {
            calls.lock().remove(&key);
        });

        let call = async move {
            let result = computation.await;
            // Evict before publishing: callers either join a channel that will receive data, or
            // they start a new computation.
            remove_call.run();
            sender.send(result).ok();
        };
        tokio::spawn(call.in_current_span());

        receiver.shared()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self.calls.try_lock().map(|calls| calls.len());
        f.debug_struct("SingleFlight")
            .field("in_flight", &in_flight)
            .finish()
    }
}
