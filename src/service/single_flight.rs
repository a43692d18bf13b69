use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type InFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Request deduplication: concurrent calls with the same key share one
/// execution and one result. The key is released as soon as that execution
/// settles, successfully or not, so the next call starts afresh.
pub struct SingleFlight<K, T, E> {
    in_flight: Arc<Mutex<HashMap<K, InFlight<T, E>>>>,
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { in_flight: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Joins the execution already running under `key`, or starts `start()`.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let registry = Arc::clone(&self.in_flight);
                    let release_key = key.clone();
                    let work = start();
                    let shared = async move {
                        let result = work.await;
                        registry.lock().remove(&release_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };
        shared.await
    }
}

impl<K, T, E> Default for SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
