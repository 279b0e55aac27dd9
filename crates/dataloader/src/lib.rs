//! Request-scoped batching and caching of fetches, in the dataloader
//! lineage: concurrent `load_one` calls issued within one dispatch window
//! are deduplicated per key and coalesced into a single call to the
//! [`Loader`]'s batch function, whose results are fanned back out to every
//! waiting caller.
//!
//! Reference: <https://github.com/facebook/dataloader>

mod cache;
mod loader;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_channel::oneshot;
use futures_util::future::BoxFuture;
use indexmap::IndexSet;

pub use cache::{CacheFactory, CacheStorage, HashMapCache, NoCache};
pub use loader::Loader;

/// How a batch gets dispatched once `load` has registered its keys.
enum Action<K: Send + Sync + Hash + Eq + Clone + 'static, T: Loader<K>> {
    /// The max batch size was hit: flush right away.
    ImmediateLoad(KeysAndSenders<K, T>),
    /// First keys of a new window: arm the delayed flush.
    StartFetch,
    /// A flush is already armed, just wait for it.
    Delay,
}

type KeysAndSenders<K, T> = (
    IndexSet<K>,
    Vec<(IndexSet<K>, ResSender<K, <T as Loader<K>>::Value, <T as Loader<K>>::Error>)>,
);

struct ResSender<K: Hash + Eq, V, E> {
    use_cache_values: HashMap<K, V>,
    tx: oneshot::Sender<Result<HashMap<K, V>, E>>,
}

struct Requests<K: Send + Sync + Hash + Eq + Clone + 'static, T: Loader<K>, C: CacheFactory<K, T::Value>> {
    // First-occurrence insertion order is preserved so the batch function
    // sees keys in the order they were first requested.
    keys: IndexSet<K>,
    pending: Vec<(IndexSet<K>, ResSender<K, T::Value, T::Error>)>,
    cache_storage: C::Storage,
    disable_cache: bool,
}

impl<K, T, C> Requests<K, T, C>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
    C: CacheFactory<K, T::Value>,
{
    fn new(cache_factory: &C) -> Self {
        Self {
            keys: IndexSet::new(),
            pending: Vec::new(),
            cache_storage: cache_factory.create(),
            disable_cache: false,
        }
    }

    fn take(&mut self) -> KeysAndSenders<K, T> {
        (
            std::mem::take(&mut self.keys),
            std::mem::take(&mut self.pending),
        )
    }
}

struct DataLoaderInner<K: Send + Sync + Hash + Eq + Clone + 'static, T: Loader<K>, C: CacheFactory<K, T::Value>> {
    requests: Mutex<Requests<K, T, C>>,
    loader: T,
}

impl<K, T, C> DataLoaderInner<K, T, C>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
    C: CacheFactory<K, T::Value>,
{
    async fn do_load(&self, (keys, senders): KeysAndSenders<K, T>) {
        let keys: Vec<K> = keys.into_iter().collect();
        tracing::debug!(batch_size = keys.len(), "dispatching loader batch");

        match self.loader.load(&keys).await {
            Ok(values) => {
                // Update the cache first, then fan results out per caller.
                let mut requests = self.requests.lock().unwrap();
                if !requests.disable_cache {
                    for (key, value) in &values {
                        requests
                            .cache_storage
                            .insert(key.clone(), value.clone());
                    }
                }
                drop(requests);

                for (keys, sender) in senders {
                    let mut res = sender.use_cache_values;
                    for key in &keys {
                        if let Some(value) = values.get(key) {
                            res.insert(key.clone(), value.clone());
                        }
                        // Keys absent from the loader's result map resolve
                        // to "not found" for their callers, not an error.
                    }
                    let _ = sender.tx.send(Ok(res));
                }
            }
            Err(err) => {
                // Total-batch failure: every caller of this dispatch gets
                // the same underlying error.
                for (_, sender) in senders {
                    let _ = sender.tx.send(Err(err.clone()));
                }
            }
        }
    }
}

/// Deduplicating, batching scheduler for one kind of fetch.
///
/// An instance is scoped to a single request: its cache and in-flight
/// dedup table live exactly as long as the instance.
pub struct DataLoader<K: Send + Sync + Hash + Eq + Clone + 'static, T: Loader<K>, C: CacheFactory<K, T::Value> = NoCache>
{
    inner: Arc<DataLoaderInner<K, T, C>>,
    delay: Duration,
    max_batch_size: usize,
    spawner: Box<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>,
}

impl<K, T> DataLoader<K, T, NoCache>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    /// Creates a loader without a result cache: each dispatch window
    /// deduplicates, but a key requested again in a later window is
    /// fetched again.
    pub fn new<S>(loader: T, spawner: S) -> Self
    where
        S: Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    {
        Self::with_cache(loader, spawner, NoCache)
    }
}

impl<K, T, C> DataLoader<K, T, C>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
    C: CacheFactory<K, T::Value>,
{
    pub fn with_cache<S>(loader: T, spawner: S, cache_factory: C) -> Self
    where
        S: Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DataLoaderInner {
                requests: Mutex::new(Requests::new(&cache_factory)),
                loader,
            }),
            delay: Duration::from_millis(1),
            max_batch_size: 1000,
            spawner: Box::new(spawner),
        }
    }

    /// Length of the dispatch window, i.e. how long the first `load` of a
    /// batch waits for siblings before flushing. Defaults to `1ms`.
    #[must_use]
    pub fn delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Keys reaching this threshold are flushed immediately instead of
    /// waiting out the window. Defaults to `1000`.
    #[must_use]
    pub fn max_batch_size(self, max_batch_size: usize) -> Self {
        Self { max_batch_size, ..self }
    }

    pub fn loader(&self) -> &T {
        &self.inner.loader
    }

    /// Loads one key, returning `None` if the batch function did not
    /// produce a value for it.
    pub async fn load_one(&self, key: K) -> Result<Option<T::Value>, T::Error> {
        let mut values = self.load_many(std::iter::once(key.clone())).await?;
        Ok(values.remove(&key))
    }

    /// Loads a set of keys through the batching window. The returned map
    /// only contains keys the loader produced values for.
    pub async fn load_many<I>(&self, keys: I) -> Result<HashMap<K, T::Value>, T::Error>
    where
        I: IntoIterator<Item = K>,
    {
        let (action, rx) = {
            let mut requests = self.inner.requests.lock().unwrap();
            let prev_count = requests.keys.len();
            let mut keys_set = IndexSet::new();
            let mut use_cache_values = HashMap::new();

            if requests.disable_cache {
                keys_set = keys.into_iter().collect();
            } else {
                for key in keys {
                    if let Some(value) = requests.cache_storage.get(&key) {
                        use_cache_values.insert(key.clone(), value.clone());
                    } else {
                        keys_set.insert(key);
                    }
                }
            }

            if keys_set.is_empty() {
                return Ok(use_cache_values);
            }

            requests.keys.extend(keys_set.iter().cloned());
            let (tx, rx) = oneshot::channel();
            requests
                .pending
                .push((keys_set, ResSender { use_cache_values, tx }));

            if requests.keys.len() >= self.max_batch_size {
                (Action::<K, T>::ImmediateLoad(requests.take()), rx)
            } else if prev_count == 0 {
                (Action::StartFetch, rx)
            } else {
                (Action::Delay, rx)
            }
        };

        match action {
            Action::ImmediateLoad(keys) => {
                let inner = self.inner.clone();
                (self.spawner)(Box::pin(async move {
                    inner.do_load(keys).await;
                }));
            }
            Action::StartFetch => {
                let inner = self.inner.clone();
                let delay = self.delay;
                (self.spawner)(Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    let keys = inner.requests.lock().unwrap().take();
                    if !keys.0.is_empty() {
                        inner.do_load(keys).await;
                    }
                }));
            }
            Action::Delay => {}
        }

        // The sender is only dropped after a value or error was produced
        // for every pending caller, so this cannot fail.
        rx.await.unwrap()
    }

    /// Seeds the cache, so later `load` calls for these keys never reach
    /// the batch function. No effect with [`NoCache`].
    pub fn feed_many<I>(&self, values: I)
    where
        I: IntoIterator<Item = (K, T::Value)>,
    {
        let mut requests = self.inner.requests.lock().unwrap();
        for (key, value) in values {
            requests.cache_storage.insert(key, value);
        }
    }

    pub fn feed_one(&self, key: K, value: T::Value) {
        self.feed_many(std::iter::once((key, value)));
    }

    /// Enables or disables the cache for subsequent loads.
    pub fn enable_cache(&self, enable: bool) {
        self.inner.requests.lock().unwrap().disable_cache = !enable;
    }

    /// Clears the cache. No effect with [`NoCache`].
    pub fn clear(&self) {
        self.inner.requests.lock().unwrap().cache_storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use pretty_assertions::assert_eq;

    use super::*;

    struct EchoLoader {
        batches: Arc<StdMutex<Vec<Vec<u64>>>>,
    }

    #[async_trait::async_trait]
    impl Loader<u64> for EchoLoader {
        type Value = u64;
        type Error = String;

        async fn load(&self, keys: &[u64]) -> Result<HashMap<u64, u64>, String> {
            self.batches.lock().unwrap().push(keys.to_vec());
            Ok(keys.iter().map(|&k| (k, k * 10)).collect())
        }
    }

    fn spawner(fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }

    #[tokio::test]
    async fn coalesces_concurrent_loads_into_one_batch() {
        let batches = Arc::new(StdMutex::new(Vec::new()));
        let loader = DataLoader::new(EchoLoader { batches: batches.clone() }, spawner);

        let (a, b, c, d, e) = tokio::join!(
            loader.load_one(1),
            loader.load_one(2),
            loader.load_one(2),
            loader.load_one(3),
            loader.load_one(1),
        );
        assert_eq!(a.unwrap(), Some(10));
        assert_eq!(b.unwrap(), Some(20));
        assert_eq!(c.unwrap(), Some(20));
        assert_eq!(d.unwrap(), Some(30));
        assert_eq!(e.unwrap(), Some(10));

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_keys_resolve_to_not_found() {
        struct Sparse;

        #[async_trait::async_trait]
        impl Loader<u64> for Sparse {
            type Value = u64;
            type Error = String;

            async fn load(&self, keys: &[u64]) -> Result<HashMap<u64, u64>, String> {
                Ok(keys.iter().filter(|&&k| k != 7).map(|&k| (k, k)).collect())
            }
        }

        let loader = DataLoader::new(Sparse, spawner);
        let (found, missing) = tokio::join!(loader.load_one(1), loader.load_one(7));
        assert_eq!(found.unwrap(), Some(1));
        assert_eq!(missing.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_failure_reaches_every_caller() {
        struct Failing;

        #[async_trait::async_trait]
        impl Loader<u64> for Failing {
            type Value = u64;
            type Error = String;

            async fn load(&self, _keys: &[u64]) -> Result<HashMap<u64, u64>, String> {
                Err("backend down".to_string())
            }
        }

        let loader = DataLoader::new(Failing, spawner);
        let (a, b) = tokio::join!(loader.load_one(1), loader.load_one(2));
        assert_eq!(a.unwrap_err(), "backend down");
        assert_eq!(b.unwrap_err(), "backend down");
    }

    #[tokio::test]
    async fn caches_within_the_request() {
        let batches = Arc::new(StdMutex::new(Vec::new()));
        let loader = DataLoader::with_cache(
            EchoLoader { batches: batches.clone() },
            spawner,
            HashMapCache::default(),
        );

        assert_eq!(loader.load_one(1).await.unwrap(), Some(10));
        assert_eq!(loader.load_one(1).await.unwrap(), Some(10));
        assert_eq!(batches.lock().unwrap().len(), 1);

        loader.clear();
        assert_eq!(loader.load_one(1).await.unwrap(), Some(10));
        assert_eq!(batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn feed_bypasses_the_batch_function() {
        let batches = Arc::new(StdMutex::new(Vec::new()));
        let loader = DataLoader::with_cache(
            EchoLoader { batches: batches.clone() },
            spawner,
            HashMapCache::default(),
        );

        loader.feed_one(5, 555);
        assert_eq!(loader.load_one(5).await.unwrap(), Some(555));
        assert!(batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn max_batch_size_flushes_immediately() {
        let batches = Arc::new(StdMutex::new(Vec::new()));
        let loader =
            DataLoader::new(EchoLoader { batches: batches.clone() }, spawner).max_batch_size(2);

        let (a, b) = tokio::join!(loader.load_one(1), loader.load_one(2));
        assert_eq!(a.unwrap(), Some(10));
        assert_eq!(b.unwrap(), Some(20));
        assert_eq!(batches.lock().unwrap().len(), 1);
    }
}
