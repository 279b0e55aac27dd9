use std::collections::HashMap;
use std::hash::Hash;

/// Factory for the per-loader-instance result cache.
pub trait CacheFactory<K, V>: Send + Sync + 'static
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Storage: CacheStorage<Key = K, Value = V>;

    fn create(&self) -> Self::Storage;
}

/// Cache storage for a [`DataLoader`](crate::DataLoader). Lives exactly as
/// long as the loader instance, i.e. one request.
pub trait CacheStorage: Send + Sync + 'static {
    type Key: Send + Sync + Clone + Eq + Hash + 'static;
    type Value: Send + Sync + Clone + 'static;

    fn get(&mut self, key: &Self::Key) -> Option<&Self::Value>;

    fn insert(&mut self, key: Self::Key, value: Self::Value);

    fn remove(&mut self, key: &Self::Key);

    fn clear(&mut self);
}

/// No caching: every dispatch window fetches anew, only in-window
/// deduplication applies.
#[derive(Clone, Copy, Default)]
pub struct NoCache;

impl<K, V> CacheFactory<K, V> for NoCache
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Storage = NoCacheImpl<K, V>;

    fn create(&self) -> Self::Storage {
        NoCacheImpl {
            _mark: std::marker::PhantomData,
        }
    }
}

pub struct NoCacheImpl<K, V> {
    _mark: std::marker::PhantomData<(K, V)>,
}

impl<K, V> CacheStorage for NoCacheImpl<K, V>
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&mut self, _key: &K) -> Option<&V> {
        None
    }

    fn insert(&mut self, _key: K, _value: V) {}

    fn remove(&mut self, _key: &K) {}

    fn clear(&mut self) {}
}

/// Unbounded [`HashMap`]-backed cache; the right default for a
/// request-scoped loader.
#[derive(Clone, Copy, Default)]
pub struct HashMapCache;

impl<K, V> CacheFactory<K, V> for HashMapCache
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Storage = HashMapCacheImpl<K, V>;

    fn create(&self) -> Self::Storage {
        HashMapCacheImpl(HashMap::new())
    }
}

pub struct HashMapCacheImpl<K, V>(HashMap<K, V>);

impl<K, V> CacheStorage for HashMapCacheImpl<K, V>
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&mut self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    fn insert(&mut self, key: K, value: V) {
        self.0.insert(key, value);
    }

    fn remove(&mut self, key: &K) {
        self.0.remove(key);
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}
