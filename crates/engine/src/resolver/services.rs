use std::any::{Any, TypeId};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dataloader::{CacheFactory, DataLoader, Loader};
use fxhash::FxHashMap;

/// Request-scoped services resolvers can pull out of the [`FieldContext`](crate::resolver::FieldContext),
/// keyed by type. The GraphQL equivalent of a request's dependency injection
/// scope: database handles, the authenticated user, etc.
#[derive(Default)]
pub struct RequestServices {
    services: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous one of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: T) -> &mut Self {
        self.services.insert(TypeId::of::<T>(), Box::new(service));
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|service| service.downcast_ref())
    }
}

/// Lazily created, request-scoped [`DataLoader`] instances.
///
/// Loaders are keyed by their concrete `(key, loader, cache)` types, so all
/// resolvers of a request asking for the same loader share one instance and
/// therefore one batching window and one cache.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Mutex<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request's loader of this type, creating it with `init` on
    /// first use.
    pub fn get_or_create<K, T, C>(&self, init: impl FnOnce() -> DataLoader<K, T, C>) -> Arc<DataLoader<K, T, C>>
    where
        K: Send + Sync + Hash + Eq + Clone + 'static,
        T: Loader<K>,
        C: CacheFactory<K, T::Value>,
    {
        let mut loaders = self.loaders.lock().unwrap_or_else(|err| err.into_inner());
        let entry = loaders
            .entry(TypeId::of::<(K, T, C)>())
            .or_insert_with(|| Arc::new(init()));
        match Arc::clone(entry).downcast::<DataLoader<K, T, C>>() {
            Ok(loader) => loader,
            // Entries are keyed by their concrete type.
            Err(_) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::resolver::tokio_spawner;

    struct SquareLoader;

    #[async_trait::async_trait]
    impl Loader<u64> for SquareLoader {
        type Value = u64;
        type Error = String;

        async fn load(&self, keys: &[u64]) -> Result<HashMap<u64, u64>, String> {
            Ok(keys.iter().map(|&k| (k, k * k)).collect())
        }
    }

    #[test]
    fn services_are_keyed_by_type() {
        struct Database(&'static str);

        let mut services = RequestServices::new();
        services.insert(Database("primary"));
        services.insert(42u32);

        assert_eq!(services.get::<Database>().unwrap().0, "primary");
        assert_eq!(*services.get::<u32>().unwrap(), 42);
        assert!(services.get::<String>().is_none());
    }

    #[tokio::test]
    async fn same_loader_type_shares_one_instance() {
        let registry = LoaderRegistry::new();
        let first = registry.get_or_create(|| DataLoader::new(SquareLoader, tokio_spawner));
        let second = registry.get_or_create(|| DataLoader::new(SquareLoader, tokio_spawner));
        assert!(Arc::ptr_eq(&first, &second));

        assert_eq!(first.load_one(3).await.unwrap(), Some(9));
    }
}
