use std::collections::HashMap;
use std::hash::Hash;

/// The batch function: given the deduplicated keys of one dispatch window,
/// produce a value per key.
///
/// Keys absent from the returned map are reported to their callers as "not
/// found" rather than failing them. A loader whose individual keys can fail
/// independently should use `Value = Result<T, E2>`; only the callers of a
/// failed key then observe that error. Returning `Err` from `load` itself
/// fails every caller of the dispatch with a clone of the same error.
#[async_trait::async_trait]
pub trait Loader<K: Send + Sync + Hash + Eq + Clone + 'static>: Send + Sync + 'static {
    type Value: Send + Sync + Clone + 'static;
    type Error: Send + Sync + Clone + 'static;

    async fn load(&self, keys: &[K]) -> Result<HashMap<K, Self::Value>, Self::Error>;
}
