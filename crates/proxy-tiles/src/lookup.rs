//! Cache for card-database lookups (alternate language printings).
//!
//! Kept apart from the tile store so clearing one never touches the other.
//! Confirmed misses are cached too, so a printing known not to exist is not
//! asked for again. Failed lookups are never cached.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::{TileStore, put_or_log};
use crate::types::Result;

/// Outcome of a lookup that reached the card database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lookup<V> {
    Found(V),
    /// The database answered and has no such printing
    Unavailable,
}

pub struct LookupCache<V> {
    store: Arc<dyn TileStore>,
    _value: PhantomData<fn() -> V>,
}

impl<V> LookupCache<V>
where
    V: Serialize + DeserializeOwned + Send,
{
    pub fn new(store: Arc<dyn TileStore>) -> Self {
        Self {
            store,
            _value: PhantomData,
        }
    }

    pub fn key(set: &str, collector_number: &str, lang: &str) -> String {
        format!("lang_{}_{}_{}", set, collector_number, lang)
    }

    /// Cached outcome, or `None` if this printing was never looked up
    pub async fn get(
        &self,
        set: &str,
        collector_number: &str,
        lang: &str,
    ) -> Result<Option<Lookup<V>>> {
        let key = Self::key(set, collector_number, lang);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(lookup) => Ok(Some(lookup)),
            Err(e) => {
                log::debug!("Ignoring unreadable lookup entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn record(
        &self,
        set: &str,
        collector_number: &str,
        lang: &str,
        lookup: &Lookup<V>,
    ) -> bool {
        let key = Self::key(set, collector_number, lang);
        match serde_json::to_vec(lookup) {
            Ok(bytes) => put_or_log(self.store.as_ref(), &key, bytes).await,
            Err(e) => {
                log::warn!("Failed to serialize lookup {}: {}", key, e);
                false
            }
        }
    }

    /// Return the cached outcome or run `fetch` and cache what it confirms.
    ///
    /// `fetch` yields `Ok(Some)` for a hit, `Ok(None)` for a confirmed miss
    /// and `Err` for a failure, which is passed through uncached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        set: &str,
        collector_number: &str,
        lang: &str,
        fetch: F,
    ) -> std::result::Result<Lookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
    {
        match self.get(set, collector_number, lang).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => log::warn!("Lookup cache read failed, fetching: {}", e),
        }

        let lookup = match fetch().await? {
            Some(value) => Lookup::Found(value),
            None => Lookup::Unavailable,
        };
        self.record(set, collector_number, lang, &lookup).await;
        Ok(lookup)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}
