//! Derivation counter registry
//!
//! One monotone counter per (mint, keyset). Blinded secrets are derived
//! deterministically from the wallet seed and a counter index, so an index
//! must never be handed out twice, not even across crashes. [`reserve`]
//! therefore persists the advanced value through the [`CounterStore`]
//! before returning the range: a crash after persistence wastes indices,
//! which is acceptable; reusing them is not.
//!
//! [`reserve`]: CounterRegistry::reserve

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::KeysetId;

/// Key of one derivation counter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Mint url
    pub mint_url: MintUrl,
    /// Keyset id
    pub keyset_id: KeysetId,
}

/// A reserved, contiguous range of derivation indices `[start, start + count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRange {
    /// First index of the range
    pub start: u64,
    /// Number of indices reserved
    pub count: u64,
}

/// Persistence for derivation counters
#[async_trait]
pub trait CounterStore: Debug + Send + Sync {
    /// Load all persisted counters
    async fn load(&self) -> Result<Vec<(CounterKey, u64)>, Error>;

    /// Persist one counter value
    async fn save(&self, key: &CounterKey, value: u64) -> Result<(), Error>;
}

/// In-memory [`CounterStore`]
///
/// Outlives a [`CounterRegistry`] built from it, which is what the restart
/// tests lean on.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<CounterKey, u64>>,
}

impl MemoryCounterStore {
    /// Create new [`MemoryCounterStore`]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self) -> Result<Vec<(CounterKey, u64)>, Error> {
        Ok(self
            .counters
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }

    async fn save(&self, key: &CounterKey, value: u64) -> Result<(), Error> {
        self.counters.lock().await.insert(key.clone(), value);
        Ok(())
    }
}

/// Registry of derivation counters
#[derive(Debug)]
pub struct CounterRegistry {
    counters: RwLock<HashMap<CounterKey, u64>>,
    store: Arc<dyn CounterStore>,
}

impl CounterRegistry {
    /// Create a registry from the persisted counter state
    pub async fn load(store: Arc<dyn CounterStore>) -> Result<Self, Error> {
        let counters = store.load().await?.into_iter().collect();
        Ok(Self {
            counters: RwLock::new(counters),
            store,
        })
    }

    /// Reserve `count` derivation indices and advance the counter.
    ///
    /// The advanced value is persisted before the range is returned, so a
    /// crash between persisting and using the range leaves a gap instead of
    /// a collision. On a persistence failure nothing is handed out and the
    /// counter is unchanged.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        mint_url: &MintUrl,
        keyset_id: &KeysetId,
        count: u64,
    ) -> Result<CounterRange, Error> {
        let key = CounterKey {
            mint_url: mint_url.clone(),
            keyset_id: keyset_id.clone(),
        };

        let mut counters = self.counters.write().await;
        let current = counters.get(&key).copied().unwrap_or(0);
        let next = current
            .checked_add(count)
            .ok_or(Error::AmountOverflow)?;

        self.store.save(&key, next).await?;
        counters.insert(key, next);

        tracing::debug!(
            "Reserved counter range {}..{} for mint {} keyset {}",
            current,
            next,
            mint_url,
            keyset_id
        );

        Ok(CounterRange {
            start: current,
            count,
        })
    }

    /// Current counter value for a (mint, keyset) pair
    pub async fn current(&self, mint_url: &MintUrl, keyset_id: &KeysetId) -> u64 {
        let key = CounterKey {
            mint_url: mint_url.clone(),
            keyset_id: keyset_id.clone(),
        };
        self.counters.read().await.get(&key).copied().unwrap_or(0)
    }

    /// Raise the counter to at least `value`, persisting the new value.
    ///
    /// Used after a restore scan so fresh derivations start past the
    /// recovered range. Never lowers a counter.
    #[instrument(skip(self))]
    pub async fn bump_to(
        &self,
        mint_url: &MintUrl,
        keyset_id: &KeysetId,
        value: u64,
    ) -> Result<u64, Error> {
        let key = CounterKey {
            mint_url: mint_url.clone(),
            keyset_id: keyset_id.clone(),
        };

        let mut counters = self.counters.write().await;
        let current = counters.get(&key).copied().unwrap_or(0);
        if value <= current {
            return Ok(current);
        }

        self.store.save(&key, value).await?;
        counters.insert(key, value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn test_key() -> (MintUrl, KeysetId) {
        (
            MintUrl::from_str("https://mint.example.com").unwrap(),
            KeysetId::from_str("00916bbf7ef91a36").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_reserve_is_contiguous_and_monotone() {
        let store = MemoryCounterStore::new();
        let registry = CounterRegistry::load(store).await.unwrap();
        let (mint_url, keyset_id) = test_key();

        let first = registry.reserve(&mint_url, &keyset_id, 3).await.unwrap();
        let second = registry.reserve(&mint_url, &keyset_id, 5).await.unwrap();

        assert_eq!(0, first.start);
        assert_eq!(3, second.start);
        assert_eq!(8, registry.current(&mint_url, &keyset_id).await);
    }

    #[tokio::test]
    async fn test_counters_are_independent_per_keyset() {
        let store = MemoryCounterStore::new();
        let registry = CounterRegistry::load(store).await.unwrap();
        let (mint_url, keyset_id) = test_key();
        let other_keyset = KeysetId::from_str("00916bbf7ef91a37").unwrap();

        registry.reserve(&mint_url, &keyset_id, 4).await.unwrap();
        let range = registry.reserve(&mint_url, &other_keyset, 2).await.unwrap();

        assert_eq!(0, range.start);
        assert_eq!(4, registry.current(&mint_url, &keyset_id).await);
        assert_eq!(2, registry.current(&mint_url, &other_keyset).await);
    }

    #[tokio::test]
    async fn test_restart_never_reuses_indices() {
        let store = MemoryCounterStore::new();
        let (mint_url, keyset_id) = test_key();

        // reserve, then drop the registry as a simulated crash before the
        // derived secrets were ever used
        {
            let registry = CounterRegistry::load(store.clone()).await.unwrap();
            registry.reserve(&mint_url, &keyset_id, 10).await.unwrap();
        }

        let registry = CounterRegistry::load(store).await.unwrap();
        let range = registry.reserve(&mint_url, &keyset_id, 1).await.unwrap();

        // the unused indices are wasted, not recycled
        assert_eq!(10, range.start);
    }

    #[tokio::test]
    async fn test_bump_to_is_monotone() {
        let store = MemoryCounterStore::new();
        let registry = CounterRegistry::load(store).await.unwrap();
        let (mint_url, keyset_id) = test_key();

        registry.reserve(&mint_url, &keyset_id, 7).await.unwrap();
        assert_eq!(
            7,
            registry.bump_to(&mint_url, &keyset_id, 3).await.unwrap()
        );
        assert_eq!(
            20,
            registry.bump_to(&mint_url, &keyset_id, 20).await.unwrap()
        );
    }

    #[derive(Debug, Default)]
    struct FailingStore {
        fail: AtomicBool,
    }

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn load(&self) -> Result<Vec<(CounterKey, u64)>, Error> {
            Ok(vec![])
        }

        async fn save(&self, _key: &CounterKey, _value: u64) -> Result<(), Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_persistence_hands_out_nothing() {
        let store = Arc::new(FailingStore::default());
        let registry = CounterRegistry::load(store.clone()).await.unwrap();
        let (mint_url, keyset_id) = test_key();

        registry.reserve(&mint_url, &keyset_id, 2).await.unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(registry.reserve(&mint_url, &keyset_id, 2).await.is_err());

        // counter did not advance past the failed reservation
        assert_eq!(2, registry.current(&mint_url, &keyset_id).await);
    }
}
