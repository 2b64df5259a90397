use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::facerec::TrainData;

/// The two logical keys the service ever caches under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Serialized profiles snapshot, as served to clients.
    Profiles,
    /// Training set built from confirmed face rows.
    TrainData,
}

#[derive(Clone)]
pub enum CacheValue {
    Profiles(Arc<Vec<u8>>),
    TrainData(Arc<TrainData>),
}

impl CacheValue {
    pub fn into_profiles(self) -> Option<Arc<Vec<u8>>> {
        match self {
            CacheValue::Profiles(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_train_data(self) -> Option<Arc<TrainData>> {
        match self {
            CacheValue::TrainData(v) => Some(v),
            _ => None,
        }
    }
}

/// Get-or-compute store for the expensive aggregations.
///
/// One lock guards the whole table: a miss holds it across the factory, so
/// a lookup for the other key waits too. With two keys and rare misses the
/// coarse lock is not worth refining; what it buys is that the factory runs
/// at most once per key between invalidations, no matter how many callers
/// race the miss.
///
/// Owned by the composition root and shared by reference; there is no
/// process-global instance.
#[derive(Default)]
pub struct Cache {
    table: Mutex<HashMap<CacheKey, CacheValue>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing and storing it on miss.
    /// A factory error is returned to the caller and nothing is cached.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, make: F) -> Result<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>>,
    {
        let mut table = self.table.lock().await;
        if let Some(value) = table.get(&key) {
            return Ok(value.clone());
        }
        let value = make().await?;
        table.insert(key, value.clone());
        Ok(value)
    }

    /// Drop the cached value for `key`; the next lookup recomputes.
    pub async fn invalidate(&self, key: CacheKey) {
        self.table.lock().await.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn profile_bytes(n: usize) -> CacheValue {
        CacheValue::Profiles(Arc::new(vec![n as u8]))
    }

    #[tokio::test]
    async fn factory_runs_once_until_invalidated() {
        let cache = Cache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute(CacheKey::Profiles, || async {
                    Ok(profile_bytes(calls.fetch_add(1, Ordering::SeqCst)))
                })
                .await
                .unwrap();
            assert_eq!(*value.into_profiles().unwrap(), vec![0]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(CacheKey::Profiles).await;
        let value = cache
            .get_or_compute(CacheKey::Profiles, || async {
                Ok(profile_bytes(calls.fetch_add(1, Ordering::SeqCst)))
            })
            .await
            .unwrap();
        assert_eq!(*value.into_profiles().unwrap(), vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_invalidated_independently() {
        let cache = Cache::new();
        cache
            .get_or_compute(CacheKey::Profiles, || async { Ok(profile_bytes(7)) })
            .await
            .unwrap();
        cache.invalidate(CacheKey::TrainData).await;

        let calls = AtomicUsize::new(0);
        let value = cache
            .get_or_compute(CacheKey::Profiles, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(profile_bytes(0))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*value.into_profiles().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn failed_factory_caches_nothing() {
        let cache = Cache::new();
        let err = cache
            .get_or_compute(CacheKey::Profiles, || async { anyhow::bail!("boom") })
            .await;
        assert!(err.is_err());

        let value = cache
            .get_or_compute(CacheKey::Profiles, || async { Ok(profile_bytes(1)) })
            .await
            .unwrap();
        assert_eq!(*value.into_profiles().unwrap(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let cache = Arc::new(Cache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute(CacheKey::Profiles, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the computation long enough for the others
                        // to pile up on the miss.
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(profile_bytes(42))
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            let value = task.await.unwrap();
            assert_eq!(*value.into_profiles().unwrap(), vec![42]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
