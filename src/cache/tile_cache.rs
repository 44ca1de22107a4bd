use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::codec::Argb32Buffer;
use crate::error::CziError;

/// Default cache budget: 64MB, large enough to hold a handful of full-size
/// mosaic tiles without needing per-level tuning in the common case.
pub const DEFAULT_CACHE_SIZE: u64 = 64 * 1024 * 1024;

/// Cache key: identifies one decoded tile within one level of one slide.
///
/// `level_identity` distinguishes levels that happen to share a downsample
/// value (two scenes, say) — callers pass a token unique to the `Level`
/// (its index is sufficient within one open `Slide`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileFingerprint {
    pub level_identity: usize,
    pub tile_id: i64,
    pub plane: i32,
}

impl TileFingerprint {
    pub fn new(level_identity: usize, tile_id: i64, plane: i32) -> Self {
        Self {
            level_identity,
            tile_id,
            plane,
        }
    }
}

/// A live, reference-counted borrow of a cache entry.
///
/// Because this wraps an `Arc`, the buffer stays valid for as long as any
/// `EntryRef` clone is held, even if the cache itself evicts the key in the
/// meantime — cloning out of an `LruCache` never invalidates outstanding
/// clones of the `Arc` it held.
pub type EntryRef = Arc<Argb32Buffer>;

fn buffer_size(buf: &Argb32Buffer) -> u64 {
    buf.pixels.len() as u64
}

/// Bounded decoded-tile cache, shared across concurrent paints of one slide.
///
/// `get_or_decode` is the primary entry point: it implements the cache
/// contract from the per-tile read algorithm directly — check cache, and on
/// miss, decode exactly once even if multiple callers race on the same key.
pub struct TileCache {
    cache: RwLock<LruCache<TileFingerprint, EntryRef>>,
    budget_bytes: u64,
    current_size: RwLock<u64>,
    in_flight: Mutex<HashMap<TileFingerprint, Arc<Notify>>>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_CACHE_SIZE)
    }

    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            // Capacity is nominal; real eviction is size-driven below, but
            // `LruCache` still needs a bound to allocate its internal map.
            cache: RwLock::new(LruCache::new(NonZeroUsize::new(4096).unwrap())),
            budget_bytes,
            current_size: RwLock::new(0),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a tile without decoding it.
    pub async fn get(&self, key: &TileFingerprint) -> Option<EntryRef> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Fetch a tile from cache, or decode it via `decode` exactly once across
    /// any concurrently-racing callers for the same key.
    pub async fn get_or_decode<F, Fut>(
        &self,
        key: TileFingerprint,
        decode: F,
    ) -> Result<EntryRef, CziError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Argb32Buffer, CziError>>,
    {
        if let Some(entry) = self.get(&key).await {
            tracing::debug!(?key, "tile cache hit");
            return Ok(entry);
        }

        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(notify) = in_flight.get(&key) {
                let notify = notify.clone();
                drop(in_flight);
                tracing::debug!(?key, "tile cache miss, waiting on in-flight decode");
                notify.notified().await;
                // The leader has finished (success or failure); re-check the
                // cache rather than re-decoding.
                return match self.get(&key).await {
                    Some(entry) => Ok(entry),
                    None => decode().await.map(|buf| Arc::new(buf)),
                };
            }
            let notify = Arc::new(Notify::new());
            in_flight.insert(key, notify.clone());
            notify
        };

        tracing::debug!(?key, "tile cache miss, decoding");
        let result = decode().await;

        {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.remove(&key);
        }
        notify.notify_waiters();

        let buf = result?;
        let entry: EntryRef = Arc::new(buf);
        self.put(key, entry.clone()).await;
        Ok(entry)
    }

    async fn put(&self, key: TileFingerprint, entry: EntryRef) {
        let size = buffer_size(&entry);
        let mut cache = self.cache.write().await;
        let mut current = self.current_size.write().await;

        if let Some(old) = cache.put(key, entry) {
            *current -= buffer_size(&old);
        }
        *current += size;

        while *current > self.budget_bytes {
            match cache.pop_lru() {
                Some((_, evicted)) => *current -= buffer_size(&evicted),
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn size(&self) -> u64 {
        *self.current_size.read().await
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current = self.current_size.write().await;
        cache.clear();
        *current = 0;
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn buf(n: usize) -> Argb32Buffer {
        Argb32Buffer {
            width: 1,
            height: 1,
            pixels: vec![0u8; n],
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = TileCache::new();
        let key = TileFingerprint::new(0, 1, 0);
        let calls = AtomicUsize::new(0);

        let entry = cache
            .get_or_decode(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(buf(16))
            })
            .await
            .unwrap();
        assert_eq!(entry.pixels.len(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let entry2 = cache
            .get_or_decode(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(buf(16))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1); // second call was a cache hit
        assert!(Arc::ptr_eq(&entry, &entry2));
    }

    #[tokio::test]
    async fn test_size_based_eviction() {
        let cache = TileCache::with_budget(100);
        let k1 = TileFingerprint::new(0, 1, 0);
        let k2 = TileFingerprint::new(0, 2, 0);
        let k3 = TileFingerprint::new(0, 3, 0);

        cache.get_or_decode(k1, || async { Ok(buf(60)) }).await.unwrap();
        cache.get_or_decode(k2, || async { Ok(buf(60)) }).await.unwrap();
        // k1 should have been evicted to stay under the 100-byte budget.
        assert!(cache.get(&k1).await.is_none());
        assert!(cache.get(&k2).await.is_some());

        cache.get_or_decode(k3, || async { Ok(buf(10)) }).await.unwrap();
        assert!(cache.size().await <= 100);
    }

    #[tokio::test]
    async fn test_decode_error_propagates_and_is_not_cached() {
        let cache = TileCache::new();
        let key = TileFingerprint::new(0, 1, 0);

        let result: Result<EntryRef, CziError> = cache
            .get_or_decode(key, || async {
                Err(crate::error::DataError::NoLevels.into())
            })
            .await;
        assert!(result.is_err());
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = TileCache::new();
        let key = TileFingerprint::new(0, 1, 0);
        cache.get_or_decode(key, || async { Ok(buf(16)) }).await.unwrap();
        assert_eq!(cache.len().await, 1);
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_decode_singleflight() {
        use tokio::time::{sleep, Duration};

        let cache = Arc::new(TileCache::new());
        let key = TileFingerprint::new(0, 1, 0);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_decode(key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        Ok(buf(8))
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
