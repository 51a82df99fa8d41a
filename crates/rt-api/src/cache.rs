//! Memoization of estimation results
//!
//! Entries live for the lifetime of the process and are never evicted, so
//! memory grows with the number of distinct requests served.
//!
//! Each key maps to a `OnceCell`. The map lock is held only to find, insert,
//! or drop a cell; the cell itself serializes computation, so at most one
//! estimation runs per key while later callers wait for its result.
//!
//! Computations run in their own task. A caller that goes away (client
//! disconnect, timeout) stops waiting but does not stop the computation, and
//! the next caller for the same key picks up its result.
//!
//! A failed computation removes its cell, and the next caller starts over
//! with a fresh one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use rt_core::{CacheKey, EstimateError, EstimateResult, EstimationResult};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<EstimationResult>>;
type Entries = Arc<Mutex<HashMap<CacheKey, Slot>>>;

/// Whether a lookup was served from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Result was already stored (or computed by a concurrent caller)
    Hit,
    /// This caller's computation produced the result
    Miss,
}

/// Why a fill attempt produced no value
enum FillError {
    /// The slot was dropped after a failure; retry with the current one
    Stale,
    Failed(EstimateError),
}

/// Process-wide cache of estimation results keyed by request content
#[derive(Debug, Default)]
pub struct EstimateCache {
    entries: Entries,
}

impl EstimateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a stored or in-flight result
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the stored result for `key`, computing it with `compute` if
    /// absent. Errors are returned to the caller and not stored.
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> EstimateResult<(EstimationResult, CacheOutcome)>
    where
        F: FnOnce() -> Fut + Clone + Send + 'static,
        Fut: Future<Output = EstimateResult<EstimationResult>> + Send + 'static,
    {
        loop {
            let slot = self.slot(&key);
            if let Some(result) = slot.get() {
                return Ok((result.clone(), CacheOutcome::Hit));
            }

            let fill = tokio::spawn(fill(
                Arc::clone(&self.entries),
                key.clone(),
                slot,
                compute.clone(),
            ));
            let attempt = fill.await.map_err(|e| {
                EstimateError::failed(format!("estimation task failed: {}", e))
            })?;

            match attempt {
                Ok(found) => return Ok(found),
                Err(FillError::Stale) => continue,
                Err(FillError::Failed(err)) => return Err(err),
            }
        }
    }

    fn slot(&self, key: &CacheKey) -> Slot {
        Arc::clone(self.entries.lock().entry(key.clone()).or_default())
    }
}

/// Initialize `slot` with `compute`, unless it is no longer the slot stored
/// under `key`. Only the stored slot may compute, so a key never has two
/// computations running.
async fn fill<F, Fut>(
    entries: Entries,
    key: CacheKey,
    slot: Slot,
    compute: F,
) -> Result<(EstimationResult, CacheOutcome), FillError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = EstimateResult<EstimationResult>>,
{
    let mut computed = false;
    let attempt = slot
        .get_or_try_init(|| {
            let current = is_current(&entries, &key, &slot);
            computed = current;
            async move {
                if current {
                    compute().await.map_err(FillError::Failed)
                } else {
                    Err(FillError::Stale)
                }
            }
        })
        .await;

    match attempt {
        Ok(result) => {
            let outcome = if computed {
                CacheOutcome::Miss
            } else {
                CacheOutcome::Hit
            };
            Ok((result.clone(), outcome))
        }
        Err(FillError::Failed(err)) => {
            let mut entries = entries.lock();
            if entries.get(&key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                entries.remove(&key);
            }
            Err(FillError::Failed(err))
        }
        Err(FillError::Stale) => Err(FillError::Stale),
    }
}

fn is_current(entries: &Entries, key: &CacheKey, slot: &Slot) -> bool {
    entries
        .lock()
        .get(key)
        .is_some_and(|s| Arc::ptr_eq(s, slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::{IncidenceRequest, IncidenceSeries};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(offset: u64) -> CacheKey {
        let request = IncidenceRequest::from_counts(
            (0..12).map(|i| i + offset),
            (0..12).map(|i| i.to_string()),
        );
        IncidenceSeries::try_from(request).unwrap().cache_key()
    }

    fn result(value: f64) -> EstimationResult {
        EstimationResult {
            v: vec![None, Some(value)],
            vmin: vec![None, Some(value - 0.5)],
            vmax: vec![None, Some(value + 0.5)],
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = EstimateCache::new();
        assert!(cache.is_empty());

        let (first, outcome) = cache
            .get_or_try_insert_with(key(0), || async { Ok(result(1.5)) })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);

        let (second, outcome) = cache
            .get_or_try_insert_with(key(0), || async { Ok(result(9.9)) })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(first, second);
        assert_eq!(second, result(1.5));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = EstimateCache::new();

        let err = cache
            .get_or_try_insert_with(key(0), || async {
                Err(EstimateError::failed("did not converge"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EstimateError::EstimationFailed(_)));
        // No slot is left behind for the failed key
        assert!(cache.is_empty());

        let (_, outcome) = cache
            .get_or_try_insert_with(key(0), || async { Ok(result(2.0)) })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_distinct_keys_do_not_grow() {
        let cache = EstimateCache::new();
        for offset in 0..5 {
            let _ = cache
                .get_or_try_insert_with(key(offset), || async {
                    Err(EstimateError::failed("no cases"))
                })
                .await;
        }
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys() {
        let cache = EstimateCache::new();
        for offset in 0..3 {
            cache
                .get_or_try_insert_with(key(offset), move || async move {
                    Ok(result(offset as f64))
                })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);

        let (stored, outcome) = cache
            .get_or_try_insert_with(key(2), || async { Ok(result(7.0)) })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(stored, result(2.0));
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_computation() {
        let cache = EstimateCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let slow = {
            let runs = Arc::clone(&runs);
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(result(3.0))
            }
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_try_insert_with(key(0), slow.clone()),
        )
        .await;
        assert!(abandoned.is_err());

        let (value, outcome) = cache.get_or_try_insert_with(key(0), slow).await.unwrap();
        assert_eq!(value, result(3.0));
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
