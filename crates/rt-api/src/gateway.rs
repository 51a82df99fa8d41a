//! Estimation gateway - validation, memoization, and estimator invocation
//!
//! One pass per request:
//!
//! ```text
//! IncidenceRequest ─▶ validate ─▶ cache key ─▶ cached? ──yes──▶ result
//!                                                │
//!                                                no
//!                                                ▼
//!                          estimator (window, NSIM) ─▶ pad ─▶ store ─▶ result
//! ```

use std::sync::Arc;
use std::time::Instant;

use rt_core::{
    EstimateError, EstimateResult, EstimationResult, Estimator, IncidenceRequest,
    IncidenceSeries, NSIM,
};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::cache::{CacheOutcome, EstimateCache};

/// Front door for Rt estimation
pub struct EstimationGateway {
    estimator: Arc<dyn Estimator>,
    cache: EstimateCache,
    /// Bounds concurrent estimator invocations across all keys
    permits: Arc<Semaphore>,
}

impl EstimationGateway {
    /// Create a gateway allowing `max_concurrent` simultaneous estimations
    /// (at least one).
    pub fn new(estimator: Arc<dyn Estimator>, max_concurrent: usize) -> Self {
        Self {
            estimator,
            cache: EstimateCache::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Name of the backing estimator
    pub fn estimator_name(&self) -> &str {
        self.estimator.name()
    }

    pub fn cache(&self) -> &EstimateCache {
        &self.cache
    }

    /// Estimate Rt for `request`, serving repeated requests from the cache
    pub async fn estimate(&self, request: IncidenceRequest) -> EstimateResult<EstimationResult> {
        let series = Arc::new(IncidenceSeries::try_from(request)?);
        let key = series.cache_key();
        let days = series.len();

        let compute = {
            let estimator = Arc::clone(&self.estimator);
            let permits = Arc::clone(&self.permits);
            move || run_estimation(estimator, permits, series)
        };
        let (result, outcome) = self.cache.get_or_try_insert_with(key, compute).await?;

        if outcome == CacheOutcome::Hit {
            debug!(days, "Using cached response");
        }
        Ok(result)
    }
}

/// Run one estimation. The permit is held by the computation itself, so it
/// stays taken until the estimator returns even if the requester is gone.
async fn run_estimation(
    estimator: Arc<dyn Estimator>,
    permits: Arc<Semaphore>,
    series: Arc<IncidenceSeries>,
) -> EstimateResult<EstimationResult> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| EstimateError::failed("estimation gateway is closed"))?;

    let window = series.window();
    info!(
        days = series.len(),
        begin = window.begin,
        end = window.end,
        estimator = estimator.name(),
        "Estimating Rt"
    );

    let started = Instant::now();
    let raw = estimator.estimate(&series, window, NSIM).await?;
    let result = EstimationResult::from_window(series.len(), window, raw)?;

    info!(
        days = series.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Estimate complete"
    );
    Ok(result)
}
