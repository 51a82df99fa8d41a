//! Scripted estimator for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rt_core::{
    EstimateError, EstimateResult, EstimationWindow, Estimator, IncidenceSeries, RawEstimate,
};

/// Estimator returning synthetic values derived from day-over-day growth.
///
/// Counts its invocations and can be told to fail, so callers can observe
/// caching and error paths without a real estimation.
#[derive(Debug, Default)]
pub struct ScriptedEstimator {
    calls: AtomicUsize,
    /// Number of upcoming calls that fail
    failures: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_delay_ms(self, delay_ms: u64) -> Self {
        if delay_ms == 0 {
            self
        } else {
            self.with_delay(Duration::from_millis(delay_ms))
        }
    }

    /// Make the next `count` calls fail with `EstimationFailed`
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of times `estimate` has been called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever in progress at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Marks one call as in progress until dropped
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Estimator for ScriptedEstimator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn estimate(
        &self,
        series: &IncidenceSeries,
        window: EstimationWindow,
        _nsim: usize,
    ) -> EstimateResult<RawEstimate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EstimateError::failed("scripted estimator failure"));
        }

        let counts = series.counts();
        let point: Vec<f64> = (window.begin..=window.end)
            .map(|day| {
                let previous = counts[day - 1];
                if previous > 0.0 {
                    counts[day] / previous
                } else {
                    1.0
                }
            })
            .collect();

        Ok(RawEstimate {
            lower: point.iter().map(|r| r * 0.8).collect(),
            upper: point.iter().map(|r| r * 1.2).collect(),
            point,
        })
    }
}
