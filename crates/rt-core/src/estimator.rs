//! Estimator trait - the seam between the gateway and a statistical backend

use async_trait::async_trait;

use crate::error::EstimateResult;
use crate::models::{EstimationWindow, IncidenceSeries, RawEstimate};

/// Number of resamples used for the confidence bounds
pub const NSIM: usize = 1000;

/// A time-dependent reproduction number estimator.
///
/// Implementations own their generation-time prior, which is configured once
/// when the estimator is built and never changes per request.
///
/// `estimate` must return three series of exactly `window.len()` entries,
/// the n-th entry corresponding to day `window.begin + n` of `series`.
/// Entries that the method cannot compute may be non-finite; the gateway
/// turns them into absent markers.
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Short identifier used in logs (e.g. "native", "rscript")
    fn name(&self) -> &str;

    /// Estimate R(t) over `window` using `nsim` resamples for the bounds
    async fn estimate(
        &self,
        series: &IncidenceSeries,
        window: EstimationWindow,
        nsim: usize,
    ) -> EstimateResult<RawEstimate>;
}
