//! Native time-dependent reproduction number estimator
//!
//! Implements the Wallinga & Teunis (2004) method the way R0's `est.R0.TD`
//! does:
//!
//! 1. Every case on day `j` is attributed to possible infectors on earlier
//!    days `i` in proportion to `w(j - i) * incid(i)`, where `w` is the
//!    discretized generation time.
//! 2. `R(i)` is the expected number of cases attributed to day `i`, divided
//!    by `incid(i)`.
//! 3. Cases infected after the last observation are missing, so `R(i)` is
//!    divided by the probability that a generation interval fits in the
//!    remaining `T - 1 - i` days.
//! 4. Bounds come from `nsim` multinomial resamplings of the attributions,
//!    summarized by their 2.5% and 97.5% quantiles.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};
use rt_core::{
    EstimateError, EstimateResult, EstimationWindow, Estimator, IncidenceSeries, RawEstimate,
};
use tracing::debug;

use crate::generation_time::GenerationTime;

/// Quantiles reported as the confidence bounds
const BOUND_QUANTILES: (f64, f64) = (0.025, 0.975);

/// Largest daily count the resampler draws exactly (2^53)
const MAX_DAILY_CASES: f64 = 9_007_199_254_740_992.0;

/// In-process Wallinga-Teunis estimator
#[derive(Debug, Clone)]
pub struct WallingaTeunisEstimator {
    generation_time: Arc<GenerationTime>,
    seed: u64,
}

impl WallingaTeunisEstimator {
    pub fn new(generation_time: GenerationTime) -> Self {
        Self {
            generation_time: Arc::new(generation_time),
            seed: 1,
        }
    }

    /// Seed for the resampling RNG
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[async_trait]
impl Estimator for WallingaTeunisEstimator {
    fn name(&self) -> &str {
        "native"
    }

    async fn estimate(
        &self,
        series: &IncidenceSeries,
        window: EstimationWindow,
        nsim: usize,
    ) -> EstimateResult<RawEstimate> {
        let incid = series.counts().to_vec();
        let generation_time = Arc::clone(&self.generation_time);
        let seed = self.seed;

        // Resampling is CPU bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            wallinga_teunis(&incid, &generation_time, window, nsim, seed)
        })
        .await
        .map_err(|e| EstimateError::failed(format!("estimation task failed: {}", e)))?
    }
}

/// Infectors of the cases reported on one day
struct Attribution {
    day: usize,
    /// `(infector day, probability)`, probabilities sum to 1
    infectors: Vec<(usize, f64)>,
}

/// Estimate R over `window` for the incidence series `incid`
pub fn wallinga_teunis(
    incid: &[f64],
    generation_time: &GenerationTime,
    window: EstimationWindow,
    nsim: usize,
    seed: u64,
) -> EstimateResult<RawEstimate> {
    let days = incid.len();
    if window.is_empty() || window.end >= days {
        return Err(EstimateError::failed(format!(
            "window {}..={} does not fit a series of {} days",
            window.begin, window.end, days
        )));
    }
    if let Some(day) = incid.iter().position(|&x| x > MAX_DAILY_CASES) {
        return Err(EstimateError::failed(format!(
            "incidence {} on day {} exceeds the largest resamplable count {}",
            incid[day], day, MAX_DAILY_CASES
        )));
    }
    if incid[..=window.end].iter().all(|&x| x <= 0.0) {
        return Err(EstimateError::failed(
            "no cases observed up to the end of the estimation window",
        ));
    }

    let attributions = attribute_cases(incid, generation_time);

    let mut secondary = vec![0.0; days];
    for attribution in &attributions {
        let cases = incid[attribution.day];
        for &(infector, p) in &attribution.infectors {
            secondary[infector] += p * cases;
        }
    }

    let reproduction = |day: usize, secondary: f64| -> f64 {
        if incid[day] <= 0.0 {
            return 0.0;
        }
        secondary / incid[day] / generation_time.cumulative(days - 1 - day)
    };

    let point: Vec<f64> = (window.begin..=window.end)
        .map(|day| reproduction(day, secondary[day]))
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut simulated: Vec<Vec<f64>> = vec![Vec::with_capacity(nsim); window.len()];
    let mut sim_secondary = vec![0.0; days];
    for _ in 0..nsim {
        sim_secondary.iter_mut().for_each(|x| *x = 0.0);
        for attribution in &attributions {
            let cases = incid[attribution.day].round() as u64;
            sample_multinomial(&mut rng, cases, &attribution.infectors, &mut sim_secondary)?;
        }
        for (slot, day) in simulated.iter_mut().zip(window.begin..=window.end) {
            slot.push(reproduction(day, sim_secondary[day]));
        }
    }

    let (q_low, q_high) = BOUND_QUANTILES;
    let mut lower = Vec::with_capacity(window.len());
    let mut upper = Vec::with_capacity(window.len());
    for mut samples in simulated {
        samples.retain(|x| x.is_finite());
        samples.sort_by(f64::total_cmp);
        lower.push(quantile_sorted(&samples, q_low));
        upper.push(quantile_sorted(&samples, q_high));
    }

    debug!(
        days,
        begin = window.begin,
        end = window.end,
        nsim,
        attributed_days = attributions.len(),
        "Wallinga-Teunis estimate complete"
    );

    Ok(RawEstimate {
        point,
        lower,
        upper,
    })
}

/// Attribute the cases of every day to their possible infectors.
///
/// Days whose cases have no possible infector (nothing reported within the
/// generation-time support) are skipped, as imported cases would be.
fn attribute_cases(incid: &[f64], generation_time: &GenerationTime) -> Vec<Attribution> {
    let max_lag = generation_time.max_lag();
    (1..incid.len())
        .filter(|&day| incid[day] > 0.0)
        .filter_map(|day| {
            let first = day.saturating_sub(max_lag);
            let mut infectors: Vec<(usize, f64)> = (first..day)
                .map(|i| (i, generation_time.mass(day - i) * incid[i]))
                .filter(|&(_, w)| w > 0.0)
                .collect();
            let total: f64 = infectors.iter().map(|&(_, w)| w).sum();
            if total <= 0.0 {
                return None;
            }
            infectors.iter_mut().for_each(|(_, w)| *w /= total);
            Some(Attribution { day, infectors })
        })
        .collect()
}

/// Draw `n` cases over `cells` and add the counts to `out`.
///
/// Uses the conditional-binomial construction: each cell takes a binomial
/// share of whatever is left, with its probability renormalized over the
/// remaining mass.
fn sample_multinomial<R: Rng>(
    rng: &mut R,
    n: u64,
    cells: &[(usize, f64)],
    out: &mut [f64],
) -> EstimateResult<()> {
    let mut remaining = n;
    let mut mass = 1.0;
    for (idx, &(target, p)) in cells.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        let draw = if idx + 1 == cells.len() || p >= mass {
            remaining
        } else {
            let prob = (p / mass).clamp(0.0, 1.0);
            Binomial::new(remaining, prob)
                .map_err(|e| EstimateError::failed(format!("binomial draw failed: {}", e)))?
                .sample(rng)
        };
        out[target] += draw as f64;
        remaining -= draw;
        mass -= p;
    }
    Ok(())
}

/// Quantile of sorted samples with linear interpolation (R's type 7)
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * q;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rt_core::{IncidenceRequest, NSIM};

    fn gt() -> GenerationTime {
        GenerationTime::gamma(5.2, 2.8).unwrap()
    }

    fn window_for(len: usize) -> EstimationWindow {
        EstimationWindow {
            begin: 10,
            end: len - 2,
        }
    }

    fn exponential(len: usize, start: f64, growth: f64) -> Vec<f64> {
        (0..len)
            .map(|t| (start * (growth * t as f64).exp()).round())
            .collect()
    }

    #[test]
    fn test_quantile_type7() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile_sorted(&sorted, 0.5), 2.5);
        assert_relative_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_relative_eq!(quantile_sorted(&sorted, 1.0), 4.0);
        assert_relative_eq!(quantile_sorted(&sorted, 0.25), 1.75);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn test_multinomial_conserves_cases() {
        let mut rng = StdRng::seed_from_u64(3);
        let cells = [(0, 0.2), (2, 0.5), (3, 0.3)];
        let mut out = vec![0.0; 4];
        sample_multinomial(&mut rng, 1000, &cells, &mut out).unwrap();
        assert_eq!(out.iter().sum::<f64>(), 1000.0);
        assert_eq!(out[1], 0.0);
        assert!(out[2] > out[0]);
    }

    #[test]
    fn test_attribution_probabilities_sum_to_one() {
        let incid = exponential(30, 5.0, 0.1);
        for attribution in attribute_cases(&incid, &gt()) {
            let total: f64 = attribution.infectors.iter().map(|&(_, p)| p).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            assert!(attribution.infectors.iter().all(|&(i, _)| i < attribution.day));
        }
    }

    #[test]
    fn test_output_shape() {
        let incid = exponential(40, 5.0, 0.1);
        let window = window_for(incid.len());
        let raw = wallinga_teunis(&incid, &gt(), window, 200, 1).unwrap();
        assert_eq!(raw.point.len(), window.len());
        assert_eq!(raw.lower.len(), window.len());
        assert_eq!(raw.upper.len(), window.len());
    }

    #[test]
    fn test_exponential_growth_matches_euler_lotka() {
        // For constant growth rate r, R = 1 / sum_k w(k) exp(-r k)
        let growth = 0.1;
        let gt = gt();
        let expected = 1.0
            / gt
                .pmf()
                .iter()
                .enumerate()
                .map(|(k, w)| w * (-growth * k as f64).exp())
                .sum::<f64>();

        let incid = exponential(60, 20.0, growth);
        let window = window_for(incid.len());
        let raw = wallinga_teunis(&incid, &gt, window, 100, 1).unwrap();

        // Mid-series days are far from both edges
        let mid = 30 - window.begin;
        assert_relative_eq!(raw.point[mid], expected, max_relative = 0.05);
    }

    #[test]
    fn test_bounds_bracket_point() {
        let incid = exponential(50, 30.0, 0.05);
        let window = window_for(incid.len());
        let raw = wallinga_teunis(&incid, &gt(), window, NSIM, 1).unwrap();
        for k in 0..window.len() - 5 {
            assert!(raw.lower[k] <= raw.upper[k]);
            assert!(
                raw.lower[k] <= raw.point[k] * 1.05 && raw.point[k] <= raw.upper[k] * 1.05,
                "day {}: {} not in [{}, {}]",
                k,
                raw.point[k],
                raw.lower[k],
                raw.upper[k]
            );
        }
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let incid = exponential(30, 5.0, 0.08);
        let window = window_for(incid.len());
        let a = wallinga_teunis(&incid, &gt(), window, 300, 42).unwrap();
        let b = wallinga_teunis(&incid, &gt(), window, 300, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_incidence_day_is_zero() {
        let mut incid = exponential(30, 10.0, 0.05);
        incid[15] = 0.0;
        let window = window_for(incid.len());
        let raw = wallinga_teunis(&incid, &gt(), window, 50, 1).unwrap();
        assert_eq!(raw.point[15 - window.begin], 0.0);
    }

    #[test]
    fn test_all_zero_fails() {
        let incid = vec![0.0; 20];
        let err = wallinga_teunis(&incid, &gt(), window_for(20), 10, 1).unwrap_err();
        assert!(matches!(err, EstimateError::EstimationFailed(_)));
    }

    #[test]
    fn test_oversized_counts_fail() {
        let mut incid = exponential(20, 10.0, 0.05);
        incid[14] = 1e25;
        let err = wallinga_teunis(&incid, &gt(), window_for(20), 10, 1).unwrap_err();
        assert!(err.to_string().contains("day 14"), "{}", err);

        incid[14] = 1e12;
        assert!(wallinga_teunis(&incid, &gt(), window_for(20), 10, 1).is_ok());
    }

    #[test]
    fn test_window_out_of_range_fails() {
        let incid = vec![1.0; 12];
        let window = EstimationWindow { begin: 10, end: 12 };
        assert!(wallinga_teunis(&incid, &gt(), window, 10, 1).is_err());
    }

    #[tokio::test]
    async fn test_estimator_trait() {
        let request = IncidenceRequest::from_counts(
            [1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233],
            (0..12).map(|i| format!("d{}", i)),
        );
        let series = IncidenceSeries::try_from(request).unwrap();
        let estimator = WallingaTeunisEstimator::new(gt());
        let raw = estimator
            .estimate(&series, series.window(), NSIM)
            .await
            .unwrap();
        assert_eq!(raw.point.len(), 1);
        assert!(raw.point[0].is_finite());
        assert!(raw.point[0] > 1.0);
    }
}
