//! Discretized generation-time distributions
//!
//! A generation time is the delay between infection of a primary case and
//! infection of a secondary case. Estimators work on whole days, so the
//! continuous distribution is binned into one-day lags:
//!
//! ```text
//! lag 0: [0, 0.5]      (forced to zero mass)
//! lag k: [k - 0.5, k + 0.5]
//! ```
//!
//! The distribution is truncated at its 99.99% quantile unless an explicit
//! maximum lag is configured, and the binned masses are normalized to sum 1.

use rt_core::{EstimateError, EstimateResult};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Gamma, LogNormal, Weibull};
use statrs::function::gamma::gamma;

/// Quantile at which the distribution is truncated
const TRUNCATION_QUANTILE: f64 = 0.9999;

/// Distribution family of the generation time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Gamma,
    Lognormal,
    Weibull,
}

impl Family {
    /// Name understood by R0's `generation.time`
    pub fn r_name(&self) -> &'static str {
        match self {
            Family::Gamma => "gamma",
            Family::Lognormal => "lognormal",
            Family::Weibull => "weibull",
        }
    }
}

/// Generation-time prior parameters, in days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTimeConfig {
    #[serde(default)]
    pub family: Family,
    #[serde(default = "default_mean")]
    pub mean: f64,
    #[serde(default = "default_sd")]
    pub sd: f64,
    /// Maximum lag in days. Derived from the distribution when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate: Option<usize>,
}

fn default_mean() -> f64 {
    5.2
}

fn default_sd() -> f64 {
    2.8
}

impl Default for GenerationTimeConfig {
    fn default() -> Self {
        Self {
            family: Family::Gamma,
            mean: default_mean(),
            sd: default_sd(),
            truncate: None,
        }
    }
}

/// Continuous distribution backing a generation time
enum Continuous {
    Gamma(Gamma),
    LogNormal(LogNormal),
    Weibull(Weibull),
}

impl Continuous {
    fn from_config(config: &GenerationTimeConfig) -> EstimateResult<Self> {
        let (mean, sd) = (config.mean, config.sd);
        if !(mean.is_finite() && sd.is_finite() && mean > 0.0 && sd > 0.0) {
            return Err(EstimateError::Config(format!(
                "generation time mean and sd must be positive (got {}, {})",
                mean, sd
            )));
        }

        let built = match config.family {
            Family::Gamma => {
                let shape = mean * mean / (sd * sd);
                let rate = mean / (sd * sd);
                Gamma::new(shape, rate).map(Continuous::Gamma)
            }
            Family::Lognormal => {
                let sigma2 = (1.0 + (sd * sd) / (mean * mean)).ln();
                let mu = mean.ln() - sigma2 / 2.0;
                LogNormal::new(mu, sigma2.sqrt()).map(Continuous::LogNormal)
            }
            Family::Weibull => {
                let shape = weibull_shape(sd / mean)?;
                let scale = mean / gamma(1.0 + 1.0 / shape);
                Weibull::new(shape, scale).map(Continuous::Weibull)
            }
        };

        built.map_err(|e| {
            EstimateError::Config(format!(
                "invalid {} generation time ({}, {}): {}",
                config.family.r_name(),
                mean,
                sd,
                e
            ))
        })
    }

    fn cdf(&self, x: f64) -> f64 {
        match self {
            Continuous::Gamma(d) => d.cdf(x),
            Continuous::LogNormal(d) => d.cdf(x),
            Continuous::Weibull(d) => d.cdf(x),
        }
    }

    fn quantile(&self, p: f64) -> f64 {
        match self {
            Continuous::Gamma(d) => d.inverse_cdf(p),
            Continuous::LogNormal(d) => d.inverse_cdf(p),
            Continuous::Weibull(d) => d.inverse_cdf(p),
        }
    }
}

/// Weibull shape for a given coefficient of variation.
///
/// The CV of a Weibull decreases monotonically in the shape, so bisection
/// on `sqrt(G(1 + 2/k) / G(1 + 1/k)^2 - 1)` converges.
fn weibull_shape(cv: f64) -> EstimateResult<f64> {
    let cv_of = |k: f64| {
        let g1 = gamma(1.0 + 1.0 / k);
        (gamma(1.0 + 2.0 / k) / (g1 * g1) - 1.0).sqrt()
    };
    let (mut low, mut high) = (0.05, 100.0);
    if cv > cv_of(low) || cv < cv_of(high) {
        return Err(EstimateError::Config(format!(
            "weibull generation time cannot have coefficient of variation {}",
            cv
        )));
    }
    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if cv_of(mid) > cv {
            low = mid;
        } else {
            high = mid;
        }
    }
    Ok(0.5 * (low + high))
}

/// A generation time binned into daily lags
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTime {
    config: GenerationTimeConfig,
    pmf: Vec<f64>,
    cumulative: Vec<f64>,
}

impl GenerationTime {
    /// Discretize the configured distribution
    pub fn from_config(config: &GenerationTimeConfig) -> EstimateResult<Self> {
        let dist = Continuous::from_config(config)?;
        let max_lag = config
            .truncate
            .unwrap_or_else(|| dist.quantile(TRUNCATION_QUANTILE).ceil() as usize)
            .max(1);

        let mut pmf: Vec<f64> = (0..=max_lag)
            .map(|k| {
                let low = if k == 0 { 0.0 } else { k as f64 - 0.5 };
                let high = k as f64 + 0.5;
                dist.cdf(high) - dist.cdf(low)
            })
            .collect();
        pmf[0] = 0.0;

        let total: f64 = pmf.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(EstimateError::Config(format!(
                "generation time has no mass within {} days",
                max_lag
            )));
        }
        pmf.iter_mut().for_each(|p| *p /= total);

        let cumulative = pmf
            .iter()
            .scan(0.0, |acc, p| {
                *acc += p;
                Some(*acc)
            })
            .collect();

        Ok(Self {
            config: config.clone(),
            pmf,
            cumulative,
        })
    }

    /// Gamma generation time with the given mean and standard deviation
    pub fn gamma(mean: f64, sd: f64) -> EstimateResult<Self> {
        Self::from_config(&GenerationTimeConfig {
            family: Family::Gamma,
            mean,
            sd,
            truncate: None,
        })
    }

    pub fn family(&self) -> Family {
        self.config.family
    }

    pub fn mean(&self) -> f64 {
        self.config.mean
    }

    pub fn sd(&self) -> f64 {
        self.config.sd
    }

    /// Daily masses, index = lag in days
    pub fn pmf(&self) -> &[f64] {
        &self.pmf
    }

    /// Longest lag with (possibly) non-zero mass
    pub fn max_lag(&self) -> usize {
        self.pmf.len() - 1
    }

    /// Mass at `lag`, zero beyond the truncation point
    pub fn mass(&self, lag: usize) -> f64 {
        self.pmf.get(lag).copied().unwrap_or(0.0)
    }

    /// Probability that the generation time is at most `lag` days
    pub fn cumulative(&self, lag: usize) -> f64 {
        self.cumulative
            .get(lag)
            .copied()
            .unwrap_or_else(|| self.cumulative[self.cumulative.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_gamma_5_2_2_8() {
        let config = GenerationTimeConfig::default();
        assert_eq!(config.family, Family::Gamma);
        assert_eq!(config.mean, 5.2);
        assert_eq!(config.sd, 2.8);
    }

    #[test]
    fn test_gamma_pmf_properties() {
        let gt = GenerationTime::gamma(5.2, 2.8).unwrap();
        let pmf = gt.pmf();

        assert_eq!(pmf[0], 0.0);
        assert_relative_eq!(pmf.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(pmf.iter().all(|p| *p >= 0.0));
        // 99.99% quantile of gamma(3.45, 0.663) is a little over 20 days
        assert!(gt.max_lag() > 15 && gt.max_lag() < 30, "{}", gt.max_lag());

        let mean: f64 = pmf.iter().enumerate().map(|(k, p)| k as f64 * p).sum();
        assert_relative_eq!(mean, 5.2, epsilon = 0.1);
    }

    #[test]
    fn test_cumulative() {
        let gt = GenerationTime::gamma(5.2, 2.8).unwrap();
        assert_eq!(gt.cumulative(0), 0.0);
        assert!(gt.cumulative(1) > 0.0);
        assert!(gt.cumulative(5) < gt.cumulative(6));
        assert_relative_eq!(gt.cumulative(1000), 1.0, epsilon = 1e-12);
        assert_eq!(gt.mass(1000), 0.0);
    }

    #[test]
    fn test_truncate() {
        let config = GenerationTimeConfig {
            truncate: Some(7),
            ..Default::default()
        };
        let gt = GenerationTime::from_config(&config).unwrap();
        assert_eq!(gt.max_lag(), 7);
        assert_relative_eq!(gt.pmf().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lognormal_and_weibull() {
        for family in [Family::Lognormal, Family::Weibull] {
            let config = GenerationTimeConfig {
                family,
                ..Default::default()
            };
            let gt = GenerationTime::from_config(&config).unwrap();
            let mean: f64 = gt
                .pmf()
                .iter()
                .enumerate()
                .map(|(k, p)| k as f64 * p)
                .sum();
            assert_relative_eq!(mean, 5.2, epsilon = 0.2);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(GenerationTime::gamma(0.0, 2.8).is_err());
        assert!(GenerationTime::gamma(5.2, -1.0).is_err());
        assert!(GenerationTime::gamma(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_truncation_quantile() {
        for family in [Family::Gamma, Family::Lognormal, Family::Weibull] {
            let config = GenerationTimeConfig {
                family,
                ..Default::default()
            };
            let dist = Continuous::from_config(&config).unwrap();
            let q = dist.quantile(TRUNCATION_QUANTILE);
            assert!(q > config.mean, "{:?}: {}", family, q);
            assert_relative_eq!(dist.cdf(q), TRUNCATION_QUANTILE, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_r_names() {
        assert_eq!(Family::Gamma.r_name(), "gamma");
        assert_eq!(Family::Lognormal.r_name(), "lognormal");
        assert_eq!(Family::Weibull.r_name(), "weibull");
    }
}
