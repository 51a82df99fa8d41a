//! rt-estimate - Estimator adapters for the Rt gateway
//!
//! Provides the concrete [`Estimator`] implementations the gateway can be
//! started with:
//!
//! - [`WallingaTeunisEstimator`]: in-process time-dependent estimator
//! - [`RScriptEstimator`]: runs `est.R0.TD` from the R `R0` package
//! - [`ScriptedEstimator`]: deterministic stand-in for tests and demos
//!
//! All of them share a generation-time prior configured once at startup.

pub mod config;
pub mod generation_time;
pub mod mock;
pub mod native;
pub mod rscript;

use std::sync::Arc;

use rt_core::{EstimateResult, Estimator};

pub use config::{EstimatorConfig, MockConfig, NativeConfig};
pub use generation_time::{Family, GenerationTime, GenerationTimeConfig};
pub use mock::ScriptedEstimator;
pub use native::WallingaTeunisEstimator;
pub use rscript::{RScriptConfig, RScriptEstimator};

/// Build the estimator selected by `config` with the given prior
pub fn create_estimator(
    config: &EstimatorConfig,
    generation_time: &GenerationTimeConfig,
) -> EstimateResult<Arc<dyn Estimator>> {
    let estimator: Arc<dyn Estimator> = match config {
        EstimatorConfig::Native(native) => {
            let gt = GenerationTime::from_config(generation_time)?;
            tracing::info!(
                family = ?gt.family(),
                mean = gt.mean(),
                sd = gt.sd(),
                max_lag = gt.max_lag(),
                seed = native.seed,
                "Using native Wallinga-Teunis estimator"
            );
            Arc::new(WallingaTeunisEstimator::new(gt).with_seed(native.seed))
        }
        EstimatorConfig::Rscript(rscript) => {
            // Validate the prior locally so bad parameters fail at startup
            // rather than on the first request.
            GenerationTime::from_config(generation_time)?;
            tracing::info!(rscript = %rscript.rscript, "Using R0 estimator via Rscript");
            Arc::new(RScriptEstimator::new(rscript.clone(), generation_time.clone()))
        }
        EstimatorConfig::Mock(mock) => {
            tracing::warn!("Using scripted mock estimator, results are synthetic");
            Arc::new(ScriptedEstimator::new().with_delay_ms(mock.delay_ms))
        }
    };
    Ok(estimator)
}
