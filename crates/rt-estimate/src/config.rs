//! Estimator selection and settings

use serde::{Deserialize, Serialize};

use crate::rscript::RScriptConfig;

/// Which estimator backs the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EstimatorConfig {
    /// In-process Wallinga-Teunis estimator
    Native(NativeConfig),
    /// `est.R0.TD` from the R `R0` package, run through Rscript
    Rscript(RScriptConfig),
    /// Synthetic estimates for demos and tests
    Mock(MockConfig),
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::Native(NativeConfig::default())
    }
}

impl EstimatorConfig {
    /// Short name matching `Estimator::name()` of the built estimator
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Rscript(_) => "rscript",
            Self::Mock(_) => "mock",
        }
    }
}

/// Native estimator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeConfig {
    /// Seed for the resampling RNG. A fixed seed makes uncached
    /// recomputations reproducible.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    1
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

/// Mock estimator settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Artificial latency per estimation, in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}
