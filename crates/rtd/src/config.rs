//! Configuration file handling for rtd

use std::path::Path;

use anyhow::{Context, Result};
use rt_estimate::{
    EstimatorConfig, GenerationTimeConfig, MockConfig, NativeConfig, RScriptConfig,
};
use serde::{Deserialize, Serialize};

/// Daemon configuration
///
/// ```toml
/// [server]
/// bind = "0.0.0.0"
/// port = 5000
/// max_concurrent_estimations = 2
///
/// [generation_time]
/// family = "gamma"
/// mean = 5.2
/// sd = 2.8
///
/// [estimator]
/// type = "rscript"
/// rscript = "/usr/bin/Rscript"
/// timeout_secs = 600
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RtdConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Generation-time prior shared by every estimator
    #[serde(default)]
    pub generation_time: GenerationTimeConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Estimations allowed to run at once across all requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_estimations: usize,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_concurrent_estimations: default_max_concurrent(),
        }
    }
}

/// Estimator selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EstimatorKind {
    Native,
    Rscript,
    Mock,
}

impl RtdConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Switch to the estimator `kind`.
    ///
    /// Settings from the file are kept when they already describe that
    /// estimator, otherwise its defaults apply.
    pub fn select_estimator(&mut self, kind: EstimatorKind) {
        let keep = matches!(
            (&self.estimator, kind),
            (EstimatorConfig::Native(_), EstimatorKind::Native)
                | (EstimatorConfig::Rscript(_), EstimatorKind::Rscript)
                | (EstimatorConfig::Mock(_), EstimatorKind::Mock)
        );
        if keep {
            return;
        }
        self.estimator = match kind {
            EstimatorKind::Native => EstimatorConfig::Native(NativeConfig::default()),
            EstimatorKind::Rscript => EstimatorConfig::Rscript(RScriptConfig::default()),
            EstimatorKind::Mock => EstimatorConfig::Mock(MockConfig::default()),
        };
    }
}
