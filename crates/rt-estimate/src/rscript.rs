//! R0 estimator adapter
//!
//! Runs `est.R0.TD` from the R `R0` package in a fresh `Rscript` process,
//! with the program piped on stdin. The incidence series is rendered as R
//! source:
//!
//! ```text
//! d <- c(1,2,3,...)
//! names(d) <- c("2020-03-01","2020-03-02",...)
//! TD <- est.R0.TD(d, mGT, begin=11, end=<n-1>, nsim=1000)
//! ```
//!
//! and the estimate is printed back one tagged line per series.

use std::fmt::Write as _;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use rt_core::{
    EstimateError, EstimateResult, EstimationWindow, Estimator, IncidenceSeries, RawEstimate,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::generation_time::GenerationTimeConfig;

/// Rscript adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RScriptConfig {
    /// Rscript executable
    #[serde(default = "default_rscript")]
    pub rscript: String,
    /// Upper bound on a single estimation, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_rscript() -> String {
    "Rscript".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for RScriptConfig {
    fn default() -> Self {
        Self {
            rscript: default_rscript(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Estimator backed by R's `R0::est.R0.TD`
#[derive(Debug, Clone)]
pub struct RScriptEstimator {
    config: RScriptConfig,
    generation_time: GenerationTimeConfig,
}

impl RScriptEstimator {
    pub fn new(config: RScriptConfig, generation_time: GenerationTimeConfig) -> Self {
        Self {
            config,
            generation_time,
        }
    }

    /// R program estimating `window` of `series`.
    ///
    /// R indexes from 1, so the zero-based window maps to
    /// `begin = window.begin + 1` and `end = window.end + 1`.
    pub fn render_script(
        &self,
        series: &IncidenceSeries,
        window: EstimationWindow,
        nsim: usize,
    ) -> String {
        let gt = &self.generation_time;
        let mut script = String::new();
        let _ = writeln!(script, "suppressPackageStartupMessages(library(R0))");
        match gt.truncate {
            Some(truncate) => {
                let _ = writeln!(
                    script,
                    "mGT <- generation.time(\"{}\", c({}, {}), truncate={})",
                    gt.family.r_name(),
                    gt.mean,
                    gt.sd,
                    truncate
                );
            }
            None => {
                let _ = writeln!(
                    script,
                    "mGT <- generation.time(\"{}\", c({}, {}))",
                    gt.family.r_name(),
                    gt.mean,
                    gt.sd
                );
            }
        }
        let _ = writeln!(script, "d <- {}", numeric_vector(series));
        let _ = writeln!(script, "names(d) <- {}", label_vector(series.labels()));
        let _ = writeln!(
            script,
            "TD <- est.R0.TD(d, mGT, begin={}, end={}, nsim={})",
            window.begin + 1,
            window.end + 1,
            nsim
        );
        let _ = writeln!(script, "cat(\"R\", sprintf(\"%.17g\", TD$R), \"\\n\")");
        let _ = writeln!(
            script,
            "cat(\"LOWER\", sprintf(\"%.17g\", TD$conf.int$lower), \"\\n\")"
        );
        let _ = writeln!(
            script,
            "cat(\"UPPER\", sprintf(\"%.17g\", TD$conf.int$upper), \"\\n\")"
        );
        script
    }
}

#[async_trait]
impl Estimator for RScriptEstimator {
    fn name(&self) -> &str {
        "rscript"
    }

    async fn estimate(
        &self,
        series: &IncidenceSeries,
        window: EstimationWindow,
        nsim: usize,
    ) -> EstimateResult<RawEstimate> {
        let script = self.render_script(series, window, nsim);
        debug!(
            days = series.len(),
            script_bytes = script.len(),
            "Running est.R0.TD via Rscript"
        );

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, self.run(&script))
            .await
            .map_err(|_| {
                EstimateError::failed(format!(
                    "Rscript did not finish within {}s",
                    self.config.timeout_secs
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "Rscript exited with an error");
            return Err(EstimateError::failed(format!(
                "Rscript exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

impl RScriptEstimator {
    /// `Rscript --vanilla -`: the program is read from stdin, so its size
    /// is not bounded by the command line.
    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.rscript);
        command
            .arg("--vanilla")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, script: &str) -> EstimateResult<Output> {
        let mut child = self.command().spawn().map_err(|e| {
            EstimateError::failed(format!("failed to start {}: {}", self.config.rscript, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // An early exit closes the pipe; its status and stderr explain why.
            match stdin.write_all(script.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(EstimateError::failed(format!(
                        "failed to send script to Rscript: {}",
                        e
                    )))
                }
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| EstimateError::failed(format!("Rscript did not complete: {}", e)))
    }
}

/// `c(1,2.5,3)` with each number in its received form
fn numeric_vector(series: &IncidenceSeries) -> String {
    let items: Vec<String> = series.numbers().iter().map(|n| n.to_string()).collect();
    format!("c({})", items.join(","))
}

/// `c("a","b")` with each label quoted and escaped
fn label_vector(labels: &[String]) -> String {
    let items: Vec<String> = labels.iter().map(|l| quote_r_string(l)).collect();
    format!("c({})", items.join(","))
}

fn quote_r_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Parse the `R`, `LOWER`, and `UPPER` lines printed by the script
fn parse_output(stdout: &str) -> EstimateResult<RawEstimate> {
    let mut point = None;
    let mut lower = None;
    let mut upper = None;

    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        let slot = match tokens.next() {
            Some("R") => &mut point,
            Some("LOWER") => &mut lower,
            Some("UPPER") => &mut upper,
            _ => continue,
        };
        let values = tokens
            .map(parse_r_number)
            .collect::<EstimateResult<Vec<_>>>()?;
        *slot = Some(values);
    }

    match (point, lower, upper) {
        (Some(point), Some(lower), Some(upper)) => Ok(RawEstimate {
            point,
            lower,
            upper,
        }),
        _ => Err(EstimateError::failed(format!(
            "unexpected Rscript output: {}",
            stdout.trim()
        ))),
    }
}

fn parse_r_number(token: &str) -> EstimateResult<f64> {
    match token {
        "NA" | "NaN" => Ok(f64::NAN),
        "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse()
            .map_err(|_| EstimateError::failed(format!("invalid number in Rscript output: {}", other))),
    }
}
