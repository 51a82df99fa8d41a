//! rt-core - Core traits and types for the Rt estimation gateway
//!
//! This crate provides the request/response model, the padding rules that
//! align an estimate with the caller's date axis, and the `Estimator` trait
//! that lets different statistical backends (native, R, mock) serve the API.

pub mod error;
pub mod estimator;
pub mod models;

pub use error::{EstimateError, EstimateResult};
pub use estimator::{Estimator, NSIM};
pub use models::*;
