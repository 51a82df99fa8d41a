//! rt-api - Rt estimation REST API layer
//!
//! This crate provides the HTTP API that serves `POST /rt` on top of any
//! [`rt_core::Estimator`]. Results are memoized per request content.
//!
//! # Usage
//!
//! ```ignore
//! use rt_api::{create_router, AppState, EstimationGateway};
//! use rt_estimate::{create_estimator, EstimatorConfig, GenerationTimeConfig};
//!
//! let estimator = create_estimator(&EstimatorConfig::default(), &GenerationTimeConfig::default())?;
//! let state = AppState::new(EstimationGateway::new(estimator, 1));
//! let router = create_router(state);
//! ```

pub mod cache;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod state;

pub use cache::EstimateCache;
pub use error::ApiError;
pub use gateway::EstimationGateway;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the REST API router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Time-varying reproduction number
        .route("/rt", post(handlers::rt::estimate_rt))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
