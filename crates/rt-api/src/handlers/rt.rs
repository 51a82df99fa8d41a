//! Rt estimation handler

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use rt_core::{EstimationResult, IncidenceRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /rt
/// Estimate the time-varying reproduction number for an incidence series
///
/// Body: `{ "data": [number, ...], "dates": [scalar, ...] }`
///
/// Returns `{ "v": [...], "vmin": [...], "vmax": [...] }`, each aligned with
/// `dates`; days outside the estimation window are `null`.
pub async fn estimate_rt(
    State(state): State<AppState>,
    payload: Result<Json<IncidenceRequest>, JsonRejection>,
) -> Result<Json<EstimationResult>, ApiError> {
    let Json(request) = payload?;
    tracing::debug!(days = request.data.len(), "Received Rt request");

    let result = state.gateway().estimate(request).await?;
    Ok(Json(result))
}
