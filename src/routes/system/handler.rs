use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use crate::{AppState, error::AppError};

use super::model::{ComponentStatus, HealthResponse, ServiceInfo, SystemStatsResponse};

const SERVICE_NAME: &str = "GlobeGenius API";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn service_info() -> Json<ServiceInfo> {
    let endpoints = [
        ("health", "/health"),
        ("admin", "/api/admin/*"),
    ]
    .into_iter()
    .map(|(name, path)| (name.to_string(), path.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(ServiceInfo {
        name: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        description: "Flight price alert service".to_string(),
        endpoints,
    })
}

/// Healthy only when Redis answers and, if configured, Postgres does too.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let redis = ComponentStatus::from(state.cache.ping().await);
    let database = match &state.database {
        Some(db) => ComponentStatus::from(db.ping().await),
        None => ComponentStatus::NotConfigured,
    };

    let healthy = redis == ComponentStatus::Up && database != ComponentStatus::Down;
    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now(),
            environment: state.config.environment.as_str().to_string(),
            version: VERSION.to_string(),
            redis,
            database,
        }),
    )
}

pub async fn system_stats(
    State(state): State<AppState>,
) -> Result<Json<SystemStatsResponse>, AppError> {
    let redis = state.cache.get_info().await?;
    Ok(Json(SystemStatsResponse {
        backend: state.cache.backend_name().to_string(),
        redis,
    }))
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
