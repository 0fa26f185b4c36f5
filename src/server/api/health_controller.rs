use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use crate::logger::environment_name;
use crate::server::dtos::health_dto::{HealthResponse, HealthStatus};
use crate::server::services::RelayServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// the relay keeps no state and has no backing store, if it can answer it's healthy
pub async fn health_endpoint(
    Extension(services): Extension<RelayServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: environment_name(services.config.cargo_env).to_string(),
    };

    (StatusCode::OK, Json(response))
}
