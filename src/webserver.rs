use crate::resolver::resolve_containers;
use crate::state::{ContainerEntry, ScanReport, SharedReport};
use crate::values::Mapping;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_CONTAINER_NAME: &str = "chart";

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    /// Container name used when the values declare a single top-level image.
    pub name: Option<String>,
}

pub async fn readiness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn liveness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn latest_report(State(report): State<SharedReport>) -> Json<ScanReport> {
    Json(report.read().await.clone())
}

/// Resolves the images of a values YAML document posted as the request body.
pub async fn resolve_values(
    Query(params): Query<ResolveParams>,
    body: String,
) -> Result<Json<Vec<ContainerEntry>>, (StatusCode, String)> {
    let values = Mapping::from_yaml_str(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{:#}", e)))?;
    let name = params.name.as_deref().unwrap_or(DEFAULT_CONTAINER_NAME);

    debug!("Resolving images of posted values with {} top-level keys", values.len());

    resolve_containers(&values, name)
        .map(Json)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

pub fn create_app(report: SharedReport) -> Router {
    Router::new()
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/images", get(latest_report))
        .route("/resolve", post(resolve_values))
        .with_state(report)
}
