mod error;

pub use error::{ApiError, ApiErrorBody};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    models::{Finding, JobStatus, ScanJob, ScanType},
    report::{render_html, report_filename},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    targets: String,
    scan_type: ScanType,
}

#[derive(Debug, Deserialize)]
pub struct ListScansQuery {
    status: Option<JobStatus>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/scans", get(list_scans).post(create_scan))
        .route("/scans/", get(list_scans).post(create_scan))
        .route("/scans/{id}", get(get_scan))
        .route("/scans/{id}/findings", get(get_findings))
        .route("/scans/{id}/report", get(download_report))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn home() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Vulnerability Scanner API is ready."}))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn create_scan(
    State(state): State<AppState>,
    payload: Result<Json<CreateScanRequest>, JsonRejection>,
) -> Result<Json<ScanJob>, ApiError> {
    let Json(payload) = payload?;
    let job = state
        .store
        .create_job(&payload.targets, payload.scan_type)
        .await?;
    info!(job_id = job.scan_id, targets = %job.targets, scan_type = %job.scan_type, "scan job created");

    // A permit is stored if no worker is waiting, so the next idle check
    // picks the job up immediately.
    state.wake.notify_one();
    Ok(Json(job))
}

pub async fn list_scans(
    State(state): State<AppState>,
    query: Result<Query<ListScansQuery>, QueryRejection>,
) -> Result<Json<Vec<ScanJob>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.store.list_jobs(query.status).await?))
}

pub async fn get_scan(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ScanJob>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.store.get_job(id).await?))
}

pub async fn get_findings(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Finding>>, ApiError> {
    let Path(id) = id?;
    state.store.get_job(id).await?;
    Ok(Json(state.store.list_findings(id).await?))
}

pub async fn download_report(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let job = state.store.get_job(id).await?;
    let findings = state.store.list_findings(id).await?;
    let body = render_html(&job, &findings);

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report_filename(id)),
            ),
        ],
        body,
    ))
}
