//! Daemon HTTP server.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::types::{
    CommitSettingsRequest, CreateInstanceRequest, DependenciesQuery, UpdateInstanceRequest,
};
use crate::commands::{ControlPlane, StatusReport};
use crate::error::{AppError, ErrorKind, Result};
use crate::instance::InstanceView;
use crate::jobs::JobRecord;
use crate::registry::{GuardClass, Snapshot};

type SharedPlane = State<Arc<ControlPlane>>;

/// HTTP status for an error kind.
pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::InvalidName => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::DuplicateName
        | ErrorKind::DuplicatePort
        | ErrorKind::OperationInProgress
        | ErrorKind::AlreadyBuilt => StatusCode::CONFLICT,
        ErrorKind::NotBuilt => StatusCode::PRECONDITION_FAILED,
        ErrorKind::InstanceNotFound | ErrorKind::JobNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(self.0.kind());
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(self.0)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn accepted(record: JobRecord) -> (StatusCode, Json<JobRecord>) {
    (StatusCode::ACCEPTED, Json(record))
}

async fn status_handler(State(plane): SharedPlane) -> ApiResult<Json<StatusReport>> {
    Ok(Json(plane.status().await?))
}

async fn list_instances_handler(State(plane): SharedPlane) -> Json<Vec<InstanceView>> {
    Json(plane.list_instances())
}

async fn create_instance_handler(
    State(plane): SharedPlane,
    Json(req): Json<CreateInstanceRequest>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    Ok(accepted(plane.create_instance(&req.name, req.human_name)?))
}

async fn get_instance_handler(
    State(plane): SharedPlane,
    Path(name): Path<String>,
) -> ApiResult<Json<InstanceView>> {
    Ok(Json(plane.get_instance(&name)?))
}

async fn update_instance_handler(
    State(plane): SharedPlane,
    Path(name): Path<String>,
    Json(req): Json<UpdateInstanceRequest>,
) -> ApiResult<Json<InstanceView>> {
    Ok(Json(plane.update_instance(&name, req.human_name)?))
}

async fn start_instance_handler(
    State(plane): SharedPlane,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    Ok(accepted(plane.start_instance(&name)?))
}

async fn stop_instance_handler(
    State(plane): SharedPlane,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    Ok(accepted(plane.stop_instance(&name)?))
}

async fn rebuild_instance_handler(
    State(plane): SharedPlane,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    Ok(accepted(plane.rebuild_instance(&name)?))
}

async fn cleanup_instance_handler(
    State(plane): SharedPlane,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    Ok(accepted(plane.cleanup_instance(&name)?))
}

async fn job_handler(
    State(plane): SharedPlane,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobRecord>> {
    Ok(Json(plane.job(id)?))
}

async fn get_settings_handler(State(plane): SharedPlane) -> Json<Snapshot> {
    Json(plane.current_settings())
}

async fn commit_settings_handler(
    State(plane): SharedPlane,
    Json(req): Json<CommitSettingsRequest>,
) -> ApiResult<Json<Snapshot>> {
    Ok(Json(plane.commit_settings(req.settings, req.refresh).await?))
}

async fn settings_history_handler(State(plane): SharedPlane) -> Json<Vec<Snapshot>> {
    Json(plane.settings_history())
}

async fn dependencies_handler(
    State(plane): SharedPlane,
    Query(query): Query<DependenciesQuery>,
) -> ApiResult<Json<Snapshot>> {
    Ok(Json(plane.refresh_dependencies(query.refresh).await?))
}

async fn install_dependencies_handler(
    State(plane): SharedPlane,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    Ok(accepted(plane.install_dependencies()?))
}

async fn clear_guard_handler(
    State(plane): SharedPlane,
    Path(class): Path<String>,
) -> ApiResult<Json<Snapshot>> {
    let class: GuardClass = class.parse()?;
    Ok(Json(plane.clear_guard(class)?))
}

async fn proxy_config_handler(State(plane): SharedPlane) -> String {
    plane.render_proxy_config()
}

pub fn router(plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route(
            "/instances",
            get(list_instances_handler).post(create_instance_handler),
        )
        .route(
            "/instances/{name}",
            get(get_instance_handler).patch(update_instance_handler),
        )
        .route("/instances/{name}/start", post(start_instance_handler))
        .route("/instances/{name}/stop", post(stop_instance_handler))
        .route("/instances/{name}/rebuild", post(rebuild_instance_handler))
        .route("/instances/{name}/cleanup", post(cleanup_instance_handler))
        .route("/jobs/{id}", get(job_handler))
        .route(
            "/settings",
            get(get_settings_handler).put(commit_settings_handler),
        )
        .route("/settings/history", get(settings_history_handler))
        .route("/dependencies", get(dependencies_handler))
        .route("/dependencies/install", post(install_dependencies_handler))
        .route("/guards/{class}/clear", post(clear_guard_handler))
        .route("/proxy/config", get(proxy_config_handler))
        .with_state(plane)
}

/// Serve the API on `bind` until ctrl-c.
pub async fn serve(plane: Arc<ControlPlane>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| AppError::io(format!("Failed to bind {}: {}", bind, e)))?;
    log::info!("senex daemon listening on http://{}", bind);

    axum::serve(listener, router(plane))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            log::info!("Shutting down daemon");
        })
        .await
        .map_err(|e| AppError::io(format!("Server error: {}", e)))
}
