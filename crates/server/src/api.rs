//! API routes and handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use berth_core::env::{AppDefinition, EnvironmentDescription, EnvironmentId, ProjectId};
use berth_core::Error;
use berth_orchestrator::{DestroyReport, EnvironmentOrchestrator};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub environments: EnvironmentOrchestrator,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    service: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Environment creation request; exactly one of `pr` / `deployment` selects
/// the identity.
#[derive(Debug, Deserialize)]
struct CreateEnvironmentRequest {
    pr: Option<u32>,
    deployment: Option<String>,
    #[serde(flatten)]
    app: AppRequest,
}

/// App definition fields shared by create and update
#[derive(Debug, Deserialize)]
struct AppRequest {
    image: String,
    container_port: u16,
    #[serde(default)]
    env: HashMap<String, String>,
    cpu: Option<f64>,
    memory: Option<f64>,
    desired_count: Option<u32>,
    sha: Option<String>,
    /// Hours until the environment expires; omitted means immortal
    ttl_hours: Option<i64>,
    #[serde(default)]
    load_balancer: bool,
}

impl AppRequest {
    fn into_app_definition(self) -> AppDefinition {
        let mut app = AppDefinition::new(self.image, self.container_port);
        app.env = self.env;
        app.cpu = self.cpu;
        app.memory = self.memory;
        app.desired_count = self.desired_count.unwrap_or(1);
        app.sha = self.sha;
        app.load_balancer = self.load_balancer;
        app.expires_at = self.ttl_hours.map(|hours| Utc::now() + Duration::hours(hours));
        app
    }
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn reject(err: Error) -> Rejection {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Provider { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("request failed: {err}");
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn parse_pid(pid: &str) -> Result<ProjectId, Rejection> {
    ProjectId::new(pid).map_err(reject)
}

/// Path segment form of an environment id: `pr-5` or a deployment name
fn parse_environment_id(segment: &str) -> Result<EnvironmentId, Rejection> {
    segment.parse().map_err(reject)
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/api/v1/projects", get(list_projects))
        .route(
            "/api/v1/projects/:pid",
            get(describe_project).delete(destroy_project),
        )
        .route(
            "/api/v1/projects/:pid/environments",
            get(list_environments).post(create_environment),
        )
        .route(
            "/api/v1/projects/:pid/environments/:id",
            get(describe_environment)
                .put(update_environment)
                .delete(destroy_environment),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        service: "berth-server".to_string(),
    })
}

async fn version() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        service: "berth".to_string(),
    })
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectId>>, Rejection> {
    let projects = state.environments.projects().list().await.map_err(reject)?;
    Ok(Json(projects))
}

async fn describe_project(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<String>,
) -> Result<Json<berth_core::env::ProjectDescription>, Rejection> {
    let pid = parse_pid(&pid)?;
    let description = state
        .environments
        .projects()
        .describe(&pid)
        .await
        .map_err(reject)?;
    Ok(Json(description))
}

async fn destroy_project(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<String>,
) -> Result<StatusCode, Rejection> {
    let pid = parse_pid(&pid)?;
    state
        .environments
        .projects()
        .destroy(&pid)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_environments(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<String>,
) -> Result<Json<Vec<EnvironmentId>>, Rejection> {
    let pid = parse_pid(&pid)?;
    let environments = state.environments.list(&pid).await.map_err(reject)?;
    Ok(Json(environments))
}

async fn create_environment(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<String>,
    Json(request): Json<CreateEnvironmentRequest>,
) -> Result<Json<EnvironmentDescription>, Rejection> {
    let pid = parse_pid(&pid)?;
    let id = match (request.pr, request.deployment.as_deref()) {
        (Some(pr), None) => EnvironmentId::Pr(pr),
        (None, Some(name)) => EnvironmentId::deployment(name).map_err(reject)?,
        _ => {
            return Err(reject(Error::Validation(
                "exactly one of `pr` or `deployment` is required".to_string(),
            )))
        }
    };
    let app = request.app.into_app_definition();
    let description = state
        .environments
        .create(&pid, &id, &app)
        .await
        .map_err(reject)?;
    Ok(Json(description))
}

async fn describe_environment(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(String, String)>,
) -> Result<Json<EnvironmentDescription>, Rejection> {
    let pid = parse_pid(&pid)?;
    let id = parse_environment_id(&id)?;
    let description = state
        .environments
        .describe(&pid, &id)
        .await
        .map_err(reject)?;
    Ok(Json(description))
}

async fn update_environment(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(String, String)>,
    Json(request): Json<AppRequest>,
) -> Result<Json<EnvironmentDescription>, Rejection> {
    let pid = parse_pid(&pid)?;
    let id = parse_environment_id(&id)?;
    let app = request.into_app_definition();
    let description = state
        .environments
        .update(&pid, &id, &app)
        .await
        .map_err(reject)?;
    Ok(Json(description))
}

async fn destroy_environment(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(String, String)>,
) -> Result<Json<DestroyReport>, Rejection> {
    let pid = parse_pid(&pid)?;
    let id = parse_environment_id(&id)?;
    let report = state
        .environments
        .destroy(&pid, &id)
        .await
        .map_err(reject)?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let (status, _) = reject(Error::Validation("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = reject(Error::NotFound("missing".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = reject(Error::Conflict("drift".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = reject(Error::Timeout {
            label: "x".to_string(),
            message: "y".to_string(),
        });
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_parse_environment_id() {
        assert_eq!(parse_environment_id("pr-5").unwrap(), EnvironmentId::Pr(5));
        assert_eq!(
            parse_environment_id("beta").unwrap(),
            EnvironmentId::Deployment("beta".to_string())
        );
        // a malformed pr segment falls back to a deployment name
        assert_eq!(
            parse_environment_id("pr-x").unwrap(),
            EnvironmentId::Deployment("pr-x".to_string())
        );
    }
}
