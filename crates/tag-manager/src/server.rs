//! HTTP façade over [`TagService`].

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::client::Upstream;
use crate::error::TagError;
use crate::models::{AccessToken, TagColor, TagName, TaskId};
use crate::mutation::{MutationOutcome, TaskTagEdit};
use crate::service::{CatalogueReport, TagService, TaskReport, UsageReport};

/// Shared application state.
pub struct AppState<U> {
    /// Tag operations.
    pub service: Arc<TagService<U>>,
    /// Cancelled on shutdown; every request runs under a child of it.
    pub shutdown: CancellationToken,
}

impl<U> Clone for AppState<U> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Build the HTTP router for the tag manager.
pub fn build_router<U: Upstream + 'static>(state: AppState<U>) -> Router {
    Router::new()
        .route("/api/tags", get(list_tags::<U>))
        .route("/api/tags/{name}", delete(delete_tag::<U>))
        .route("/api/tags/{name}/rename", post(rename_tag::<U>))
        .route("/api/tags/{name}/color", put(recolor_tag::<U>))
        .route("/api/tag-usage", get(tag_usage::<U>))
        .route("/api/tasks", get(list_tasks::<U>))
        .route(
            "/api/tasks/{task_id}/tags",
            delete(remove_all_tags_from_task::<U>),
        )
        .route(
            "/api/tasks/{task_id}/tags/{name}",
            post(add_tag_to_task::<U>).delete(remove_tag_from_task::<U>),
        )
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Error response for a failed tag operation.
#[derive(Debug)]
pub struct ApiError(TagError);

impl From<TagError> for ApiError {
    fn from(err: TagError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TagError::InvalidArgument(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TagError::Unauthenticated => StatusCode::UNAUTHORIZED,
            TagError::NotFound(_) => StatusCode::NOT_FOUND,
            TagError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TagError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TagError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            TagError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Tag operation failed");
        } else {
            warn!(error = %self.0, "Tag operation rejected");
        }

        let body = Json(json!({
            "status": "error",
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Token from the inbound `Authorization` header, with any `Bearer` scheme removed.
///
/// The scheme is matched case-insensitively. A missing header yields an empty token,
/// which the service rejects.
fn access_token(headers: &HeaderMap) -> AccessToken {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim();
    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
        _ => raw,
    };
    AccessToken::new(token.trim())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    new_name: String,
}

async fn list_tags<U: Upstream>(
    State(state): State<AppState<U>>,
    headers: HeaderMap,
) -> Result<Json<CatalogueReport>, ApiError> {
    let cancel = state.shutdown.child_token();
    let report = state
        .service
        .list_tags(&access_token(&headers), &cancel)
        .await?;
    Ok(Json(report))
}

async fn tag_usage<U: Upstream>(
    State(state): State<AppState<U>>,
    headers: HeaderMap,
) -> Result<Json<UsageReport>, ApiError> {
    let cancel = state.shutdown.child_token();
    let report = state
        .service
        .tag_usage(&access_token(&headers), &cancel)
        .await?;
    Ok(Json(report))
}

async fn list_tasks<U: Upstream>(
    State(state): State<AppState<U>>,
    headers: HeaderMap,
) -> Result<Json<TaskReport>, ApiError> {
    let cancel = state.shutdown.child_token();
    let report = state
        .service
        .list_tasks(&access_token(&headers), &cancel)
        .await?;
    Ok(Json(report))
}

async fn rename_tag<U: Upstream>(
    State(state): State<AppState<U>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Json(request) = payload?;
    let cancel = state.shutdown.child_token();
    let outcome = state
        .service
        .rename_tag(
            &access_token(&headers),
            &TagName::from(name),
            &TagName::from(request.new_name),
            &cancel,
        )
        .await?;
    Ok(Json(outcome))
}

async fn recolor_tag<U: Upstream>(
    State(state): State<AppState<U>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<TagColor>, JsonRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Json(color) = payload?;
    let cancel = state.shutdown.child_token();
    let outcome = state
        .service
        .recolor_tag(&access_token(&headers), &TagName::from(name), &color, &cancel)
        .await?;
    Ok(Json(outcome))
}

async fn delete_tag<U: Upstream>(
    State(state): State<AppState<U>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MutationOutcome>, ApiError> {
    let cancel = state.shutdown.child_token();
    let outcome = state
        .service
        .delete_tag(&access_token(&headers), &TagName::from(name), &cancel)
        .await?;
    Ok(Json(outcome))
}

async fn add_tag_to_task<U: Upstream>(
    State(state): State<AppState<U>>,
    Path((task_id, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<TaskTagEdit>, ApiError> {
    let cancel = state.shutdown.child_token();
    let edit = state
        .service
        .add_tag_to_task(
            &access_token(&headers),
            &TaskId::new(task_id),
            &TagName::from(name),
            &cancel,
        )
        .await?;
    Ok(Json(edit))
}

async fn remove_tag_from_task<U: Upstream>(
    State(state): State<AppState<U>>,
    Path((task_id, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<TaskTagEdit>, ApiError> {
    let cancel = state.shutdown.child_token();
    let edit = state
        .service
        .remove_tag_from_task(
            &access_token(&headers),
            &TaskId::new(task_id),
            &TagName::from(name),
            &cancel,
        )
        .await?;
    Ok(Json(edit))
}

async fn remove_all_tags_from_task<U: Upstream>(
    State(state): State<AppState<U>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MutationOutcome>, ApiError> {
    let cancel = state.shutdown.child_token();
    let outcome = state
        .service
        .remove_all_tags_from_task(&access_token(&headers), &TaskId::new(task_id), &cancel)
        .await?;
    Ok(Json(outcome))
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
