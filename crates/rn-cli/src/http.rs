//! HTTP transport for the network operations.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rn_core::{ErrorKind, Slot};
use rn_store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub type AppState = Arc<Mutex<Store>>;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route("/network/assign-user", post(assign_user))
        .route(
            "/network/create-commercial-network",
            post(create_commercial_network),
        )
        .route("/network/calculate-position", post(calculate_position))
        .route("/network/users/{user_id}/network-tree", get(network_tree))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Errors ---

#[derive(Debug, Serialize)]
struct ErrorBody {
    reason: &'static str,
    detail: String,
}

pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::InvariantViolation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind == ErrorKind::Transient {
            tracing::error!("request failed: {}", self.0);
        }
        let body = ErrorBody {
            reason: kind.as_str(),
            detail: self.0.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// --- Misc ---

async fn welcome() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the referral network service" }))
}

async fn health() -> &'static str {
    "OK"
}

// --- Network endpoints ---

#[derive(Debug, Deserialize)]
struct AssignUserRequest {
    user_id: String,
    parranage_code: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

async fn assign_user(
    State(state): State<AppState>,
    Json(req): Json<AssignUserRequest>,
) -> ApiResult<MessageResponse> {
    let store = state.lock().await;
    store.assign_user(&req.user_id, &req.parranage_code)?;
    Ok(Json(MessageResponse {
        message: format!("User {} was successfully added to the network.", req.user_id),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateCommercialNetworkRequest {
    commercial_id: String,
}

#[derive(Debug, Serialize)]
struct NetworkCreatedResponse {
    message: String,
    network_id: String,
}

async fn create_commercial_network(
    State(state): State<AppState>,
    Json(req): Json<CreateCommercialNetworkRequest>,
) -> ApiResult<NetworkCreatedResponse> {
    let store = state.lock().await;
    let network = store.create_commercial_network(&req.commercial_id)?;
    Ok(Json(NetworkCreatedResponse {
        message: format!(
            "Network for commercial {} was successfully created.",
            req.commercial_id
        ),
        network_id: network.id,
    }))
}

#[derive(Debug, Deserialize)]
struct CalculatePositionRequest {
    network_id: String,
    plan_type: String,
}

async fn calculate_position(
    State(state): State<AppState>,
    Json(req): Json<CalculatePositionRequest>,
) -> ApiResult<Slot> {
    let store = state.lock().await;
    let slot = store.calculate_position(&req.network_id, &req.plan_type)?;
    Ok(Json(slot))
}

/// The tree below the user, or `{}` when the user holds no membership.
async fn network_tree(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let store = state.lock().await;
    let Some(tree) = store.network_tree(&user_id)? else {
        return Ok(Json(serde_json::json!({})).into_response());
    };
    let response = match tree.to_json() {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!("failed to render tree for {user_id}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    };
    Ok(response)
}
