use std::collections::HashMap;
use std::net::SocketAddr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use herenow_core::auth::AccessClaims;
use herenow_core::error::HereNowError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::HttpState;
use super::error::ApiError;
use crate::application::{LoginCredentials, LoginRequest, LoginResponse};
use crate::domain::{ConnectionInfo, Session};
use crate::interface::websocket::serve_socket;

type ApiResult<T> = Result<T, ApiError>;

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|err| ApiError(HereNowError::bad_request(err.to_string())))
}

fn authorize(state: &HttpState, headers: &HeaderMap) -> ApiResult<AccessClaims> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    Ok(state.auth.authorize(header)?)
}

// ── / ───────────────────────────────────────────────────────────────────────

pub async fn handle_root(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({ "name": state.service_name, "version": state.version }))
}

// ── /metrics ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub active_connections: i64,
    pub registered_connections: usize,
}

pub async fn handle_metrics(State(state): State<HttpState>) -> Json<MetricsResponse> {
    let registry = state.lifecycle.registry();
    Json(MetricsResponse {
        active_connections: registry.active_connections(),
        registered_connections: registry.count(),
    })
}

// ── /login /logout ──────────────────────────────────────────────────────────

pub async fn handle_login(
    State(state): State<HttpState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<Json<LoginResponse>> {
    let credentials: LoginCredentials = parse_body(&body)?;
    let request = LoginRequest {
        credentials,
        guest: params.contains_key("guest"),
        no_session: params.contains_key("nosession"),
        remote_addr: remote.to_string(),
    };
    Ok(Json(state.auth.login(request).await?))
}

#[derive(Deserialize)]
pub struct LogoutPayload {
    #[serde(default)]
    pub token: String,
}

pub async fn handle_logout(State(state): State<HttpState>, body: Bytes) -> ApiResult<StatusCode> {
    let payload: LogoutPayload = parse_body(&body)?;
    state.auth.logout(&payload.token).await?;
    Ok(StatusCode::OK)
}

// ── /connect ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn handle_connect(
    State(state): State<HttpState>,
    Query(query): Query<ConnectQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session_id = match state.lifecycle.authorize(query.token.as_deref()) {
        Ok(session_id) => session_id,
        Err(err) => return ApiError(err).into_response(),
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(session_id = %session_id, error = %rejection, "Error upgrading WebSocket");
            return rejection.into_response();
        }
    };

    let lifecycle = state.lifecycle.clone();
    upgrade
        .on_failed_upgrade(|err| warn!(error = %err, "Error upgrading WebSocket"))
        .on_upgrade(move |socket| serve_socket(socket, session_id, lifecycle))
}

// ── /sessions /session/{id} /connections ────────────────────────────────────

pub async fn handle_list_sessions(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Session>>> {
    let claims = authorize(&state, &headers)?;
    Ok(Json(state.sessions.list(&claims).await?))
}

pub async fn handle_delete_session(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    let claims = authorize(&state, &headers)?;
    state.sessions.delete(&claims, &session_id).await?;
    Ok(StatusCode::OK)
}

pub async fn handle_delete_all_sessions(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = authorize(&state, &headers)?;
    let deleted = state.sessions.delete_all(&claims).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn handle_connections(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ConnectionInfo>>> {
    let claims = authorize(&state, &headers)?;
    Ok(Json(state.sessions.connections(&claims)?))
}
