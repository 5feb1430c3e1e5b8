//! HTTP handlers for the feed and settings endpoints

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Form, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{error, trace, warn};
use wmpr_core::error::WmprError;

use crate::{
    auth::authenticated_user, feed_service::FeedFailure, settings_admin::SettingsForm, AppState,
};

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Query parameters of `GET /recent`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    pub project_key: Option<String>,
}

/// Query parameters of `GET /settings`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsParams {
    pub project_key: Option<String>,
    pub saved: Option<String>,
}

/// HTTP status for an error kind
pub fn status_for(err: &WmprError) -> StatusCode {
    match err {
        WmprError::Unauthorized => StatusCode::UNAUTHORIZED,
        WmprError::InvalidQuery { .. } | WmprError::Validation(_) => StatusCode::BAD_REQUEST,
        WmprError::NotFound(_) => StatusCode::NOT_FOUND,
        WmprError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Recent issues feed
pub async fn feed_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<FeedParams>, QueryRejection>,
) -> Response {
    let user = authenticated_user(&headers, &state.config.auth.user_header);
    let max_age = state.config.query.cache_max_age_seconds;

    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let error = WmprError::validation(rejection.body_text());
            let failure = state.feed_service.reject(user.as_ref(), error);
            let (status, body) = failure_body(&failure);
            return feed_response(status, &body, max_age);
        }
    };

    match state
        .feed_service
        .get_feed(params.project_key.as_deref(), user.as_ref())
        .await
    {
        Ok(feed) => feed_response(StatusCode::OK, &feed, max_age),
        Err(failure) => {
            let (status, body) = failure_body(&failure);
            feed_response(status, &body, max_age)
        }
    }
}

fn failure_body(failure: &FeedFailure) -> (StatusCode, Value) {
    let status = status_for(&failure.error);
    let body = match &failure.error {
        WmprError::Unauthorized => json!({
            "error": "Authentication required",
            "requestId": failure.request_id,
        }),
        WmprError::Validation(message) => json!({
            "error": message,
            "requestId": failure.request_id,
        }),
        WmprError::InvalidQuery { query, .. } => json!({
            "error": "Invalid JQL query",
            "requestId": failure.request_id,
            "jql": query,
        }),
        other => json!({
            "error": format!("Failed to fetch WMPR requests: {}", other),
            "requestId": failure.request_id,
            "duration": failure.duration_ms,
            "errorType": other.category(),
        }),
    };
    (status, body)
}

/// Serialize `body` with an explicit length and the feed's cache and CORS headers
fn feed_response<T: Serialize>(status: StatusCode, body: &T, max_age: u64) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to serialize feed response: {}", e);
            let fallback = br#"{"error":"Failed to serialize response"}"#.to_vec();
            return feed_response_bytes(StatusCode::INTERNAL_SERVER_ERROR, fallback, max_age);
        }
    };
    feed_response_bytes(status, bytes, max_age)
}

fn feed_response_bytes(status: StatusCode, bytes: Vec<u8>, max_age: u64) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(cache_control) = HeaderValue::from_str(&format!("max-age={}", max_age)) {
        headers.insert(header::CACHE_CONTROL, cache_control);
    }
    insert_cors_headers(headers);
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));

    response
}

fn insert_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// CORS preflight handler for the feed endpoint
pub async fn cors_preflight_recent() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    insert_cors_headers(&mut headers);
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));

    (StatusCode::OK, headers)
}

/// Settings form for a project
pub async fn settings_view_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SettingsParams>,
) -> Response {
    let user = authenticated_user(&headers, &state.config.auth.user_header);
    let saved = params.saved.as_deref() == Some("true");

    let page = match state
        .settings_admin
        .load_form(params.project_key.as_deref(), user.as_ref(), saved)
        .await
    {
        // The host template is read from disk on every render
        Ok(model) => {
            let admin = state.settings_admin.clone();
            tokio::task::spawn_blocking(move || admin.render(&model))
                .await
                .unwrap_or_else(|e| {
                    Err(WmprError::internal(format!("settings render task failed: {}", e)))
                })
        }
        Err(e) => Err(e),
    };

    match page {
        Ok(page) => Html(page).into_response(),
        Err(e) => error_page(e),
    }
}

/// Settings form submission
pub async fn settings_save_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SettingsForm>,
) -> Response {
    let user = authenticated_user(&headers, &state.config.auth.user_header);

    match state.settings_admin.save_form(&form, user.as_ref()).await {
        Ok(location) => Redirect::to(&location).into_response(),
        Err(e) => error_page(e),
    }
}

fn error_page(err: WmprError) -> Response {
    let status = status_for(&err);
    let message = match &err {
        WmprError::Validation(message) => message.clone(),
        WmprError::Unauthorized => "User not authenticated".to_string(),
        WmprError::NotFound(_) => "Project not found".to_string(),
        other => other.to_string(),
    };

    if status.is_server_error() {
        error!("Settings request failed: {}", err);
    } else {
        warn!("Settings request rejected: {}", err);
    }
    (status, message).into_response()
}

/// Health check endpoint
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "wmpr-feed",
        "version": wmpr_core::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.snapshot().to_prometheus(),
    )
}

/// Request timing middleware
pub async fn timing_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let duration = start.elapsed();
    trace!("{} {} - {}ms", method, uri, duration.as_millis());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&WmprError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&WmprError::invalid_query("x", "bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&WmprError::validation("Project key is required")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&WmprError::not_found("ABC")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&WmprError::Timeout { timeout_ms: 10 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&WmprError::search_engine("down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_query_body_names_query() {
        let failure = FeedFailure {
            request_id: "WMPR-1-abc".to_string(),
            duration_ms: 3,
            error: WmprError::invalid_query("project = WMPR", "nope"),
        };
        let (status, body) = failure_body(&failure);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["jql"], "project = WMPR");
        assert_eq!(body["requestId"], "WMPR-1-abc");
        assert!(body.get("errorType").is_none());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let response = cors_preflight_recent().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "GET, OPTIONS"
        );
    }
}
