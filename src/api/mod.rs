use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

mod auth_routes;
mod generate;
mod guard;

use crate::rate_limit::RateLimitInfo;
use crate::state::AppState;

/// Axum REST API routes.
///
///   GET  /health                   -> health check
///   POST /api/auth/register        -> create identity, returns token
///   POST /api/auth/login           -> returns token
///   GET  /api/auth/verify          -> resolve bearer token to identity
///   POST /api/generate/image       -> caption an uploaded image (protected)
///   POST /api/generate/video       -> caption an uploaded video (protected)
///   GET  /api/rate-limit/status    -> current quota snapshot (protected)
///
/// Protected routes require a bearer token and pass quota admission before
/// the handler runs. All responses carry permissive CORS headers.
pub fn api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Body limit above the render payload ceiling so oversized uploads
    // reach the typed PayloadTooLarge path instead of a bare 413.
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes * 2);

    let protected = Router::new()
        .route("/api/generate/image", post(generate::generate_image))
        .route("/api/generate/video", post(generate::generate_video))
        .route("/api/rate-limit/status", get(generate::rate_limit_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            guard::authenticate_and_admit,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/login", post(auth_routes::login))
        .route("/api/auth/verify", get(auth_routes::verify))
        .merge(protected)
        .layer(body_limit)
        .layer(cors)
        .layer(axum::middleware::from_fn(preflight_no_content))
        .with_state(state)
}

/// The CORS layer answers preflight OPTIONS with 200; rewrite that
/// terminal state to 204 No Content since preflights carry no body.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let preflight = req.method() == Method::OPTIONS
        && req.headers().contains_key("access-control-request-method");
    let mut response = next.run(req).await;
    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

// ── Shared types and helpers used across sub-modules ────────────────────

/// Error envelope: `{error, rateLimitInfo?, retryAfter?}`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_info: Option<RateLimitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            rate_limit_info: None,
            retry_after: None,
        }
    }

    pub fn with_quota(msg: impl Into<String>, info: RateLimitInfo) -> Self {
        Self {
            error: msg.into(),
            rate_limit_info: Some(info),
            retry_after: None,
        }
    }
}

pub(crate) type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Extract the bearer token from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Client origin component of the quota key. Honours forwarding headers,
/// falling back to a shared bucket for unattributable callers.
pub(crate) fn client_origin(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

pub(crate) fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert("authorization", "Basic dXNlcg==".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_client_origin_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_origin(&headers), "unknown");

        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_origin(&headers), "10.0.0.2");

        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_origin(&headers), "203.0.113.9");
    }

    #[test]
    fn test_error_envelope_omits_empty_fields() {
        let plain = serde_json::to_value(ErrorResponse::new("nope")).unwrap();
        assert_eq!(plain, serde_json::json!({ "error": "nope" }));

        let with_quota = ErrorResponse::with_quota(
            "slow down",
            RateLimitInfo {
                limit: 10,
                remaining: 0,
                reset_seconds: 42,
            },
        );
        let value = serde_json::to_value(with_quota).unwrap();
        assert_eq!(value["rateLimitInfo"]["resetSeconds"], 42);
    }
}
