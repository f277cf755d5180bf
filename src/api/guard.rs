//! Bearer-auth and quota-admission middleware for protected routes.
//!
//! Verifies the bearer token first (401 without touching the quota
//! tracker), then runs the sliding-window admission check keyed by
//! (client origin, subject). Denials answer 429 with the quota snapshot
//! and a retry-after hint; admissions stash the claims and snapshot in
//! request extensions for the handler.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

use super::{bearer_token, client_origin, ErrorResponse};
use crate::rate_limit::quota_key;
use crate::state::AppState;
use crate::token;

pub async fn authenticate_and_admit(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(bearer) = bearer_token(req.headers()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Authentication required")),
        )
            .into_response();
    };

    let claims = match state.tokens.verify(bearer) {
        Ok(claims) => claims,
        Err(e) => {
            log::warn!(target: "memeforge.api.auth", "Rejected bearer token: {}", e);
            return (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(e.to_string())))
                .into_response();
        }
    };

    let origin = client_origin(req.headers());
    let key = quota_key(&origin, &claims.subject_id);
    let admission = match state.limiter.admit(&key, token::now_secs()).await {
        Ok(admission) => admission,
        Err(e) => {
            log::error!(target: "memeforge.rate_limit", "Admission check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            )
                .into_response();
        }
    };

    if !admission.allowed {
        let retry_after = admission.info.reset_seconds;
        log::warn!(
            target: "memeforge.rate_limit",
            "Rate limit exceeded for {} (limit {}/{}s)",
            key,
            admission.info.limit,
            retry_after
        );
        let mut body = ErrorResponse::with_quota("Rate limit exceeded", admission.info);
        body.retry_after = Some(retry_after);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("retry-after", retry_after.to_string())],
            Json(body),
        )
            .into_response();
    }

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(admission.info);
    next.run(req).await
}
