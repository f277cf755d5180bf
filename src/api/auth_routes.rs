//! Public authentication routes: register, login, verify.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::{bearer_token, log_api_issue, ApiResult, ErrorResponse};
use crate::state::AppState;
use crate::users::{self, User, UserError};

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Deserialize)]
pub struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

/// Identity fields safe to return to callers.
#[derive(Serialize)]
pub struct IdentitySummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for IdentitySummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub identity: IdentitySummary,
    pub token: String,
}

fn bad_request(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(msg)))
}

/// POST /api/auth/register -- create an identity and issue a token.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let name = body.name.as_deref().map(str::trim).unwrap_or("");
    let email = body.email.as_deref().map(str::trim).unwrap_or("");
    let password = body.password.as_deref().unwrap_or("");

    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(bad_request("Name, email, and password are required"));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(bad_request("Password must be at least 6 characters long"));
    }
    if state.users.find_by_email(email).is_some() {
        log_api_issue(
            StatusCode::CONFLICT,
            "memeforge.api.auth",
            format!("Registration conflict for {}", email),
        );
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("User already exists with this email")),
        ));
    }

    let password_hash = users::hash_password(password).map_err(|e| {
        log_api_issue(
            StatusCode::INTERNAL_SERVER_ERROR,
            "memeforge.api.auth",
            format!("Hashing failed during registration: {}", e),
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Internal server error")),
        )
    })?;

    let user = User::new(name, email, password_hash);
    state.users.insert(user.clone()).map_err(|e| match e {
        UserError::AlreadyExists => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("User already exists with this email")),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Internal server error")),
        ),
    })?;

    let token = issue_token(&state, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            identity: IdentitySummary::from(&user),
            token,
        }),
    ))
}

/// POST /api/auth/login -- verify credentials and issue a token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<SessionResponse>> {
    let email = body.email.as_deref().map(str::trim).unwrap_or("");
    let password = body.password.as_deref().unwrap_or("");

    if email.is_empty() || password.is_empty() {
        return Err(bad_request("Email and password are required"));
    }

    // One rejection message for both unknown email and bad credential.
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid email or password")),
        )
    };

    let user = state.users.find_by_email(email).ok_or_else(invalid)?;
    if !users::verify_password(password, &user.password_hash) {
        log_api_issue(
            StatusCode::UNAUTHORIZED,
            "memeforge.api.auth",
            format!("Failed login for {}", email),
        );
        return Err(invalid());
    }

    let token = issue_token(&state, &user)?;
    Ok(Json(SessionResponse {
        identity: IdentitySummary::from(&user),
        token,
    }))
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub identity: IdentitySummary,
}

/// GET /api/auth/verify -- resolve a bearer token to its live identity.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<VerifyResponse>> {
    let unauthorized = |msg: &str| (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(msg)));

    let bearer = bearer_token(&headers).ok_or_else(|| unauthorized("No token provided"))?;
    let claims = state
        .tokens
        .verify(bearer)
        .map_err(|e| unauthorized(&e.to_string()))?;

    // The claim is self-contained, but this route reports the live record.
    let user = state
        .users
        .get(&claims.subject_id)
        .ok_or_else(|| unauthorized("User not found"))?;

    Ok(Json(VerifyResponse {
        identity: IdentitySummary::from(&user),
    }))
}

fn issue_token(state: &AppState, user: &User) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    state.tokens.issue(user).map_err(|e| {
        log_api_issue(
            StatusCode::INTERNAL_SERVER_ERROR,
            "memeforge.api.auth",
            format!("Token signing failed: {}", e),
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Internal server error")),
        )
    })
}
