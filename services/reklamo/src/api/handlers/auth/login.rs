//! Password login endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{AuthError, ErrorResponse};
use super::rate_limit::RateLimitAction;
use super::session::{MintedSession, bearer_header, mint_session, pending_cookie, session_cookie};
use super::state::AuthState;
use super::storage::UserRecord;
use super::types::{LoginRequest, LoginResponse};
use super::utils::{extract_client_ip, normalize_email, valid_email, verify_password};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Password accepted; body says whether a second factor is still required", body = LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    // The login guard runs before any credential work.
    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let decision = auth_state
        .rate_limiter()
        .check(&client_ip, RateLimitAction::Login);
    if !decision.allowed {
        return AuthError::RateLimited(decision).into_response();
    }

    let user = match auth_state.store().find_by_email(&email_normalized).await {
        Ok(user) => user,
        Err(err) => return AuthError::from(err).into_response(),
    };

    // Unknown email, missing password, and mismatch are logged apart but
    // answered identically so responses cannot be used to probe accounts.
    let Some(user) = user else {
        info!("login rejected: unknown email");
        return AuthError::InvalidCredentials.into_response();
    };

    let Some(password_hash) = user.password_hash.as_deref() else {
        info!(user_id = user.id, "login rejected: no password set");
        return AuthError::InvalidCredentials.into_response();
    };

    match verify_password(&request.password, password_hash) {
        Ok(true) => {}
        Ok(false) => {
            info!(user_id = user.id, "login rejected: password mismatch");
            return AuthError::InvalidCredentials.into_response();
        }
        Err(err) => {
            error!(user_id = user.id, "password verification failed: {err}");
            return AuthError::InvalidCredentials.into_response();
        }
    }

    if user.two_factor_enabled {
        return start_second_factor(&auth_state, &user).await;
    }

    issue_session(&auth_state, &user)
}

/// Park the login behind a pending marker until a TOTP code arrives.
async fn start_second_factor(auth_state: &AuthState, user: &UserRecord) -> Response {
    if user.two_factor_secret.is_none() {
        // Enabled flag without a secret breaks the enrollment invariant.
        error!(user_id = user.id, "two-factor enabled without a stored secret");
        return AuthError::InvalidCredentials.into_response();
    }

    let marker = auth_state.pending().store(user.id).await;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = pending_cookie(auth_state, marker) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = LoginResponse {
        second_factor_required: true,
        session: None,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

/// Mint a session token and attach it as cookie and bearer header.
pub(super) fn issue_session(auth_state: &AuthState, user: &UserRecord) -> Response {
    let MintedSession { token, response } = match mint_session(auth_state, user.id, user.role) {
        Ok(minted) => minted,
        Err(err) => {
            error!("failed to sign session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state, &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    if let Some(value) = bearer_header(&token) {
        response_headers.insert(AUTHORIZATION, value);
    }
    let body = LoginResponse {
        second_factor_required: false,
        session: Some(response),
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}
