//! Two-factor verification and enrollment endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::{AuthError, ErrorResponse};
use super::login::issue_session;
use super::rate_limit::RateLimitAction;
use super::session::{clear_pending_cookie, extract_pending_marker, require_session};
use super::state::AuthState;
use super::types::{
    LoginResponse, TwoFactorEnableRequest, TwoFactorSetupResponse, TwoFactorStatusResponse,
    TwoFactorVerifyRequest,
};
use super::utils::{extract_client_ip, now_unix_seconds_u64};
use crate::totp::TotpEngine;

#[utoipa::path(
    post,
    path = "/v1/auth/two-factor/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 200, description = "Second factor accepted; session issued", body = LoginResponse),
        (status = 400, description = "Invalid code", body = ErrorResponse),
        (status = 401, description = "No pending verification", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_two_factor(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorVerifyRequest>>,
) -> impl IntoResponse {
    let request: TwoFactorVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Code attempts share the login guard with the password endpoint.
    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let decision = auth_state
        .rate_limiter()
        .check(&client_ip, RateLimitAction::Login);
    if !decision.allowed {
        return AuthError::RateLimited(decision).into_response();
    }

    let Some(marker) = extract_pending_marker(&headers) else {
        return AuthError::NoPendingVerification.into_response();
    };

    // Peek first: a wrong code must leave the marker usable for a retry.
    let Some(user_id) = auth_state.pending().peek(marker).await else {
        return AuthError::NoPendingVerification.into_response();
    };

    let user = match auth_state.store().find_by_id(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id, "pending login references a missing user");
            return AuthError::NoPendingVerification.into_response();
        }
        Err(err) => return AuthError::from(err).into_response(),
    };

    if !user.two_factor_enabled {
        warn!(user_id = user.id, "pending login for a user without two-factor");
        return AuthError::NoPendingVerification.into_response();
    }
    let Some(secret) = user.two_factor_secret.as_deref() else {
        error!(user_id = user.id, "two-factor enabled without a stored secret");
        return AuthError::NoPendingVerification.into_response();
    };

    match auth_state
        .totp()
        .verify(secret, request.code.trim(), now_unix_seconds_u64())
    {
        Ok(true) => {}
        Ok(false) => {
            info!(user_id = user.id, "two-factor rejected: code mismatch");
            return AuthError::InvalidCode.into_response();
        }
        Err(err) => {
            error!(user_id = user.id, "two-factor verification failed: {err}");
            return AuthError::InvalidCode.into_response();
        }
    }

    // Consume only after the code passed; losing the race to a concurrent
    // verify means the marker is already spent.
    if auth_state.pending().take(marker).await.is_none() {
        return AuthError::NoPendingVerification.into_response();
    }

    let mut response = issue_session(&auth_state, &user);
    if let Ok(cookie) = clear_pending_cookie(auth_state.config()) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    get,
    path = "/v1/auth/two-factor/setup",
    responses(
        (status = 200, description = "Fresh secret with provisioning URL and QR code", body = TwoFactorSetupResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn two_factor_setup(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(err) = check_api_guard(&headers, &auth_state) {
        return err.into_response();
    }
    let claims = match require_session(&headers, &auth_state) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    // The provisioning URL labels the account with the user's email.
    let user = match auth_state.store().find_by_id(claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return AuthError::SessionInvalid.into_response(),
        Err(err) => return AuthError::from(err).into_response(),
    };

    // Nothing is persisted here; the secret only takes effect once the
    // enable endpoint sees a valid code for it.
    let secret = TotpEngine::generate_secret();
    let otpauth_url = match auth_state.totp().provisioning_url(&secret, &user.email) {
        Ok(url) => url,
        Err(err) => {
            error!("failed to build provisioning url: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let qr_data_url = match auth_state.totp().qr_data_url(&secret, &user.email) {
        Ok(url) => url,
        Err(err) => {
            error!("failed to render enrollment qr code: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = TwoFactorSetupResponse {
        secret,
        otpauth_url,
        qr_data_url,
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/two-factor/enable",
    request_body = TwoFactorEnableRequest,
    responses(
        (status = 200, description = "Two-factor enabled", body = TwoFactorStatusResponse),
        (status = 400, description = "Invalid code", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn two_factor_enable(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorEnableRequest>>,
) -> impl IntoResponse {
    if let Err(err) = check_api_guard(&headers, &auth_state) {
        return err.into_response();
    }
    let claims = match require_session(&headers, &auth_state) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let request: TwoFactorEnableRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let secret = request.secret.trim();
    if secret.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing secret".to_string()).into_response();
    }

    // Proving one live code guards against enrolling a mistyped secret
    // that would lock the user out at the next login.
    match auth_state
        .totp()
        .verify(secret, request.code.trim(), now_unix_seconds_u64())
    {
        Ok(true) => {}
        Ok(false) => {
            info!(user_id = claims.sub, "two-factor enable rejected: code mismatch");
            return AuthError::InvalidCode.into_response();
        }
        Err(err) => {
            info!(user_id = claims.sub, "two-factor enable rejected: {err}");
            return AuthError::InvalidCode.into_response();
        }
    }

    match auth_state
        .store()
        .update_two_factor(claims.sub, true, Some(secret))
        .await
    {
        Ok(()) => {
            info!(user_id = claims.sub, "two-factor enabled");
            let response = TwoFactorStatusResponse {
                two_factor_enabled: true,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => AuthError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/two-factor/disable",
    responses(
        (status = 200, description = "Two-factor disabled", body = TwoFactorStatusResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn two_factor_disable(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(err) = check_api_guard(&headers, &auth_state) {
        return err.into_response();
    }
    let claims = match require_session(&headers, &auth_state) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    // Idempotent: disabling an already-disabled account is still a success.
    match auth_state
        .store()
        .update_two_factor(claims.sub, false, None)
        .await
    {
        Ok(()) => {
            info!(user_id = claims.sub, "two-factor disabled");
            let response = TwoFactorStatusResponse {
                two_factor_enabled: false,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => AuthError::from(err).into_response(),
    }
}

fn check_api_guard(headers: &HeaderMap, auth_state: &AuthState) -> Result<(), AuthError> {
    let client_ip = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let decision = auth_state
        .rate_limiter()
        .check(&client_ip, RateLimitAction::Api);
    if decision.allowed {
        Ok(())
    } else {
        Err(AuthError::RateLimited(decision))
    }
}
