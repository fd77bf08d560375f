//! Session verification, cookie plumbing, and the session/logout endpoints.
//!
//! Sessions are stateless: the token itself carries the claims and there is
//! no server-side session table or revocation list. Logout therefore only
//! clears the cookie; an exfiltrated token stays valid until it expires.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use session_token::{SessionTokenClaims, TOKEN_VERSION, sign_hs256, verify_hs256};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    state::{AuthConfig, AuthState},
    storage::Role,
    types::SessionResponse,
    utils::now_unix_seconds,
};

const SESSION_COOKIE_NAME: &str = "reklamo_session";
const PENDING_COOKIE_NAME: &str = "reklamo_2fa";

/// Three-way session outcome so call sites stay exhaustive.
///
/// `Expired` and `Invalid` deny access identically; they exist as separate
/// variants only so logs can tell a stale client from a tampered token.
pub(super) enum SessionCheck {
    Active(SessionTokenClaims),
    Expired,
    Invalid,
    Missing,
}

pub(super) fn check_session(headers: &HeaderMap, state: &AuthState) -> SessionCheck {
    let Some(token) = extract_session_token(headers) else {
        return SessionCheck::Missing;
    };

    let secret = state.session_secret().expose_secret();
    match verify_hs256(&token, secret.as_bytes(), now_unix_seconds()) {
        Ok(claims) => SessionCheck::Active(claims),
        Err(session_token::Error::Expired) => SessionCheck::Expired,
        Err(_) => SessionCheck::Invalid,
    }
}

/// Gate for endpoints that need an authenticated caller.
pub(super) fn require_session(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<SessionTokenClaims, AuthError> {
    match check_session(headers, state) {
        SessionCheck::Active(claims) => Ok(claims),
        SessionCheck::Expired => Err(AuthError::SessionExpired),
        SessionCheck::Invalid | SessionCheck::Missing => Err(AuthError::SessionInvalid),
    }
}

pub(super) struct MintedSession {
    pub(super) token: String,
    pub(super) response: SessionResponse,
}

/// Sign a fresh session token for a user that fully authenticated.
pub(super) fn mint_session(
    state: &AuthState,
    user_id: i64,
    role: Role,
) -> Result<MintedSession, session_token::Error> {
    let now = now_unix_seconds();
    let expires_at = now + state.config().session_ttl_seconds();
    let claims = SessionTokenClaims {
        v: TOKEN_VERSION,
        sub: user_id,
        role: role.as_str().to_string(),
        iat: now,
        exp: expires_at,
    };
    let secret = state.session_secret().expose_secret();
    let token = sign_hs256(secret.as_bytes(), &claims)?;
    Ok(MintedSession {
        token,
        response: SessionResponse {
            user_id,
            role,
            expires_at,
        },
    })
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Claims for the active session", body = SessionResponse),
        (status = 204, description = "No usable session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Absent, expired, and malformed tokens all read as "no session";
    // this endpoint never errors on client input.
    match check_session(&headers, &auth_state) {
        SessionCheck::Active(claims) => {
            let Some(role) = Role::from_str(&claims.role) else {
                warn!(role = %claims.role, "session token carries unknown role");
                return StatusCode::NO_CONTENT.into_response();
            };
            let body = SessionResponse {
                user_id: claims.sub,
                role,
                expires_at: claims.exp,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        SessionCheck::Expired => {
            debug!("session token expired");
            StatusCode::NO_CONTENT.into_response()
        }
        SessionCheck::Invalid => {
            debug!("session token rejected");
            StatusCode::NO_CONTENT.into_response()
        }
        SessionCheck::Missing => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Cookies cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Stateless tokens cannot be revoked server-side; clearing both cookies
    // is all logout can do, and repeating it is harmless.
    let mut response_headers = HeaderMap::new();
    for cookie in [
        clear_session_cookie(auth_state.config()),
        clear_pending_cookie(auth_state.config()),
    ]
    .into_iter()
    .flatten()
    {
        response_headers.append(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Cookie that carries the session token to browser clients.
pub(super) fn session_cookie(
    auth_state: &AuthState,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        auth_state.config(),
        SESSION_COOKIE_NAME,
        token,
        auth_state.config().session_ttl_seconds(),
    )
}

pub(super) fn clear_session_cookie(
    auth_config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(auth_config, SESSION_COOKIE_NAME, "", 0)
}

/// Short-lived cookie carrying the pending two-factor marker.
pub(super) fn pending_cookie(
    auth_state: &AuthState,
    marker: Uuid,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = i64::try_from(auth_state.config().pending_login_ttl_seconds())
        .unwrap_or(i64::MAX);
    build_cookie(
        auth_state.config(),
        PENDING_COOKIE_NAME,
        &marker.to_string(),
        ttl_seconds,
    )
}

pub(super) fn clear_pending_cookie(
    auth_config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(auth_config, PENDING_COOKIE_NAME, "", 0)
}

fn build_cookie(
    auth_config: &AuthConfig,
    name: &str,
    value: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Secure is dropped for plain-http frontends so local development works.
    let secure = if auth_config.session_cookie_secure() {
        "; Secure"
    } else {
        ""
    };
    HeaderValue::from_str(&format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}{secure}"
    ))
}

/// Bearer response header mirroring the session cookie, for non-browser clients.
pub(super) fn bearer_header(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}")).ok()
}

pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| cookie_value(headers, SESSION_COOKIE_NAME))
}

pub(super) fn extract_pending_marker(headers: &HeaderMap) -> Option<Uuid> {
    let value = cookie_value(headers, PENDING_COOKIE_NAME)?;
    Uuid::parse_str(value.trim()).ok()
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        let value = value.trim();
        if key.trim() == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::super::state::{AuthConfig, AuthState};
    use super::super::storage::MemoryCredentialStore;
    use super::*;
    use crate::totp::TotpEngine;
    use secrecy::SecretString;

    const TEST_SECRET: &str = "reklamo-test-secret-0123456789ab";

    fn test_state(frontend: &str) -> AuthState {
        AuthState::new(
            AuthConfig::new(frontend.to_string()),
            SecretString::from(TEST_SECRET.to_string()),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(NoopRateLimiter),
            TotpEngine::new("Reklamo"),
        )
    }

    fn cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn extract_session_token_prefers_bearer() {
        let mut headers = cookie_headers("reklamo_session=cookie-token");
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        assert_eq!(
            extract_session_token(&headers),
            Some("header-token".to_string())
        );
    }

    #[test]
    fn extract_session_token_reads_cookie() {
        let headers = cookie_headers("other=1; reklamo_session=cookie-token; more=2");
        assert_eq!(
            extract_session_token(&headers),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn extract_session_token_ignores_empty_values() {
        let headers = cookie_headers("reklamo_session=");
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn extract_pending_marker_parses_uuid() {
        let marker = Uuid::new_v4();
        let headers = cookie_headers(&format!("reklamo_2fa={marker}"));
        assert_eq!(extract_pending_marker(&headers), Some(marker));
    }

    #[test]
    fn extract_pending_marker_rejects_garbage() {
        let headers = cookie_headers("reklamo_2fa=not-a-uuid");
        assert_eq!(extract_pending_marker(&headers), None);
    }

    #[test]
    fn session_cookie_is_http_only_lax_and_secure_over_https() {
        let state = test_state("https://reklamo.dev");
        let cookie = session_cookie(&state, "token").unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("reklamo_session=token; "));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_skips_secure_over_http() {
        let state = test_state("http://localhost:3000");
        let cookie = session_cookie(&state, "token").unwrap();
        assert!(!cookie.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn clear_session_cookie_expires_immediately() {
        let config = AuthConfig::new("https://reklamo.dev".to_string());
        let cookie = clear_session_cookie(&config).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("reklamo_session=; "));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn pending_cookie_uses_marker_ttl() {
        let state = test_state("https://reklamo.dev");
        let marker = Uuid::new_v4();
        let cookie = pending_cookie(&state, marker).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("reklamo_2fa={marker}; ")));
        assert!(cookie.contains("Max-Age=300"));
    }

    #[test]
    fn check_session_accepts_minted_token() {
        let state = test_state("https://reklamo.dev");
        let minted = mint_session(&state, 42, Role::Regular).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_header(&minted.token).unwrap());

        match check_session(&headers, &state) {
            SessionCheck::Active(claims) => {
                assert_eq!(claims.sub, 42);
                assert_eq!(claims.role, "REGULAR");
                assert_eq!(claims.exp, minted.response.expires_at);
            }
            _ => panic!("expected active session"),
        }
    }

    #[test]
    fn check_session_reports_expiry() {
        let state = test_state("https://reklamo.dev");
        let now = now_unix_seconds();
        let claims = SessionTokenClaims {
            v: TOKEN_VERSION,
            sub: 42,
            role: "REGULAR".to_string(),
            iat: now - 700_000,
            exp: now - 10,
        };
        let token = sign_hs256(TEST_SECRET.as_bytes(), &claims).unwrap();
        let headers = cookie_headers(&format!("reklamo_session={token}"));

        assert!(matches!(
            check_session(&headers, &state),
            SessionCheck::Expired
        ));
        assert!(matches!(
            require_session(&headers, &state),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn check_session_rejects_garbage_token() {
        let state = test_state("https://reklamo.dev");
        let headers = cookie_headers("reklamo_session=not.a.token");

        assert!(matches!(
            check_session(&headers, &state),
            SessionCheck::Invalid
        ));
        assert!(matches!(
            require_session(&headers, &state),
            Err(AuthError::SessionInvalid)
        ));
    }

    #[test]
    fn check_session_missing_token() {
        let state = test_state("https://reklamo.dev");
        let headers = HeaderMap::new();

        assert!(matches!(
            check_session(&headers, &state),
            SessionCheck::Missing
        ));
        assert!(matches!(
            require_session(&headers, &state),
            Err(AuthError::SessionInvalid)
        ));
    }
}
