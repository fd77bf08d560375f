//! Error taxonomy for the auth endpoints.
//!
//! Every failure path resolves to one of these kinds; none are downgraded to
//! success. Rate-limit denials carry the quota decision so the response can
//! report remaining allowance and reset time.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use super::rate_limit::{RateLimitDecision, rate_limit_headers};
use super::storage::StoreError;

/// Stable machine-readable error body.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid verification code")]
    InvalidCode,
    #[error("no pending verification")]
    NoPendingVerification,
    #[error("session expired")]
    SessionExpired,
    #[error("session invalid")]
    SessionInvalid,
    #[error("rate limited")]
    RateLimited(RateLimitDecision),
    #[error("credential store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable kind string used in response bodies and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidCode => "invalid_code",
            Self::NoPendingVerification => "no_pending_verification",
            Self::SessionExpired => "session_expired",
            Self::SessionInvalid => "session_invalid",
            Self::RateLimited(_) => "rate_limited",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::NoPendingVerification
            | Self::SessionExpired
            | Self::SessionInvalid => StatusCode::UNAUTHORIZED,
            Self::InvalidCode => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for AuthError {
    /// Lookups report absence through `Option`, so `NotFound` here means a
    /// write referenced a user that no longer exists.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::SessionInvalid,
            StoreError::Unavailable(err) => Self::StoreUnavailable(err),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::StoreUnavailable(err) = &self {
            error!("credential store unavailable: {err:#}");
        }

        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
        });

        match self {
            Self::RateLimited(decision) => {
                (status, rate_limit_headers(&decision), body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
