//! Wire types shared by the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    /// True when the password check passed but a TOTP code is still required.
    pub second_factor_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: i64,
    pub role: Role,
    pub expires_at: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorSetupResponse {
    /// Base32 secret, shown once so the user can type it manually.
    pub secret: String,
    pub otpauth_url: String,
    /// PNG data URL for authenticator-app enrollment.
    pub qr_data_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorEnableRequest {
    pub secret: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorStatusResponse {
    pub two_factor_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_parses_and_serializes() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request)?,
            serde_json::json!({
                "email": "alice@example.com",
                "password": "hunter2hunter2",
            })
        );

        let decoded: LoginRequest =
            serde_json::from_str(r#"{"email":"bob@example.com","password":"pw"}"#)?;
        assert_eq!(decoded.email, "bob@example.com");
        Ok(())
    }

    #[test]
    fn login_response_omits_absent_session() -> Result<()> {
        let response = LoginResponse {
            second_factor_required: true,
            session: None,
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("session").is_none());
        Ok(())
    }

    #[test]
    fn login_response_includes_session_claims() -> Result<()> {
        let response = LoginResponse {
            second_factor_required: false,
            session: Some(SessionResponse {
                user_id: 42,
                role: Role::Regular,
                expires_at: 1_700_604_800,
            }),
        };
        let value = serde_json::to_value(&response)?;
        let role = value
            .pointer("/session/role")
            .and_then(serde_json::Value::as_str)
            .context("missing role")?;
        assert_eq!(role, "REGULAR");
        Ok(())
    }

    #[test]
    fn two_factor_enable_request_round_trips() -> Result<()> {
        let request = TwoFactorEnableRequest {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            code: "287082".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: TwoFactorEnableRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.code, "287082");
        Ok(())
    }
}
