//! TOTP second-factor engine.
//!
//! Standard 30-second step, SHA-1, 6 digits. Secrets are 160-bit, base32
//! encoded, and treated as opaque strings by the credential store. Adjacent
//! time-step tolerance (`skew`) defaults to zero; a deployment that needs to
//! absorb client clock drift can widen it to one step via `--totp-skew`.

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

pub const TOTP_DIGITS: usize = 6;
pub const TOTP_STEP_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TotpEngine {
    issuer: String,
    skew: u8,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            skew: 0,
        }
    }

    #[must_use]
    pub fn with_skew(mut self, skew: u8) -> Self {
        self.skew = skew;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub const fn skew(&self) -> u8 {
        self.skew
    }

    /// Generate a fresh 160-bit secret, base32 encoded.
    #[must_use]
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("Secret decode error: {e:?}"))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            self.skew,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }

    /// `otpauth://` provisioning URL for enrollment in an authenticator app.
    ///
    /// # Errors
    /// Returns an error if the secret is not valid base32 or is too short.
    pub fn provisioning_url(&self, secret_base32: &str, account: &str) -> Result<String> {
        Ok(self.totp(secret_base32, account)?.get_url())
    }

    /// Provisioning URL rendered as a scannable base64 PNG data URL.
    ///
    /// # Errors
    /// Returns an error if the secret is invalid or QR rendering fails.
    pub fn qr_data_url(&self, secret_base32: &str, account: &str) -> Result<String> {
        let totp = self.totp(secret_base32, account)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|e| anyhow!("QR gen error: {e}"))?;
        Ok(format!("data:image/png;base64,{qr}"))
    }

    /// Code for the time step containing `time` (unix seconds).
    ///
    /// # Errors
    /// Returns an error if the secret is invalid.
    pub fn current_code(&self, secret_base32: &str, time: u64) -> Result<String> {
        // label doesn't matter for code derivation
        Ok(self.totp(secret_base32, "user")?.generate(time))
    }

    /// Check a submitted code at `time`; accepts ±`skew` adjacent steps.
    ///
    /// # Errors
    /// Returns an error if the secret is invalid.
    pub fn verify(&self, secret_base32: &str, code: &str, time: u64) -> Result<bool> {
        Ok(self.totp(secret_base32, "user")?.check(code, time))
    }
}
