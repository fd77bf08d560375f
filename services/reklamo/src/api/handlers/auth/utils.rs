//! Small helpers for auth validation and password checks.

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordVerifier, password_hash};
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Normalize an email for lookup; the store only holds lowercase addresses.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shallow shape check on already-normalized input. Deliverability is the
/// mail system's problem; this only rejects obvious garbage early.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(EMAIL_PATTERN).is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Verify a password against a stored Argon2 hash.
///
/// A malformed stored hash is an error rather than a mismatch, so corrupted
/// records surface in logs instead of looking like bad passwords.
pub(super) fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow::anyhow!("invalid password hash"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(anyhow::anyhow!("failed to verify password: {err}")),
    }
}

pub(super) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Convenience for TOTP step math (unsigned).
pub(super) fn now_unix_seconds_u64() -> u64 {
    u64::try_from(now_unix_seconds()).unwrap_or(0)
}

/// Client address for rate-limit keying: first `x-forwarded-for` hop,
/// then `x-real-ip`.
pub(super) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    first_forwarded_hop(headers).or_else(|| header_str(headers, "x-real-ip"))
}

fn first_forwarded_hop(headers: &axum::http::HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let hop = raw.split(',').next()?.trim();
    (!hop.is_empty()).then(|| hop.to_string())
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use argon2::{PasswordHasher, password_hash::SaltString};
    use axum::http::{HeaderMap, HeaderValue};
    use rand::rngs::OsRng;

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    #[test]
    fn emails_normalize_for_lookup() {
        assert_eq!(normalize_email("  Bob@Reklamo.DEV "), "bob@reklamo.dev");
    }

    #[test]
    fn email_shape_check() {
        assert!(valid_email("bob@reklamo.dev"));
        assert!(valid_email("first.last@mail.example"));

        assert!(!valid_email("plainaddress"));
        assert!(!valid_email("no-at-sign.example.com"));
        assert!(!valid_email("user@"));
        assert!(!valid_email("user @example.com"));
    }

    #[test]
    fn verify_password_accepts_matching_password() {
        let stored = hash("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &stored).unwrap());
    }

    #[test]
    fn verify_password_rejects_wrong_password() {
        let stored = hash("correct horse battery staple");
        assert!(!verify_password("tr0ub4dor&3", &stored).unwrap());
    }

    #[test]
    fn verify_password_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn now_unix_seconds_is_past_2023() {
        assert!(now_unix_seconds() > 1_672_531_200);
    }

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_client_ip(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn client_ip_reads_real_ip_without_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            extract_client_ip(&headers),
            Some("198.51.100.2".to_string())
        );
    }

    #[test]
    fn client_ip_ignores_blank_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(extract_client_ip(&headers), None);
    }

    #[test]
    fn client_ip_absent_without_proxy_headers() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
