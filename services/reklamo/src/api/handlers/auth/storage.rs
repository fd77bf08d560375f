//! Credential storage for the auth handlers.
//!
//! [`CredentialStore`] abstracts the user table so handlers stay testable
//! without a live database. `PgCredentialStore` is the production backend;
//! `MemoryCredentialStore` backs handler tests and local development.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use tracing::Instrument;
use utoipa::ToSchema;

/// Platform role carried in session claims.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Regular,
    Company,
    CompanyPending,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "REGULAR",
            Self::Company => "COMPANY",
            Self::CompanyPending => "COMPANY_PENDING",
            Self::Admin => "ADMIN",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "REGULAR" => Some(Self::Regular),
            "COMPANY" => Some(Self::Company),
            "COMPANY_PENDING" => Some(Self::CompanyPending),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// One row of the user table, as the auth flows see it.
///
/// `password_hash` is nullable: invited users exist before they set a
/// password and can never pass a credential check. `two_factor_secret` is
/// non-null exactly when `two_factor_enabled` is true.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("credential store unavailable")]
    Unavailable(#[source] anyhow::Error),
}

/// Persistence seam for user credentials.
///
/// Callers pass emails already normalized to lowercase; lookups are exact.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Persist both two-factor columns in one write so the
    /// enabled/secret pair can never be observed half-updated.
    async fn update_two_factor(
        &self,
        user_id: i64,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<UserRecord, StoreError> {
    let role: String = row.get("role");
    let role = Role::from_str(&role)
        .ok_or_else(|| StoreError::Unavailable(anyhow::anyhow!("unknown role value: {role}")))?;

    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        two_factor_enabled: row.get("two_factor_enabled"),
        two_factor_secret: row.get("two_factor_secret"),
    })
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = r"
            SELECT id, email, password_hash, role::text AS role,
                   two_factor_enabled, two_factor_secret
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                StoreError::Unavailable(
                    anyhow::Error::new(err).context("failed to look up user by email"),
                )
            })?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let query = r"
            SELECT id, email, password_hash, role::text AS role,
                   two_factor_enabled, two_factor_secret
            FROM users
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                StoreError::Unavailable(
                    anyhow::Error::new(err).context("failed to look up user by id"),
                )
            })?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn update_two_factor(
        &self,
        user_id: i64,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE users
            SET two_factor_enabled = $2,
                two_factor_secret = $3,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(enabled)
            .bind(secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                StoreError::Unavailable(
                    anyhow::Error::new(err).context("failed to update two-factor state"),
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// In-process backend for handler tests and local development.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<i64, UserRecord>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: UserRecord) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.insert(record.id, record);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&user_id).cloned())
    }

    async fn update_two_factor(
        &self,
        user_id: i64,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(user) = users.get_mut(&user_id) else {
            return Err(StoreError::NotFound);
        };
        user.two_factor_enabled = enabled;
        user.two_factor_secret = secret.map(ToString::to_string);
        Ok(())
    }
}
