use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

impl Health {
    /// Snapshot of the running build plus the database probe result.
    fn report(database_ok: bool) -> Self {
        let database = if database_ok { "ok" } else { "error" };
        Self {
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database is reachable", body = [Health]),
        (status = 503, description = "Database is unreachable", body = [Health])
    ),
    tag = "health"
)]
pub async fn health(method: Method, pool: Extension<PgPool>) -> impl IntoResponse {
    let database_ok = database_reachable(&pool.0).await;
    let health = Health::report(database_ok);

    // OPTIONS is registered for CORS preflight and answers without a body.
    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, app_header(&health), body)
}

/// Acquire a pooled connection and ping it, each inside its own span.
async fn database_reachable(pool: &PgPool) -> bool {
    let span = info_span!("db.acquire", db.system = "postgresql", db.operation = "ACQUIRE");
    let mut conn = match pool.acquire().instrument(span).await {
        Ok(conn) => conn,
        Err(error) => {
            error!("Failed to acquire database connection: {error}");
            return false;
        }
    };

    let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    match conn.ping().instrument(span).await {
        Ok(()) => {
            debug!("Database ping ok");
            true
        }
        Err(error) => {
            error!("Failed to ping database: {error}");
            false
        }
    }
}

/// `X-App: name:version:shortcommit`, dropped if it will not parse.
fn app_header(health: &Health) -> HeaderMap {
    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(x_app) => {
            debug!("X-App header: {x_app:?}");
            headers.insert("X-App", x_app);
        }
        Err(err) => error!("Failed to parse X-App header: {err}"),
    }
    headers
}
