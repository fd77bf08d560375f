use crate::{
    api::handlers::{auth, health, root},
    totp::TotpEngine,
};
use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, options},
};
use secrecy::SecretString;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Router with every documented endpoint attached; see `openapi.rs`.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Connect the pool, assemble the middleware stack, and serve until a
/// shutdown signal arrives.
///
/// # Errors
/// Returns an error if the database or listener cannot be set up, or if
/// the server exits abnormally.
pub async fn new(
    port: u16,
    dsn: String,
    session_secret: SecretString,
    auth_config: auth::AuthConfig,
    totp: TotpEngine,
    rate_limiter: Arc<dyn auth::RateLimiter>,
) -> Result<()> {
    // Shutdown drains on a channel; OS signals are the only senders.
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    spawn_signal_listener(shutdown_tx);

    let pool = connect_pool(&dsn).await?;

    let store = Arc::new(auth::PgCredentialStore::new(pool.clone()));
    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        session_secret,
        store,
        rate_limiter,
        totp,
    ));

    let allowed_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(allowed_origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    // Documented routes come from openapi.rs; `/` and the preflight-only
    // `OPTIONS /health` are served but kept out of the document.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/", get(root::root))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(&Ulid::new().to_string()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(cors)
                .layer(Extension(auth_state.clone()))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{port}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn connect_pool(dsn: &str) -> Result<PgPool> {
    let options = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(120))
        .test_before_acquire(true);
    options
        .connect(dsn)
        .await
        .context("connecting to the database")
}

fn spawn_signal_listener(tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tx.send(()).ok();
    });
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Ctrl+C handler failed to install: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => error!("SIGTERM handler failed to install: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Per-request span: method, matched route (falling back to the raw
/// path), and the request id the middleware injected.
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().ok())
        .unwrap_or("none");
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str(),
        None => request.uri().path(),
    };

    info_span!(
        "http.request",
        request_id,
        http.method = %request.method(),
        http.route = route
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed
        .host_str()
        .with_context(|| format!("frontend base URL has no host: {frontend_base_url}"))?;

    let origin = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };
    HeaderValue::from_str(&origin).context("frontend origin is not a valid header value")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path() -> Result<()> {
        let origin = frontend_origin("https://reklamo.dev/app/")?;
        assert_eq!(origin, HeaderValue::from_static("https://reklamo.dev"));
        Ok(())
    }

    #[test]
    fn frontend_origin_keeps_port() -> Result<()> {
        let origin = frontend_origin("http://localhost:5173")?;
        assert_eq!(origin, HeaderValue::from_static("http://localhost:5173"));
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
