//! Logging and trace-export setup.
//!
//! Logs always go through `tracing` with a pretty fmt layer. Span export
//! is opt-in: when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OTLP gRPC
//! exporter is attached as well (gRPC is the only supported protocol).

use anyhow::{Result, anyhow};
use base64::{Engine, engine::general_purpose};
use once_cell::sync::OnceCell;
use opentelemetry::{
    KeyValue, global, propagation::TextMapCompositePropagator, trace::TracerProvider as _,
};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    runtime,
    trace::{Tracer, TracerProvider},
};
use std::{collections::HashMap, env::var, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;
use url::Url;

static TRACER_PROVIDER: OnceCell<TracerProvider> = OnceCell::new();

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Initialize the global subscriber: fmt layer, env filter, and the OTLP
/// layer when an endpoint is configured.
///
/// # Errors
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init(level: Option<Level>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.unwrap_or(Level::ERROR).into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    // `Option<Layer>` composes as a no-op when tracing export is off.
    let otel_layer = match var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(_) => Some(tracing_opentelemetry::layer().with_tracer(otlp_tracer()?)),
        Err(_) => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush and drop the exporter; a no-op when export was never enabled.
pub fn shutdown() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("flushing spans before exit");
        let _ = provider.shutdown();
        debug!("span exporter stopped");
    }
}

fn otlp_tracer() -> Result<Tracer> {
    if let Ok(protocol) = var("OTEL_EXPORTER_OTLP_PROTOCOL") {
        if protocol != "grpc" {
            debug!("ignoring OTEL_EXPORTER_OTLP_PROTOCOL='{protocol}': only 'grpc' is supported");
        }
    }

    let endpoint = normalize_endpoint(
        var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string()),
    );

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(host) = tls_domain(&endpoint) {
        let tls = ClientTlsConfig::new().domain_name(host).with_native_roots();
        builder = builder.with_tls_config(tls);
    }

    if let Ok(raw) = var("OTEL_EXPORTER_OTLP_HEADERS") {
        let pairs = parse_header_pairs(&raw);
        if !pairs.is_empty() {
            builder = builder.with_metadata(metadata_from_pairs(&pairs)?);
        }
    }

    let exporter = builder.build()?;

    let instance_id = match var("OTEL_SERVICE_INSTANCE_ID") {
        Ok(id) => id,
        Err(_) => Ulid::new().to_string(),
    };
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", instance_id),
        ]))
        .build();

    // Held so shutdown() can flush; the global registration below is a clone.
    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

fn normalize_endpoint(endpoint: String) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint
    } else {
        // Bare host:port; gRPC collectors default to TLS.
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

/// Host to pin the TLS handshake to, for https endpoints only.
fn tls_domain(endpoint: &str) -> Option<String> {
    let parsed = Url::parse(endpoint).ok()?;
    if parsed.scheme() != "https" {
        return None;
    }
    parsed.host_str().map(str::to_string)
}

/// `OTEL_EXPORTER_OTLP_HEADERS` is `key=value` pairs joined with commas.
/// Pairs without a `=` are dropped; values may themselves contain `=`.
fn parse_header_pairs(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Keys ending in `-bin` carry base64-encoded binary values, everything
/// else is plain ASCII metadata.
fn metadata_from_pairs(pairs: &HashMap<String, String>) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(pairs.len());

    for (key, value) in pairs {
        let name = key.to_ascii_lowercase();
        if name.ends_with("-bin") {
            let decoded = general_purpose::STANDARD
                .decode(value.as_bytes())
                .map_err(|e| anyhow!("failed to base64-decode value for key {name}: {e}"))?;
            let key = MetadataKey::<Binary>::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("invalid binary metadata key {name}: {e}"))?;
            metadata.insert_bin(key, MetadataValue::from_bytes(&decoded));
        } else {
            let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("invalid ASCII metadata key {name}: {e}"))?;
            let value: MetadataValue<Ascii> = value
                .parse()
                .map_err(|e| anyhow!("invalid ASCII metadata value for key {name}: {e}"))?;
            metadata.insert(key, value);
        }
    }

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pairs_parse_and_trim() {
        let pairs = parse_header_pairs(" a = 1 , b=2 ");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs.get("a"), Some(&"1".to_string()));
        assert_eq!(pairs.get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn header_pairs_keep_equals_in_values() {
        let pairs = parse_header_pairs("authorization=Basic dXNlcj1wdw==");
        assert_eq!(
            pairs.get("authorization"),
            Some(&"Basic dXNlcj1wdw==".to_string())
        );
    }

    #[test]
    fn header_pairs_drop_malformed_entries() {
        let pairs = parse_header_pairs("ok=yes,orphan,also=fine");
        assert_eq!(pairs.len(), 2);
        assert!(!pairs.contains_key("orphan"));
    }

    #[test]
    fn header_pairs_empty_input() {
        assert!(parse_header_pairs("").is_empty());
    }

    #[test]
    fn metadata_accepts_ascii_keys() -> Result<()> {
        let mut pairs = HashMap::new();
        pairs.insert("authorization".to_string(), "Bearer token123".to_string());
        pairs.insert("x-tenant".to_string(), "reklamo".to_string());

        let metadata = metadata_from_pairs(&pairs)?;
        assert_eq!(metadata.len(), 2);
        Ok(())
    }

    #[test]
    fn metadata_decodes_binary_keys() -> Result<()> {
        let mut pairs = HashMap::new();
        pairs.insert("trace-ctx-bin".to_string(), "YmluYXJ5IGRhdGE=".to_string());

        let metadata = metadata_from_pairs(&pairs)?;
        assert_eq!(metadata.len(), 1);
        Ok(())
    }

    #[test]
    fn metadata_rejects_bad_base64() {
        let mut pairs = HashMap::new();
        pairs.insert("trace-ctx-bin".to_string(), "!!definitely not!!".to_string());

        let result = metadata_from_pairs(&pairs);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("base64"));
        }
    }

    #[test]
    fn endpoint_with_scheme_is_untouched() {
        assert_eq!(
            normalize_endpoint("http://localhost:4317".to_string()),
            "http://localhost:4317"
        );
    }

    #[test]
    fn endpoint_without_scheme_gets_https() {
        assert_eq!(
            normalize_endpoint("collector.reklamo.dev:4317".to_string()),
            "https://collector.reklamo.dev:4317"
        );
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        assert_eq!(
            normalize_endpoint("collector.reklamo.dev:4317/".to_string()),
            "https://collector.reklamo.dev:4317"
        );
    }

    #[test]
    fn tls_domain_only_for_https() {
        assert_eq!(
            tls_domain("https://collector.reklamo.dev:4317"),
            Some("collector.reklamo.dev".to_string())
        );
        assert_eq!(tls_domain("http://localhost:4317"), None);
    }

    #[test]
    fn shutdown_without_provider_is_a_noop() {
        shutdown();
    }
}
