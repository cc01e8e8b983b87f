//! Process-wide tracing setup shared by every binary in the workspace.
//!
//! Logs go to stderr as JSON so that stdout carries only command output.
//! `RUST_LOG` overrides the configured level. Setting
//! `OTEL_EXPORTER_OTLP_ENDPOINT` additionally exports spans over OTLP/HTTP,
//! which needs a running Tokio runtime.

use std::borrow::Cow;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use tracing::{Dispatch, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

/// Shuts the global tracer provider down on drop, flushing pending spans.
pub struct OtelGuard {
    _private: (),
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Counts ERROR events as `tracing_error_events`.
struct ErrorCounterLayer;

impl<S: Subscriber> Layer<S> for ErrorCounterLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().level() == &Level::ERROR {
            metrics::counter!("tracing_error_events").increment(1);
        }
    }
}

fn otlp_tracer(service_name: String) -> Option<Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|err| eprintln!("otlp export disabled: {err}"))
        .ok()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new([KeyValue::new("service.name", service_name)]))
        .build();
    let tracer = provider.tracer("soccer_pool");
    let _ = opentelemetry::global::set_tracer_provider(provider);
    Some(tracer)
}

/// Builds the dispatcher a binary installs with `set_global_default`. The
/// guard is `Some` only when OTLP export is active; keep it alive in `main`.
pub fn build_dispatch(
    service_name: impl Into<Cow<'static, str>>,
    default_level: &str,
) -> (Dispatch, Option<OtelGuard>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(ErrorCounterLayer);

    match otlp_tracer(service_name.into().into_owned()) {
        Some(tracer) => (
            Dispatch::new(registry.with(tracing_opentelemetry::layer().with_tracer(tracer))),
            Some(OtelGuard { _private: () }),
        ),
        None => (Dispatch::new(registry), None),
    }
}
