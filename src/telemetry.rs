//! Tracing setup for the witness binary.
//!
//! Logs go to stderr so stdout stays clean for command output. `WITNESS_LOG`
//! takes an `EnvFilter` directive (default `warn`); `WITNESS_LOG_FORMAT=json`
//! switches to JSON lines. With the `otel` feature and
//! `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans are also exported over OTLP/HTTP.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const LOG_ENV: &str = "WITNESS_LOG";
pub const LOG_FORMAT_ENV: &str = "WITNESS_LOG_FORMAT";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps exporters alive; flushes them on drop.
#[must_use]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl TelemetryGuard {
    #[cfg(feature = "otel")]
    fn start() -> Self {
        Self {
            provider: otel::provider(),
        }
    }

    #[cfg(not(feature = "otel"))]
    const fn start() -> Self {
        Self {}
    }

    #[cfg(feature = "otel")]
    fn export_layer(&self) -> Option<BoxedLayer> {
        use opentelemetry::trace::TracerProvider as _;

        self.provider.as_ref().map(|p| {
            Box::new(tracing_opentelemetry::layer().with_tracer(p.tracer("witness"))) as BoxedLayer
        })
    }

    #[cfg(not(feature = "otel"))]
    #[allow(clippy::unused_self)]
    const fn export_layer(&self) -> Option<BoxedLayer> {
        None
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

pub fn init() -> TelemetryGuard {
    let guard = TelemetryGuard::start();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let plain_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    let _ = tracing_subscriber::registry()
        .with(guard.export_layer())
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .try_init();

    guard
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::trace::SdkTracerProvider;

    const ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

    /// Tracer provider exporting over OTLP/HTTP, when an endpoint is configured.
    pub fn provider() -> Option<SdkTracerProvider> {
        std::env::var_os(ENDPOINT_ENV)?;
        let exporter = match opentelemetry_otlp::SpanExporter::builder().with_http().build() {
            Ok(exporter) => exporter,
            Err(e) => {
                eprintln!("warning: OTLP exporter disabled: {e}");
                return None;
            }
        };
        let resource = Resource::builder().with_service_name("witness").build();
        Some(
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(resource)
                .build(),
        )
    }
}
