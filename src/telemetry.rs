//! Structured logging and optional OpenTelemetry export.
//!
//! Carried over from the teacher almost unchanged: OTLP export is enabled
//! only when `OTEL_EXPORTER_OTLP_*` environment variables are present,
//! otherwise we fall back to local `tracing_subscriber::fmt` logging. The
//! `log.format`/`log.console.enabled`/`log.file.*` configuration knobs pick
//! between compact and JSON formatting and an optional rotating file layer.

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
use serde::{Deserialize, Serialize};
use std::env;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogConfig, LogFormat};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TelemetryProtocol {
    #[serde(rename = "http/protobuf")]
    HTTP,
    #[serde(rename = "grpc")]
    GRPC,
}

impl TelemetryProtocol {
    fn from_env() -> Option<Self> {
        let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
        if !is_enabled {
            return None;
        }
        let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
            Ok(s) if s == "grpc" => TelemetryProtocol::GRPC,
            _ => TelemetryProtocol::HTTP,
        };
        Some(protocol)
    }
}

fn resource() -> Resource {
    let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
    Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .with_schema_url(
            [
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_meter_provider(protocol: &TelemetryProtocol) -> SdkMeterProvider {
    let exporter = opentelemetry_otlp::MetricExporter::builder();
    let exporter = match protocol {
        TelemetryProtocol::HTTP => exporter
            .with_http()
            .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
            .build(),
        TelemetryProtocol::GRPC => exporter
            .with_tonic()
            .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
            .build(),
    };
    let exporter = exporter.expect("failed to build OTLP metric exporter");
    let reader = PeriodicReader::builder(exporter)
        .with_interval(std::time::Duration::from_secs(30))
        .build();
    let meter_provider = MeterProviderBuilder::default()
        .with_resource(resource())
        .with_reader(reader)
        .build();
    global::set_meter_provider(meter_provider.clone());
    meter_provider
}

fn init_tracer_provider(protocol: &TelemetryProtocol) -> SdkTracerProvider {
    let exporter = opentelemetry_otlp::SpanExporter::builder();
    let exporter = match protocol {
        TelemetryProtocol::HTTP => exporter.with_http().build(),
        TelemetryProtocol::GRPC => exporter.with_tonic().build(),
    };
    let exporter = exporter.expect("failed to build OTLP span exporter");
    SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            1.0,
        ))))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build()
}

/// Wrapper for telemetry providers, for graceful shutdown.
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    /// Kept alive for the process lifetime; dropping it stops file writes.
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl Telemetry {
    /// Initializes telemetry from the given log configuration and, if
    /// present, `OTEL_*` environment variables.
    pub fn init(log_config: &LogConfig) -> Self {
        let console_layer = if log_config.console_enabled {
            Some(build_console_layer(log_config.format))
        } else {
            None
        };

        let (file_layer, file_guard) = match &log_config.file {
            Some(file_config) if file_config.enabled => {
                let appender = tracing_appender::rolling::never(
                    std::path::Path::new(&file_config.name)
                        .parent()
                        .unwrap_or_else(|| std::path::Path::new(".")),
                    std::path::Path::new(&file_config.name)
                        .file_name()
                        .unwrap_or_default(),
                );
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .json()
                    .boxed();
                (Some(layer), Some(guard))
            }
            _ => (None, None),
        };

        let telemetry_protocol = TelemetryProtocol::from_env();
        match telemetry_protocol {
            Some(protocol) => {
                let tracer_provider = init_tracer_provider(&protocol);
                let meter_provider = init_meter_provider(&protocol);
                let tracer = tracer_provider.tracer("transfer-validator-node");
                tracing_subscriber::registry()
                    .with(tracing_subscriber::filter::LevelFilter::INFO)
                    .with(console_layer)
                    .with(file_layer)
                    .with(MetricsLayer::new(meter_provider.clone()))
                    .with(OpenTelemetryLayer::new(tracer))
                    .init();
                tracing::info!("OpenTelemetry exporter enabled via {:?}", protocol);
                Telemetry {
                    tracer_provider: Some(tracer_provider),
                    meter_provider: Some(meter_provider),
                    _file_guard: file_guard,
                }
            }
            None => {
                tracing_subscriber::registry()
                    .with(tracing_subscriber::EnvFilter::from_default_env())
                    .with(console_layer)
                    .with(file_layer)
                    .init();
                tracing::info!("OpenTelemetry is not enabled");
                Telemetry {
                    tracer_provider: None,
                    meter_provider: None,
                    _file_guard: file_guard,
                }
            }
        }
    }
}

fn build_console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Human => tracing_subscriber::fmt::layer().boxed(),
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref()
            && let Err(err) = tracer_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
        if let Some(meter_provider) = self.meter_provider.as_ref()
            && let Err(err) = meter_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
    }
}
