//! Observability for inventory-sync
//!
//! Tracing subscriber setup, optional OTLP export, and the sync engine's
//! metric instruments.

use crate::config::{LoggingConfig, OtelConfig};
use crate::models::{ResourceKind, SyncOutcome};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Tracer and meter providers, exporting over OTLP when enabled
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = match (config.enabled, &config.endpoint) {
            (true, Some(endpoint)) => (
                Some(Self::init_tracer_provider(endpoint, &resource)?),
                Self::init_meter_provider(endpoint, &resource)?,
            ),
            (true, None) => {
                return Err(OtelError::Config(
                    "OTLP endpoint is required when enabled".into(),
                ))
            }
            // Meter provider without readers: instruments record into nothing
            (false, _) => (
                None,
                SdkMeterProvider::builder().with_resource(resource).build(),
            ),
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(
                Config::default()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(resource.clone()),
            )
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if OTLP export is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush spans and shut the meter provider down
    pub fn shutdown(&self) -> Result<(), OtelError> {
        self.meter_provider
            .shutdown()
            .map_err(|e| OtelError::Shutdown(format!("Meter shutdown failed: {:?}", e)))?;

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                result.map_err(|e| OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)))?;
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Sync engine metric instruments
#[derive(Clone)]
pub struct SyncMetrics {
    /// Requests answered from the freshness cache
    pub cache_hits_total: Counter<u64>,

    /// Requests that missed the freshness cache
    pub cache_misses_total: Counter<u64>,

    /// Collect-and-store cycles, by outcome
    pub collections_total: Counter<u64>,

    /// Region fetches that failed after retries
    pub region_failures_total: Counter<u64>,

    /// Requests answered from the persisted snapshot after a failed collection
    pub stale_fallbacks_total: Counter<u64>,

    /// Collection duration in seconds
    pub collection_duration: Histogram<f64>,
}

impl SyncMetrics {
    /// Create the instruments on the given meter
    pub fn new(meter: &Meter) -> Self {
        Self {
            cache_hits_total: meter
                .u64_counter("inventory_sync_cache_hits_total")
                .with_description("Requests answered from the freshness cache")
                .init(),
            cache_misses_total: meter
                .u64_counter("inventory_sync_cache_misses_total")
                .with_description("Requests that missed the freshness cache")
                .init(),
            collections_total: meter
                .u64_counter("inventory_sync_collections_total")
                .with_description("Collect-and-store cycles by outcome")
                .init(),
            region_failures_total: meter
                .u64_counter("inventory_sync_region_failures_total")
                .with_description("Region fetches that failed after retries")
                .init(),
            stale_fallbacks_total: meter
                .u64_counter("inventory_sync_stale_fallbacks_total")
                .with_description("Requests served from the persisted snapshot")
                .init(),
            collection_duration: meter
                .f64_histogram("inventory_sync_collection_duration_seconds")
                .with_description("Collection duration in seconds")
                .init(),
        }
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self, kind: ResourceKind) {
        self.cache_hits_total.add(1, &[kind_attr(kind)]);
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self, kind: ResourceKind) {
        self.cache_misses_total.add(1, &[kind_attr(kind)]);
    }

    /// Record a finished collection
    pub fn record_collection(
        &self,
        kind: ResourceKind,
        outcome: SyncOutcome,
        failed_regions: usize,
        duration_secs: f64,
    ) {
        self.collections_total.add(
            1,
            &[kind_attr(kind), KeyValue::new("outcome", outcome.to_string())],
        );
        if failed_regions > 0 {
            self.region_failures_total
                .add(failed_regions as u64, &[kind_attr(kind)]);
        }
        self.collection_duration
            .record(duration_secs, &[kind_attr(kind)]);
    }

    /// Record a stale fallback
    pub fn record_stale_fallback(&self, kind: ResourceKind) {
        self.stale_fallbacks_total.add(1, &[kind_attr(kind)]);
    }
}

fn kind_attr(kind: ResourceKind) -> KeyValue {
    KeyValue::new("kind", kind.as_str())
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the configured level. The format is `json` or
/// `pretty`; anything else falls back to json.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match logging.format.to_lowercase().as_str() {
        "pretty" => tracing_subscriber::fmt::layer().pretty().boxed(),
        _ => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("inventory-sync")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
