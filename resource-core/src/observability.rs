/*!
Observability for resource entities.

- Structured logging setup via `tracing-subscriber`
- Prometheus counters and histograms for saves (feature `metrics`)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::{Duration, Instant};
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry as TracingRegistry};

use crate::{ResourceError, Result};

/// Filter applied when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "resource_core=info";

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<ResourceMetrics> = OnceLock::new();

/// Metrics collection for entity saves
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct ResourceMetrics {
    pub saves_total: Counter,
    pub save_errors_total: Counter,
    pub readonly_skips_total: Counter,
    pub autosaves_total: Counter,
    pub save_latency_seconds: Histogram,
    pub resource_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl ResourceMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<Counter> {
            let counter = Counter::new(name, help).map_err(|e| {
                ResourceError::Observability(format!("Failed to create {name} metric: {e}"))
            })?;
            registry.register(Box::new(counter.clone())).map_err(|e| {
                ResourceError::Observability(format!("Failed to register {name}: {e}"))
            })?;
            Ok(counter)
        };

        let saves_total = counter(
            "resource_saves_total",
            "Total resource files written",
        )?;
        let save_errors_total = counter(
            "resource_save_errors_total",
            "Total failed resource saves",
        )?;
        let readonly_skips_total = counter(
            "resource_readonly_skips_total",
            "Total saves skipped because the entity is readonly",
        )?;
        let autosaves_total = counter(
            "resource_autosaves_total",
            "Total writes triggered by autosave on flush or drop",
        )?;

        let histogram = |name: &str, help: &str| -> Result<Histogram> {
            let histogram = Histogram::with_opts(HistogramOpts::new(name, help)).map_err(|e| {
                ResourceError::Observability(format!("Failed to create {name} metric: {e}"))
            })?;
            registry.register(Box::new(histogram.clone())).map_err(|e| {
                ResourceError::Observability(format!("Failed to register {name}: {e}"))
            })?;
            Ok(histogram)
        };

        let save_latency_seconds = histogram(
            "resource_save_latency_seconds",
            "Duration of resource saves in seconds",
        )?;
        let resource_size_bytes = histogram(
            "resource_size_bytes",
            "Size of written resource files in bytes",
        )?;

        Ok(Self {
            saves_total,
            save_errors_total,
            readonly_skips_total,
            autosaves_total,
            save_latency_seconds,
            resource_size_bytes,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static ResourceMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize resource metrics"))
    }

    /// Record a completed write
    pub fn record_save(&self, duration: Duration, size_bytes: usize) {
        self.saves_total.inc();
        self.save_latency_seconds.observe(duration.as_secs_f64());
        self.resource_size_bytes.observe(size_bytes as f64);
    }

    pub fn record_save_error(&self) {
        self.save_errors_total.inc();
    }

    pub fn record_readonly_skip(&self) {
        self.readonly_skips_total.inc();
    }

    pub fn record_autosave(&self) {
        self.autosaves_total.inc();
    }

    /// Gather metrics in Prometheus format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            ResourceError::Observability(format!("Failed to encode metrics: {e}"))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            ResourceError::Observability(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Timer for a single save
#[cfg(feature = "metrics")]
pub struct SaveTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl SaveTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn finish(self, size_bytes: usize) {
        ResourceMetrics::global().record_save(self.start.elapsed(), size_bytes);
    }

    pub fn finish_with_error(self) {
        ResourceMetrics::global().record_save_error();
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over [`DEFAULT_LOG_FILTER`]. With `json`
/// set, events are emitted as one JSON object per line.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    ResourceMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false)
    });
    let text_layer = (!json).then(|| fmt::layer().with_target(false));

    let subscriber = TracingRegistry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer);

    set_global_default(subscriber).map_err(|e| {
        ResourceError::Observability(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Resource observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}
