//! Metrics collection and reporting for pipeline runs.
//!
//! Hand a [`MetricsCollector`] to [`Runner::metrics`](crate::runner::Runner::metrics)
//! and every run publishes its counters into it:
//!
//! - `ingested`, `emitted`, `batches`
//! - `{step}.{counter}` for every stateful step, with the counters of
//!   [`StepStats`](crate::StepStats): `late_dropped`, `windows_opened`,
//!   `windows_closed`, `sessions_merged`, `pending_discarded`
//! - `execution_time_ms` in the JSON export
//!
//! Custom metrics implement [`Metric`] and are registered next to them.
//!
//! ```
//! use ironstream::metrics::{CounterMetric, MetricsCollector};
//! use serde_json::json;
//!
//! let mut metrics = MetricsCollector::new();
//! metrics.register(Box::new(CounterMetric::with_value("retries", 2)));
//! metrics.increment_counter("retries", 1);
//! assert_eq!(metrics.snapshot()["retries"], json!(3));
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Trait for custom metrics.
pub trait Metric: Send + Sync + Any {
    fn name(&self) -> &str;

    /// Current value as JSON.
    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Cast to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Thread-safe container for run metrics. Clones share the same storage.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

struct MetricsCollectorInner {
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsCollectorInner {
                metrics: HashMap::new(),
                start_time: None,
                end_time: None,
            })),
        }
    }

    // Metrics are plain values, so a panic while holding the lock leaves them usable.
    fn lock(&self) -> MutexGuard<'_, MetricsCollectorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a custom metric, replacing any metric of the same name.
    pub fn register(&mut self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    pub fn record_start(&self) {
        let mut inner = self.lock();
        inner.start_time = Some(Instant::now());
        inner.end_time = None;
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Time between the last `record_start` and `record_end`, if both happened.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to a counter, creating it if needed. A non-counter metric
    /// of the same name is replaced.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.lock();
        let current = inner
            .metrics
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<CounterMetric>())
            .map_or(0, CounterMetric::count);
        inner.metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, current + value)),
        );
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, value)),
        );
    }

    /// Current value of a counter.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock()
            .metrics
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<CounterMetric>())
            .map(CounterMetric::count)
    }

    /// All metrics as a JSON object of `{ name: { value, description? } }`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut metrics_json = serde_json::Map::new();

        for (name, metric) in &inner.metrics {
            let mut metric_obj = serde_json::Map::new();
            metric_obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                metric_obj.insert("description".to_string(), json!(desc));
            }
            metrics_json.insert(name.clone(), Value::Object(metric_obj));
        }

        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            let elapsed_ms = end.duration_since(start).as_millis();
            metrics_json.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": elapsed_ms,
                    "description": "Total run time in milliseconds",
                }),
            );
        }
        Value::Object(metrics_json)
    }

    /// Save [`to_json`](Self::to_json) to `path`, pretty-printed.
    ///
    /// # Errors
    /// If the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Names and values of all registered metrics.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// A monotonically published count.
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    #[must_use]
    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
