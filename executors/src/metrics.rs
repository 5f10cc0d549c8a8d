use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
};
use std::sync::{Arc, PoisonError, RwLock};

/// Which lock flavour an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Resource,
    Queued,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Resource => "resource",
            LockKind::Queued => "queued",
        }
    }
}

/// Prometheus collectors for rescues, ledger ingestion and locks
pub struct ExecutorMetrics {
    pub rescue_sent_to_mined_duration: HistogramVec,
    pub ingestion_scan_duration: HistogramVec,
    pub lock_contention_total: IntCounterVec,
    pub stale_lock_releases_total: IntCounterVec,
}

impl ExecutorMetrics {
    /// Create new executor metrics with the provided registry
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let rescue_sent_to_mined_duration = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "rescue_relayer_rescue_sent_to_mined_duration_seconds",
                "Time from broadcasting a rescue transaction to its receipt"
            )
            .buckets(vec![
                0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0
            ]),
            &["chain_id", "status"],
            registry
        )?;

        let ingestion_scan_duration = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "rescue_relayer_ingestion_scan_duration_seconds",
                "Time taken to scan one chain from its checkpoint to the head"
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["chain_id"],
            registry
        )?;

        let lock_contention_total = register_int_counter_vec_with_registry!(
            Opts::new(
                "rescue_relayer_lock_contention_total",
                "Acquisitions that found the lock already held"
            ),
            &["lock"],
            registry
        )?;

        let stale_lock_releases_total = register_int_counter_vec_with_registry!(
            Opts::new(
                "rescue_relayer_stale_lock_releases_total",
                "Locks force-released after exceeding their stale timeout"
            ),
            &["lock"],
            registry
        )?;

        Ok(ExecutorMetrics {
            rescue_sent_to_mined_duration,
            ingestion_scan_duration,
            lock_contention_total,
            stale_lock_releases_total,
        })
    }
}

lazy_static! {
    /// Default metrics registry for executors (fallback if no external registry provided)
    static ref DEFAULT_EXECUTOR_METRICS_REGISTRY: Registry = Registry::new();

    static ref DEFAULT_EXECUTOR_METRICS: Arc<ExecutorMetrics> = Arc::new(
        ExecutorMetrics::new(&DEFAULT_EXECUTOR_METRICS_REGISTRY)
            .expect("Failed to create default executor metrics"),
    );

    /// Set by the binary crate at startup; unset means the default registry is used
    static ref EXECUTOR_METRICS_INSTANCE: RwLock<Option<Arc<ExecutorMetrics>>> =
        RwLock::new(None);
}

/// Route executor metrics to a custom registry.
/// Call once at startup, before any work is dispatched.
pub fn initialize_metrics(metrics: ExecutorMetrics) {
    let mut instance = EXECUTOR_METRICS_INSTANCE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *instance = Some(Arc::new(metrics));
}

pub(crate) fn get_metrics() -> Arc<ExecutorMetrics> {
    let instance = EXECUTOR_METRICS_INSTANCE
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    match instance.as_ref() {
        Some(metrics) => metrics.clone(),
        None => DEFAULT_EXECUTOR_METRICS.clone(),
    }
}

/// Encode every metric family in `registry` in the Prometheus text format
pub fn encode_metrics(registry: &Registry) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Export metrics in Prometheus format from the default registry
pub fn export_default_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    encode_metrics(&DEFAULT_EXECUTOR_METRICS_REGISTRY)
}

pub fn record_rescue_sent_to_mined(chain_id: u64, status: &str, duration_seconds: f64) {
    get_metrics()
        .rescue_sent_to_mined_duration
        .with_label_values(&[chain_id.to_string().as_str(), status])
        .observe(duration_seconds);
}

pub fn record_ingestion_scan(chain_id: u64, duration_seconds: f64) {
    get_metrics()
        .ingestion_scan_duration
        .with_label_values(&[&chain_id.to_string()])
        .observe(duration_seconds);
}

pub fn record_lock_contention(kind: LockKind) {
    get_metrics()
        .lock_contention_total
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn record_stale_lock_release(kind: LockKind) {
    get_metrics()
        .stale_lock_releases_total
        .with_label_values(&[kind.as_str()])
        .inc();
}
