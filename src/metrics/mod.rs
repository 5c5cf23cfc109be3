use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the ingestion path
#[derive(Clone)]
pub struct IngestMetrics {
    // Counters
    pub documents_added: Counter,
    pub documents_deleted: Counter,
    pub postings_ingested: Counter,
    pub groups_expired: Counter,
    pub add_failures: CounterVec,

    // Gauges
    pub live_documents: Gauge,
    pub used_capacity_bytes: Gauge,

    // Histograms
    pub add_latency: Histogram,
    pub postings_per_document: Histogram,
    pub group_size: Histogram,

    // Registry
    registry: Arc<Registry>,
}

impl IngestMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let documents_added = Counter::with_opts(Opts::new(
            "sluice_documents_added_total",
            "Total number of documents added",
        ))?;
        registry.register(Box::new(documents_added.clone()))?;

        let documents_deleted = Counter::with_opts(Opts::new(
            "sluice_documents_deleted_total",
            "Total number of documents deleted",
        ))?;
        registry.register(Box::new(documents_deleted.clone()))?;

        let postings_ingested = Counter::with_opts(Opts::new(
            "sluice_postings_ingested_total",
            "Total number of postings written to shards",
        ))?;
        registry.register(Box::new(postings_ingested.clone()))?;

        let groups_expired = Counter::with_opts(Opts::new(
            "sluice_groups_expired_total",
            "Total number of groups expired",
        ))?;
        registry.register(Box::new(groups_expired.clone()))?;

        let add_failures = CounterVec::new(
            Opts::new("sluice_add_failures_total", "Rejected adds by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(add_failures.clone()))?;

        // Gauges
        let live_documents = Gauge::with_opts(Opts::new(
            "sluice_live_documents",
            "Current number of live documents",
        ))?;
        registry.register(Box::new(live_documents.clone()))?;

        let used_capacity_bytes = Gauge::with_opts(Opts::new(
            "sluice_used_capacity_bytes",
            "Bytes reserved by shard slices",
        ))?;
        registry.register(Box::new(used_capacity_bytes.clone()))?;

        // Histograms
        let add_latency = Histogram::with_opts(
            HistogramOpts::new("sluice_add_latency_seconds", "Add operation latency")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(add_latency.clone()))?;

        let postings_per_document = Histogram::with_opts(
            HistogramOpts::new("sluice_postings_per_document", "Unique postings per document")
                .buckets(vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 20000.0]),
        )?;
        registry.register(Box::new(postings_per_document.clone()))?;

        let group_size = Histogram::with_opts(
            HistogramOpts::new("sluice_group_size", "Documents deleted per expired group")
                .buckets(vec![1.0, 10.0, 100.0, 1000.0, 10000.0, 100000.0]),
        )?;
        registry.register(Box::new(group_size.clone()))?;

        Ok(Self {
            documents_added,
            documents_deleted,
            postings_ingested,
            groups_expired,
            add_failures,
            live_documents,
            used_capacity_bytes,
            add_latency,
            postings_per_document,
            group_size,
            registry: Arc::new(registry),
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn record_add(&self, postings: usize, duration_secs: f64) {
        self.documents_added.inc();
        self.postings_ingested.inc_by(postings as f64);
        self.postings_per_document.observe(postings as f64);
        self.add_latency.observe(duration_secs);
    }

    /// Record a rejected add ("duplicate", "capacity", ...)
    pub fn record_add_failure(&self, reason: &str) {
        self.add_failures.with_label_values(&[reason]).inc();
    }

    pub fn record_delete(&self) {
        self.documents_deleted.inc();
    }

    pub fn record_group_expiry(&self, deleted: usize) {
        self.groups_expired.inc();
        self.group_size.observe(deleted as f64);
    }

    pub fn set_live_documents(&self, count: usize) {
        self.live_documents.set(count as f64);
    }

    pub fn set_used_capacity(&self, bytes: usize) {
        self.used_capacity_bytes.set(bytes as f64);
    }

    /// Render every metric in the Prometheus text format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
