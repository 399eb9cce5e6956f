use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::debug;


lazy_static! {
    pub static ref TABLET_OPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "snapshot_coordinator_tablet_ops_total",
            "Tablet RPCs dispatched by the coordinator"
        ),
        &["op"]
    )
    .expect("metric can not be created");

    pub static ref POLL_TOTAL: IntCounter = IntCounter::new(
        "snapshot_coordinator_poll_total",
        "Coordinator ticks run as leader"
    )
    .expect("metric can not be created");

    pub static ref POLL_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "snapshot_coordinator_poll_duration_ms",
            "Histogram of time spent preparing one tick in ms"
        )
        .buckets(exponential_buckets(0.1, 2.0, 12).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref REPLICATOR_WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "snapshot_coordinator_replicator_writes_total",
            "Replicated writes submitted without a waiting caller"
        ),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers the coordinator collectors with `registry`. Collectors already
/// registered there are skipped.
pub fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TABLET_OPS_TOTAL.clone()),
        Box::new(POLL_TOTAL.clone()),
        Box::new(POLL_DURATION_MS.clone()),
        Box::new(REPLICATOR_WRITES_TOTAL.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            debug!("skip metric registration: {}", e);
        }
    }
}

/// Gathers the private registry.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    register_metrics(&REGISTRY);
    REGISTRY.gather()
}
