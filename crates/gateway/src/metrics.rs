use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static DISCLOSURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static PERMISSION_PAIRS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn counter_vec(
    cell: &'static OnceLock<IntCounterVec>,
    name: &str,
    help: &str,
    labels: &[&str],
) -> &'static IntCounterVec {
    cell.get_or_init(|| {
        register_collector(
            IntCounterVec::new(Opts::new(name, help), labels)
                .expect(name),
        )
    })
}

fn http_requests_total() -> &'static IntCounterVec {
    counter_vec(
        &HTTP_REQUESTS_TOTAL,
        "apptshare_gateway_http_requests_total",
        "Gateway HTTP request count.",
        &["route", "method", "status"],
    )
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "apptshare_gateway_http_request_duration_seconds",
                    "Gateway HTTP request duration in seconds.",
                )
                .buckets(vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
                &["route", "method", "outcome"],
            )
            .expect("create apptshare_gateway_http_request_duration_seconds"),
        )
    })
}

fn disclosures_total() -> &'static IntCounterVec {
    counter_vec(
        &DISCLOSURES_TOTAL,
        "apptshare_gateway_disclosures_total",
        "Appointment projections served, by disclosure scope.",
        &["scope"],
    )
}

fn permission_pairs_total() -> &'static IntCounterVec {
    counter_vec(
        &PERMISSION_PAIRS_TOTAL,
        "apptshare_gateway_permission_pairs_total",
        "Presented id/token pairs, by verification outcome.",
        &["outcome"],
    )
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_disclosure(scope: &str) {
    disclosures_total().with_label_values(&[scope]).inc();
}

pub fn observe_permission_pairs(accepted: usize, rejected: usize) {
    let counter = permission_pairs_total();
    counter
        .with_label_values(&["accepted"])
        .inc_by(accepted as u64);
    counter
        .with_label_values(&["rejected"])
        .inc_by(rejected as u64);
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = disclosures_total();
    let _ = permission_pairs_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
