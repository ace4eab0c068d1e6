use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("stylizer_requests_total", "Total number of personalization requests").unwrap();
    pub static ref ADMISSIONS_DENIED: Counter =
        register_counter!("stylizer_admissions_denied_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref JOB_OUTCOMES: CounterVec = register_counter_vec!(
        "stylizer_job_outcomes_total",
        "Finished generation jobs by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "stylizer_request_latency_seconds",
        "Personalization latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("stylizer_tracked_clients", "Identifiers currently held by the rate limiter").unwrap();
}
