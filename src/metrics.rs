//! Prometheus gauges/counters for the HLS core, scoped down from the
//! teacher's per-channel bandwidth/CPU gauges to the metrics this core
//! actually produces: active transcode jobs and cache occupancy/evictions.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder};

lazy_static! {
    pub static ref ACTIVE_JOBS: IntGauge = register_int_gauge!(
        "melodeon_active_transcode_jobs",
        "Number of transcoder subprocesses currently running"
    )
    .unwrap();
    pub static ref CACHE_ENTRIES: IntGauge = register_int_gauge!(
        "melodeon_cache_entries",
        "Number of cache keys currently tracked by CacheStore"
    )
    .unwrap();
    pub static ref CACHE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        "melodeon_cache_evictions_total",
        "Total number of cache entries evicted (capacity, TTL, or replacement)"
    )
    .unwrap();
}

pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
