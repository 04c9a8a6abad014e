//! Prometheus metrics for the live topics

use actix_web::HttpResponse;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

lazy_static::lazy_static! {
    /// Open WebSocket connections by topic kind
    static ref WS_CONNECTIONS_ACTIVE: IntGaugeVec = register_int_gauge_vec!(
        "video_live_ws_connections_active",
        "Open WebSocket connections by topic kind",
        &["kind"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref WS_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "video_live_ws_events_total",
        "Inbound WebSocket events by topic kind and outcome",
        &["kind", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref BROADCAST_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "video_live_broadcast_delivered_total",
        "Messages delivered to subscribers by topic kind",
        &["kind"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub fn connection_opened(kind: &str) {
    WS_CONNECTIONS_ACTIVE.with_label_values(&[kind]).inc();
}

pub fn connection_closed(kind: &str) {
    WS_CONNECTIONS_ACTIVE.with_label_values(&[kind]).dec();
}

pub fn record_event(kind: &str, outcome: &str) {
    WS_EVENTS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_delivered(kind: &str, delivered: usize) {
    BROADCAST_DELIVERED_TOTAL
        .with_label_values(&[kind])
        .inc_by(delivered as u64);
}

/// `GET /metrics`
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
