//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::ConnectionState;

use super::{
    CONNECTION_ATTEMPTS_TOTAL, CONNECTION_STATE, EVENTS_DROPPED_TOTAL, FRAMES_MALFORMED_TOTAL, FRAMES_RECEIVED_TOTAL,
    FRAMES_SENT_TOTAL, RECONNECTS_EXHAUSTED_TOTAL, RECONNECTS_SCHEDULED_TOTAL, RECONNECT_DELAY,
    SENDS_DROPPED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    /// Record the state the connection moved to
    pub fn record_state(state: ConnectionState) {
        CONNECTION_STATE.set(state as i64);
    }

    /// Record a handshake attempt
    pub fn record_attempt() {
        CONNECTION_ATTEMPTS_TOTAL.inc();
    }

    /// Record a scheduled reconnect and its delay
    pub fn record_reconnect_scheduled(delay: Duration) {
        RECONNECTS_SCHEDULED_TOTAL.inc();
        RECONNECT_DELAY.observe(delay.as_secs_f64());
    }

    /// Record giving up after the attempt ceiling
    pub fn record_exhausted() {
        RECONNECTS_EXHAUSTED_TOTAL.inc();
    }

    /// Record an event a subscriber missed because its queue was full
    pub fn record_event_dropped() {
        EVENTS_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for recording frame metrics
pub struct FrameMetrics;

impl FrameMetrics {
    pub fn record_received(action: &str) {
        FRAMES_RECEIVED_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn record_sent(action: &str) {
        FRAMES_SENT_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn record_malformed() {
        FRAMES_MALFORMED_TOTAL.inc();
    }

    pub fn record_send_dropped() {
        SENDS_DROPPED_TOTAL.inc();
    }
}
