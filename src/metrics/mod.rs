//! Prometheus metrics for the chat client.
//!
//! - Connection metrics (attempts, state, scheduled reconnects, backoff delays)
//! - Frame metrics (received and sent by action, malformed frames)
//! - Dropped sends (text submitted while no socket was open)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, FrameMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Current connection state (0=disconnected, 1=connecting, 2=connected)
    pub static ref CONNECTION_STATE: IntGauge = register_int_gauge!(
        format!("{}_connection_state", METRIC_PREFIX),
        "Chat connection state (0=disconnected, 1=connecting, 2=connected)"
    ).unwrap();

    /// Total handshake attempts
    pub static ref CONNECTION_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connection_attempts_total", METRIC_PREFIX),
        "Total WebSocket handshake attempts"
    ).unwrap();

    /// Total reconnects scheduled by the backoff policy
    pub static ref RECONNECTS_SCHEDULED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnects_scheduled_total", METRIC_PREFIX),
        "Total reconnect attempts scheduled"
    ).unwrap();

    /// Times the reconnect ceiling was reached
    pub static ref RECONNECTS_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnects_exhausted_total", METRIC_PREFIX),
        "Total times reconnecting gave up after the attempt ceiling"
    ).unwrap();

    /// Backoff delay distribution
    pub static ref RECONNECT_DELAY: Histogram = register_histogram!(
        format!("{}_reconnect_delay_seconds", METRIC_PREFIX),
        "Reconnect backoff delay in seconds",
        vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 30.0, 60.0]
    ).unwrap();

    // ============================================================================
    // Frame Metrics
    // ============================================================================

    /// Inbound frames by action
    pub static ref FRAMES_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_received_total", METRIC_PREFIX),
        "Total frames received from the chat server",
        &["action"]
    ).unwrap();

    /// Outbound frames by action
    pub static ref FRAMES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_sent_total", METRIC_PREFIX),
        "Total frames written to the chat socket",
        &["action"]
    ).unwrap();

    /// Frames that could not be parsed
    pub static ref FRAMES_MALFORMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_malformed_total", METRIC_PREFIX),
        "Total inbound frames dropped as malformed or unknown"
    ).unwrap();

    /// Events not delivered because a subscriber queue was full
    pub static ref EVENTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Total events dropped for subscribers that stopped reading"
    ).unwrap();

    /// Sends dropped because no socket was open
    pub static ref SENDS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sends_dropped_total", METRIC_PREFIX),
        "Total outbound payloads dropped while disconnected"
    ).unwrap();
}
