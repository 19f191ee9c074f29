//! Prometheus metrics for supportlined.
//!
//! Exposed on the HTTP side-port at `/metrics`. Every recorder is a no-op
//! until [`init`] has run, so unit tests never need a registry.
//!
//! - `supportline_connections` / `supportline_queue_depth` /
//!   `supportline_active_rooms`: live in-memory state
//! - `supportline_matches_total{source}`: matches by where the counterpart
//!   was found (`directory` or `queue`)
//! - `supportline_event_duration_seconds{event}`: handler latency

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Gauges
// ========================================================================

/// Open WebSocket connections.
pub static CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Requests waiting in the match queue.
pub static QUEUE_DEPTH: OnceLock<IntGauge> = OnceLock::new();

/// Rooms with at least one member.
pub static ACTIVE_ROOMS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Counters
// ========================================================================

/// Matches committed, by counterpart source.
pub static MATCHES: OnceLock<IntCounterVec> = OnceLock::new();

/// Matches abandoned because the availability claim lost a race.
pub static MATCH_CONFLICTS: OnceLock<IntCounter> = OnceLock::new();

/// Chat payloads delivered to a recipient's queue.
pub static MESSAGES_RELAYED: OnceLock<IntCounter> = OnceLock::new();

/// Events handled, by event name.
pub static EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Handler failures, by event name and error code.
pub static EVENT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Handler latency, by event name.
pub static EVENT_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Notifications dropped because an outbound queue was full.
pub static OUTBOUND_DROPPED: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before metrics are scraped.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(
                            error = %e,
                            concat!("Failed to register metric ", stringify!($metric))
                        );
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        concat!("Failed to create metric ", stringify!($metric))
                    );
                }
            }
        };
    }

    register!(
        CONNECTIONS,
        IntGauge::new("supportline_connections", "Open WebSocket connections")
    );
    register!(
        QUEUE_DEPTH,
        IntGauge::new("supportline_queue_depth", "Requests waiting in the match queue")
    );
    register!(
        ACTIVE_ROOMS,
        IntGauge::new("supportline_active_rooms", "Rooms with at least one member")
    );

    register!(
        MATCHES,
        IntCounterVec::new(
            Opts::new("supportline_matches_total", "Matches committed by counterpart source"),
            &["source"]
        )
    );
    register!(
        MATCH_CONFLICTS,
        IntCounter::new(
            "supportline_match_conflicts_total",
            "Matches lost to a concurrent claim"
        )
    );
    register!(
        MESSAGES_RELAYED,
        IntCounter::new("supportline_messages_relayed_total", "Chat payloads relayed")
    );
    register!(
        EVENTS,
        IntCounterVec::new(
            Opts::new("supportline_events_total", "Client events handled by name"),
            &["event"]
        )
    );
    register!(
        EVENT_ERRORS,
        IntCounterVec::new(
            Opts::new(
                "supportline_event_errors_total",
                "Client event failures by name and code"
            ),
            &["event", "code"]
        )
    );
    register!(
        EVENT_LATENCY,
        HistogramVec::new(
            HistogramOpts::new(
                "supportline_event_duration_seconds",
                "Client event latency by name"
            )
            .buckets(vec![
                0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0
            ]),
            &["event"]
        )
    );
    register!(
        OUTBOUND_DROPPED,
        IntCounterVec::new(
            Opts::new(
                "supportline_outbound_dropped_total",
                "Notifications dropped on a full outbound queue"
            ),
            &["lane"]
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recorders
// ============================================================================

fn set_gauge(metric: &OnceLock<IntGauge>, value: usize) {
    if let Some(g) = metric.get() {
        g.set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn set_connections(n: usize) {
    set_gauge(&CONNECTIONS, n);
}

#[inline]
pub fn set_queue_depth(n: usize) {
    set_gauge(&QUEUE_DEPTH, n);
}

#[inline]
pub fn set_active_rooms(n: usize) {
    set_gauge(&ACTIVE_ROOMS, n);
}

/// Record a committed match.
#[inline]
pub fn record_match(source: &str) {
    if let Some(c) = MATCHES.get() {
        c.with_label_values(&[source]).inc();
    }
}

#[inline]
pub fn record_match_conflict() {
    if let Some(c) = MATCH_CONFLICTS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_relayed(recipients: usize) {
    if let Some(c) = MESSAGES_RELAYED.get() {
        c.inc_by(recipients as u64);
    }
}

/// Record an event execution with latency.
#[inline]
pub fn record_event(event: &str, duration_secs: f64) {
    if let Some(c) = EVENTS.get() {
        c.with_label_values(&[event]).inc();
    }
    if let Some(h) = EVENT_LATENCY.get() {
        h.with_label_values(&[event]).observe(duration_secs);
    }
}

/// Record a handler failure.
#[inline]
pub fn record_event_error(event: &str, code: &str) {
    if let Some(c) = EVENT_ERRORS.get() {
        c.with_label_values(&[event, code]).inc();
    }
}

/// Record a notification dropped on a full outbound queue.
#[inline]
pub fn record_outbound_dropped(lane: &str) {
    if let Some(c) = OUTBOUND_DROPPED.get() {
        c.with_label_values(&[lane]).inc();
    }
}
