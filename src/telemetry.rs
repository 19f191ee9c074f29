//! Telemetry utilities for event timing and connection spans.

use std::time::Instant;

/// Guard for timing event handling and recording metrics.
///
/// Records event latency when dropped.
pub struct EventTimer {
    event: &'static str,
    start: Instant,
}

impl EventTimer {
    /// Start timing an event.
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            start: Instant::now(),
        }
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_event(self.event, duration);
    }
}
