//! Observability for the commit and GC core
//!
//! This module provides:
//! - Structured JSON logging with a severity floor
//! - Typed lifecycle events
//! - Monotonic counters for commits, waits and GC cycles
//!
//! Observability is read-only: nothing here alters commit or GC state.

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{GmuMetrics, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::info(event.as_str(), fields);
}

/// Log a lifecycle event at TRACE; used on hot commit paths
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(Severity::Trace, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::NodeStarted);
        log_event_with_fields(Event::GcMemberDeparted, &[("member", "node-2")]);
        trace_event(Event::EntryRepositioned, &[("gtx", "gtx:a:1")]);
    }
}
