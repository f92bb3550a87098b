//! Prometheus metrics for the dispatch pipeline.
//!
//! [`DispatchMetrics`] owns a dedicated [`Registry`] so several clients in
//! one process never collide, and can render it in the text exposition
//! format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

/// Prometheus metrics of the message pipeline and publication retries.
pub struct DispatchMetrics {
    /// Registry every metric below is registered in.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Messages handed to the dispatcher.
    pub messages_received: IntCounter,
    /// Messages applied to local state.
    pub messages_handled: IntCounter,
    /// Messages dropped for good.
    pub messages_rejected: IntCounter,
    /// Messages parked on a missing dependency.
    pub messages_parked: IntCounter,
    /// Messages already applied.
    pub messages_duplicate: IntCounter,
    /// Publication attempts after the first.
    pub publication_retries: IntCounter,
    /// Publications abandoned after the last attempt.
    pub publications_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Messages currently parked.
    pub pending: IntGauge,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_received = register_int_counter_with_registry!(
            Opts::new("lao_messages_received_total", "Messages submitted for dispatch"),
            registry
        )?;
        let messages_handled = register_int_counter_with_registry!(
            Opts::new("lao_messages_handled_total", "Messages applied to local state"),
            registry
        )?;
        let messages_rejected = register_int_counter_with_registry!(
            Opts::new("lao_messages_rejected_total", "Messages rejected by validation or handlers"),
            registry
        )?;
        let messages_parked = register_int_counter_with_registry!(
            Opts::new("lao_messages_parked_total", "Messages parked on a missing dependency"),
            registry
        )?;
        let messages_duplicate = register_int_counter_with_registry!(
            Opts::new("lao_messages_duplicate_total", "Messages that were already applied"),
            registry
        )?;
        let publication_retries = register_int_counter_with_registry!(
            Opts::new("lao_publication_retries_total", "Publication attempts after the first"),
            registry
        )?;
        let publications_failed = register_int_counter_with_registry!(
            Opts::new("lao_publications_failed_total", "Publications abandoned"),
            registry
        )?;
        let pending = register_int_gauge_with_registry!(
            Opts::new("lao_pending_messages", "Messages waiting for a dependency"),
            registry
        )?;

        Ok(Self {
            registry,
            messages_received,
            messages_handled,
            messages_rejected,
            messages_parked,
            messages_duplicate,
            publication_retries,
            publications_failed,
            pending,
        })
    }

    /// Text exposition of every metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let a = DispatchMetrics::new().unwrap();
        let b = DispatchMetrics::new().unwrap();
        a.messages_received.inc();
        assert_eq!(a.messages_received.get(), 1);
        assert_eq!(b.messages_received.get(), 0);
    }

    #[test]
    fn render_lists_counters() {
        let metrics = DispatchMetrics::new().unwrap();
        metrics.messages_parked.inc_by(3);
        metrics.pending.set(2);
        let text = metrics.render().unwrap();
        assert!(text.contains("lao_messages_parked_total 3"));
        assert!(text.contains("lao_pending_messages 2"));
    }
}
