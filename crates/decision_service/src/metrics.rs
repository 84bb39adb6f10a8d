use prometheus_client::{metrics::counter::Counter, registry::Registry};
use serde::Serialize;

/// Counters for the event pipeline. Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct PipelineMetrics {
    pub events_accepted: Counter,
    /// Rejected at ingestion: queue full, recorder flushed or unserializable.
    pub events_dropped: Counter,
    pub events_uploaded: Counter,
    pub batches_uploaded: Counter,
    /// Batches discarded after a failed delivery attempt.
    pub batches_failed: Counter,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_accepted: u64,
    pub events_dropped: u64,
    pub events_uploaded: u64,
    pub batches_uploaded: u64,
    pub batches_failed: u64,
}

impl PipelineMetrics {
    pub fn register(&self, registry: &mut Registry) {
        let registry = registry.sub_registry_with_prefix("decision_service");
        registry.register(
            "events_accepted",
            "Events accepted into the ingestion queue",
            self.events_accepted.clone(),
        );
        registry.register(
            "events_dropped",
            "Events rejected at ingestion",
            self.events_dropped.clone(),
        );
        registry.register(
            "events_uploaded",
            "Events delivered to the sink",
            self.events_uploaded.clone(),
        );
        registry.register(
            "batches_uploaded",
            "Batches delivered to the sink",
            self.batches_uploaded.clone(),
        );
        registry.register(
            "batches_failed",
            "Batches dropped after a failed upload",
            self.batches_failed.clone(),
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_accepted: self.events_accepted.get(),
            events_dropped: self.events_dropped.get(),
            events_uploaded: self.events_uploaded.get(),
            batches_uploaded: self.batches_uploaded.get(),
            batches_failed: self.batches_failed.get(),
        }
    }
}
