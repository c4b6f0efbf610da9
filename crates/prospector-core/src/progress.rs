//! Progress channel between the orchestrator and whatever renders progress.
//!
//! Delivery is best-effort: a missing listener, a lagging listener, or a sink
//! that panics never affects the job that produced the event. Events are not
//! retried, and consumers should key them by `job_id`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ExtractedFields, ResultRecord};

/// One notification per completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub job_id: String,
    pub processed_count: usize,
    pub total: usize,
    pub success: bool,
    pub status: String,
    pub record: ResultRecord,
    pub error_detail: Option<String>,
    /// Raw extraction result, present when the surface reached `Ready`.
    pub fields: Option<ExtractedFields>,
}

/// Sink for progress events. `publish` must not block.
pub trait ProgressSink: Send + Sync + 'static {
    fn publish(&self, event: &ProgressEvent);
}

/// Publish through `sink`, containing any panic raised by it.
pub(crate) fn publish_quietly<P: ProgressSink + ?Sized>(sink: &P, event: &ProgressEvent) {
    if catch_unwind(AssertUnwindSafe(|| sink.publish(event))).is_err() {
        tracing::warn!(job_id = %event.job_id, "Progress sink panicked; event dropped");
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _event: &ProgressEvent) {}
}

/// Fans events out to any number of tokio broadcast subscribers.
///
/// Publishing with no subscribers is a silent no-op; slow subscribers see
/// `RecvError::Lagged` rather than blocking the run.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    /// Create a sink with default capacity (256 events).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BroadcastSink {
    fn publish(&self, event: &ProgressEvent) {
        // No receivers is not an error for a best-effort channel.
        let _ = self.tx.send(event.clone());
    }
}

/// Adapts a closure into a sink.
#[derive(Clone)]
pub struct FnSink {
    f: Arc<dyn Fn(&ProgressEvent) + Send + Sync>,
}

impl FnSink {
    pub fn new(f: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl ProgressSink for FnSink {
    fn publish(&self, event: &ProgressEvent) {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn event(job_id: &str, processed: usize) -> ProgressEvent {
        ProgressEvent {
            run_id: Uuid::nil(),
            job_id: job_id.to_string(),
            processed_count: processed,
            total: 2,
            success: true,
            status: "Found".to_string(),
            record: ResultRecord::default(),
            error_detail: None,
            fields: None,
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastSink::new();
        assert_eq!(sink.receiver_count(), 0);
        sink.publish(&event("0", 1));
    }

    #[tokio::test]
    async fn broadcast_delivers_in_order() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();

        sink.publish(&event("0", 1));
        sink.publish(&event("1", 2));

        assert_eq!(rx.recv().await.unwrap().job_id, "0");
        assert_eq!(rx.recv().await.unwrap().processed_count, 2);
    }

    #[test]
    fn panicking_sink_is_contained() {
        let sink = FnSink::new(|_| panic!("listener went away"));
        publish_quietly(&sink, &event("0", 1));
    }

    #[test]
    fn fn_sink_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = FnSink::new(move |e| seen_clone.lock().unwrap().push(e.job_id.clone()));

        publish_quietly(&sink, &event("7", 1));

        assert_eq!(*seen.lock().unwrap(), vec!["7".to_string()]);
    }
}
