//! Typed publish-subscribe fan-out of immutable lifecycle/threat events.
//!
//! Built directly on `tokio::sync::broadcast`, which already gives this
//! module everything the fan-out contract asks for: FIFO delivery per
//! subscriber, a bounded ring buffer per topic, and drop-oldest-on-overflow
//! behavior surfaced to each lagging subscriber as a
//! [`broadcast::error::RecvError::Lagged`]. A slow subscriber can never
//! block a publisher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{GeoPosition, TrackClassification, TrackState};

/// Default per-subscriber buffer depth before the oldest unread event for
/// that subscriber is dropped.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Immutable event payload. Carries copies, never references into the
/// track store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TrackCreated { track_id: String },
    TrackUpdated { track_id: String },
    TrackDropped { track_id: String },
    TrackClassificationChanged { track_id: String, classification: TrackClassification },
    TrackThreatLevelChanged { track_id: String, old_level: i32, new_level: i32 },
    TrackStateChanged { track_id: String, state: TrackState },
    ThreatAlertNew { alert_id: String, track_id: String },
    ThreatAlertAcknowledged { alert_id: String },
    SlewCameraRequest { camera_id: Option<String>, position: GeoPosition },
    AssessmentComplete,
}

/// Fan-out hub. Cloning a bus clones the sender handle; every clone
/// publishes to the same set of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    lagged_count: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, lagged_count: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0)) }
    }

    /// Subscribes a new sink. Delivery to this sink starts from this call
    /// forward; it does not see events published before it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event. A publish with zero subscribers is not an
    /// error -- it is simply dropped, matching `broadcast`'s semantics.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Count of subscriber-lag events observed via [`Self::record_lag`].
    /// The bus itself cannot detect lag (only a receiver discovers it on
    /// its next `recv`); callers that poll a receiver on the caller's
    /// behalf report it here so it is visible through metrics.
    pub fn lagged_count(&self) -> u64 {
        self.lagged_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn record_lag(&self, skipped: u64) {
        self.lagged_count.fetch_add(skipped, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event_fifo() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::TrackCreated { track_id: "TRK-0001".into() });
        bus.publish(Event::TrackUpdated { track_id: "TRK-0001".into() });

        match rx.recv().await.unwrap() {
            Event::TrackCreated { track_id } => assert_eq!(track_id, "TRK-0001"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Event::TrackUpdated { track_id } => assert_eq!(track_id, "TRK-0001"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_reports_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5u32 {
            bus.publish(Event::TrackUpdated { track_id: format!("TRK-{i:04}") });
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                bus.record_lag(skipped);
                assert!(skipped > 0);
            }
            other => panic!("expected Lagged, got {other:?}"),
        }
        assert!(bus.lagged_count() > 0);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(Event::AssessmentComplete);
    }
}
