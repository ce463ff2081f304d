//! [`EventPublisher`] over a `tokio::sync::broadcast` channel
//!
//! Subscribers that fall behind by more than the channel capacity lose the
//! oldest events and see `RecvError::Lagged`.

use partsource_core::audit::EventPublisher;
use partsource_domain::EngineEvent;
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fans engine events out to every live subscriber
#[derive(Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: EngineEvent) {
        let name = event.name();
        // No receivers is not an error
        match self.sender.send(event) {
            Ok(receivers) => trace!(event = name, receivers, "event published"),
            Err(_) => trace!(event = name, "event dropped, no subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use partsource_domain::SourcingStatus;
    use uuid::Uuid;

    use super::*;

    fn status_event() -> EngineEvent {
        EngineEvent::SourcingStatusChanged {
            request_id: Uuid::now_v7(),
            from: SourcingStatus::Pending,
            status: SourcingStatus::RequestingQuotes,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() {
        let publisher = BroadcastEventPublisher::default();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(status_event());

        assert_eq!(first.recv().await.unwrap().name(), "sourcing.status_changed");
        assert_eq!(second.recv().await.unwrap().name(), "sourcing.status_changed");
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let publisher = BroadcastEventPublisher::new(4);
        publisher.publish(status_event());
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
