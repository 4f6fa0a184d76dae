//! In-process state event bus

use curfew_api::{StateEvent, StateEventKind};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const BUS_CAPACITY: usize = 64;

/// Broadcast bus for [`StateEvent`]s. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StateEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish to every subscriber; returns how many received it
    pub fn publish(&self, event: StateEvent) -> usize {
        debug!(kind = ?event.kind(), "Publishing state event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kinds: None,
        }
    }

    /// Receive only events of the given kinds
    pub fn subscribe_to(&self, kinds: impl IntoIterator<Item = StateEventKind>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<StateEvent>,
    kinds: Option<HashSet<StateEventKind>>,
}

impl Subscription {
    fn wants(&self, event: &StateEvent) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()))
    }

    /// Next matching event; `None` once every bus handle is gone
    pub async fn recv(&mut self) -> Option<StateEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "State event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued
    pub fn try_recv(&mut self) -> Option<StateEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "State event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(StateEvent::ConfigChanged), 2);
        assert_eq!(a.recv().await, Some(StateEvent::ConfigChanged));
        assert_eq!(b.recv().await, Some(StateEvent::ConfigChanged));
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let bus = EventBus::new();
        let mut monitoring = bus.subscribe_to([StateEventKind::MonitoringChanged]);

        bus.publish(StateEvent::ConfigChanged);
        bus.publish(StateEvent::MonitoringChanged { active: true });

        assert_eq!(
            monitoring.recv().await,
            Some(StateEvent::MonitoringChanged { active: true })
        );
        assert_eq!(monitoring.try_recv(), None);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(StateEvent::ConfigChanged), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
