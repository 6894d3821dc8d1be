/**
 * Event Bus
 *
 * DESIGN DECISION: `tokio::sync::broadcast` fanned out from a single bus,
 * with a `Subscription` handle that decrements an outstanding-subscriber
 * count on `Drop`
 * WHY: a subscription-handle idiom without the websocket/actix machinery a
 * connection-keyed broadcaster would otherwise need — `broadcast` gives
 * every subscriber its own receiver and lagging readers simply miss old
 * events instead of blocking the publisher.
 *
 * REASONING CHAIN:
 * 1. Every public façade operation that completes publishes one event
 *    carrying a monotonic sequence number, so subscribers can detect gaps
 *    after a `RecvError::Lagged`.
 * 2. A `Subscription` is just the receiver half plus an id; dropping it is
 *    enough to unsubscribe, `tokio::sync::broadcast` handles the rest.
 * 3. The bus itself never blocks on a slow subscriber — broadcast channels
 *    drop the oldest buffered message instead.
 *
 * PATTERN: Pattern-001 (Planning Core), built on a subscriber/broadcast
 * intent, expressed with tokio's channel instead of a hand-rolled
 * connection table.
 */

use crate::model::TaskId;
use crate::monitor::EventKind;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// One event published through the bus, each carrying the bus's monotonic
/// sequence number.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    AnalysisComplete {
        sequence: u64,
        task_count: usize,
        circular_chain_count: usize,
    },
    PlanComplete {
        sequence: u64,
        group_count: usize,
        estimated_duration_ms: u64,
    },
    OptimizationComplete {
        sequence: u64,
        recommendation_count: usize,
    },
    ResourceConstraintWarning {
        sequence: u64,
        task_id: TaskId,
        resource: String,
    },
    DependencyUpdated {
        sequence: u64,
        task_id: TaskId,
    },
    TaskEventRecorded {
        sequence: u64,
        task_id: TaskId,
        kind: EventKind,
    },
}

/// A live subscription to the bus. Dropping it unsubscribes; no explicit
/// `unsubscribe` call is required.
pub struct Subscription {
    id: uuid::Uuid,
    receiver: broadcast::Receiver<EngineEvent>,
    outstanding: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Awaits the next event, or `None` once the bus itself has been
    /// dropped. A lagged receiver silently resynchronizes to the oldest
    /// event still buffered, per broadcast-channel semantics; callers that
    /// need gap detection should compare consecutive sequence numbers.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Publishes façade lifecycle events to any number of subscribers.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    sequence: AtomicU64,
    outstanding: Arc<AtomicUsize>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            sequence: AtomicU64::new(0),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Next monotonic sequence number, for callers constructing an event.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Publishes an event. Returns the number of live subscribers it
    /// reached (zero if nobody is listening — not an error, per broadcast
    /// channel semantics).
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.sender.send(event).map(|n| n).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Subscription {
            id: uuid::Uuid::new_v4(),
            receiver: self.sender.subscribe(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(EngineEvent::OptimizationComplete {
            sequence: bus.next_sequence(),
            recommendation_count: 3,
        });
        let event = sub.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::OptimizationComplete { recommendation_count: 3, .. }));
    }

    #[tokio::test]
    async fn dropping_subscription_decrements_outstanding_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let bus = EventBus::new();
        let a = bus.next_sequence();
        let b = bus.next_sequence();
        assert!(b > a);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        let reached = bus.publish(EngineEvent::DependencyUpdated {
            sequence: bus.next_sequence(),
            task_id: TaskId::new("T-1"),
        });
        assert_eq!(reached, 0);
    }
}
