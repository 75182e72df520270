//! In-process queue event bus.
//!
//! The queue emits events via [`EventBus::emit`]; the console and tests
//! subscribe via [`EventBus::subscribe`]. Built on [`tokio::sync::broadcast`]
//! so multiple listeners can react independently.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::queue::job::TaskStatus;

/// Events that flow out of the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A batch was accepted.
    JobSubmitted { job_id: Uuid, total: usize },
    /// One task reached a terminal status.
    TaskFinished {
        job_id: Uuid,
        index: usize,
        status: TaskStatus,
    },
    /// Every task of the job has a result.
    JobCompleted {
        job_id: Uuid,
        completed: usize,
        failed: usize,
    },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();

        bus.emit(Event::JobSubmitted { job_id, total: 3 });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event::JobSubmitted { job_id, total: 3 });
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let job_id = Uuid::new_v4();

        bus.emit(Event::JobCompleted {
            job_id,
            completed: 2,
            failed: 0,
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
        assert!(matches!(e1, Event::JobCompleted { completed: 2, .. }));
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        let count = bus.emit(Event::JobSubmitted {
            job_id: Uuid::nil(),
            total: 1,
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn emit_with_subscriber_returns_count() {
        let bus = EventBus::default();
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();

        let count = bus.emit(Event::TaskFinished {
            job_id: Uuid::nil(),
            index: 0,
            status: TaskStatus::Completed,
        });
        assert_eq!(count, 2);
    }
}
