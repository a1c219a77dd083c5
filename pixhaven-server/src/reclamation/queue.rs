//! Reclamation queue contract and in-memory transport.
//!
//! Delivery is at-least-once. A received message stays in flight until it is
//! acknowledged or handed back with [`QueueTransport::retry`]; one whose
//! visibility window lapses is redelivered. After `max_attempts` deliveries a
//! failing message is parked as a dead letter instead of being dropped.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pixhaven_core::QueueError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ReclamationTask;
use crate::constants::{DEFAULT_RECLAIM_MAX_ATTEMPTS, DEFAULT_RECLAIM_VISIBILITY_TIMEOUT_SECS};

/// Handle for one delivery of a message. Stale after ack, retry or redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt(pub Uuid);

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub task: ReclamationTask,
    /// 1 on first delivery.
    pub attempt: u32,
    pub receipt: Receipt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Back on the queue; the next delivery will be `attempt`.
    Requeued { attempt: u32 },
    /// Attempts exhausted; parked for inspection.
    DeadLettered { attempts: u32 },
    /// The receipt no longer names an in-flight delivery.
    Stale,
}

/// Queue transport consumed by the reclamation dispatcher and worker.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn enqueue(&self, task: &ReclamationTask) -> Result<(), QueueError>;

    /// Up to `max` messages that are ready now.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError>;

    /// Remove a handled message. Returns false for a stale receipt.
    async fn ack(&self, receipt: Receipt) -> Result<bool, QueueError>;

    /// Return a message for redelivery after `delay`.
    async fn retry(&self, receipt: Receipt, delay: Duration) -> Result<RetryOutcome, QueueError>;
}

// ============================================================================
// IN-MEMORY TRANSPORT
// ============================================================================

#[derive(Debug, Clone)]
struct Envelope {
    body: String,
    deliveries: u32,
    available_at: Instant,
}

#[derive(Debug)]
struct InFlight {
    envelope: Envelope,
    deadline: Instant,
}

/// A message that exhausted its attempts or could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub body: String,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    in_flight: HashMap<Receipt, InFlight>,
    dead: Vec<DeadLetter>,
    acked: u64,
    closed: bool,
}

/// In-process queue with visibility timeouts and a dead-letter list.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    max_attempts: u32,
    visibility_timeout: Duration,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_RECLAIM_MAX_ATTEMPTS)
    }
}

impl InMemoryQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_attempts: max_attempts.max(1),
            visibility_timeout: Duration::from_secs(DEFAULT_RECLAIM_VISIBILITY_TIMEOUT_SECS),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Refuse further enqueues. In-flight and ready messages remain.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Messages waiting for delivery, including delayed ones.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn acked_count(&self) -> u64 {
        self.state.lock().await.acked
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead.clone()
    }

    /// True when nothing is ready or in flight.
    pub async fn is_drained(&self) -> bool {
        let state = self.state.lock().await;
        state.ready.is_empty() && state.in_flight.is_empty()
    }

    fn park(state: &mut QueueState, envelope: Envelope, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            attempts = envelope.deliveries,
            reason = %reason,
            "Reclamation message dead-lettered"
        );
        state.dead.push(DeadLetter {
            body: envelope.body,
            attempts: envelope.deliveries,
            reason,
        });
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn enqueue(&self, task: &ReclamationTask) -> Result<(), QueueError> {
        let body = serde_json::to_string(task).map_err(|e| QueueError::Encoding {
            reason: e.to_string(),
        })?;

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.ready.push_back(Envelope {
            body,
            deliveries: 0,
            available_at: Instant::now(),
        });
        debug!(task_id = %task.task_id, blobs = task.blob_keys.len(), "Reclamation task enqueued");
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        // Lapsed visibility windows go back to the front.
        let expired: Vec<Receipt> = state
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.deadline <= now)
            .map(|(receipt, _)| *receipt)
            .collect();
        for receipt in expired {
            if let Some(flight) = state.in_flight.remove(&receipt) {
                debug!(attempts = flight.envelope.deliveries, "Visibility timeout lapsed");
                state.ready.push_front(flight.envelope);
            }
        }

        let mut deliveries = Vec::new();
        let mut deferred = VecDeque::new();
        while deliveries.len() < max {
            let Some(mut envelope) = state.ready.pop_front() else {
                break;
            };
            if envelope.available_at > now {
                deferred.push_back(envelope);
                continue;
            }
            if envelope.deliveries >= self.max_attempts {
                Self::park(&mut state, envelope, "visibility timeout after final attempt");
                continue;
            }
            let task: ReclamationTask = match serde_json::from_str(&envelope.body) {
                Ok(task) => task,
                Err(e) => {
                    Self::park(&mut state, envelope, format!("undecodable: {}", e));
                    continue;
                }
            };

            envelope.deliveries += 1;
            let receipt = Receipt(Uuid::now_v7());
            deliveries.push(Delivery {
                task,
                attempt: envelope.deliveries,
                receipt,
            });
            state.in_flight.insert(
                receipt,
                InFlight {
                    envelope,
                    deadline: now + self.visibility_timeout,
                },
            );
        }
        // Delayed messages keep their place ahead of anything not yet scanned.
        while let Some(envelope) = deferred.pop_back() {
            state.ready.push_front(envelope);
        }

        Ok(deliveries)
    }

    async fn ack(&self, receipt: Receipt) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&receipt).is_some() {
            state.acked += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn retry(&self, receipt: Receipt, delay: Duration) -> Result<RetryOutcome, QueueError> {
        let mut state = self.state.lock().await;
        let Some(flight) = state.in_flight.remove(&receipt) else {
            return Ok(RetryOutcome::Stale);
        };

        let mut envelope = flight.envelope;
        if envelope.deliveries >= self.max_attempts {
            let attempts = envelope.deliveries;
            Self::park(&mut state, envelope, "max attempts exhausted");
            return Ok(RetryOutcome::DeadLettered { attempts });
        }

        envelope.available_at = Instant::now() + delay;
        let attempt = envelope.deliveries + 1;
        state.ready.push_back(envelope);
        Ok(RetryOutcome::Requeued { attempt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixhaven_core::{new_image_id, ImageFormat, ImagePaths, ImageRef, Orientation};

    fn task() -> ReclamationTask {
        let id = new_image_id();
        ReclamationTask::single(&ImageRef {
            id,
            paths: ImagePaths::generate(id, Orientation::Portrait, ImageFormat::Png),
        })
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let queue = InMemoryQueue::new(3);
        let task = task();
        queue.enqueue(&task).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].task, task);
        assert_eq!(batch[0].attempt, 1);

        assert!(queue.ack(batch[0].receipt).await.unwrap());
        assert!(queue.is_drained().await);
        assert_eq!(queue.acked_count().await, 1);

        // Acking twice is a stale receipt, not an error.
        assert!(!queue.ack(batch[0].receipt).await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_redelivers_with_next_attempt() {
        let queue = InMemoryQueue::new(3);
        queue.enqueue(&task()).await.unwrap();

        let first = queue.receive(1).await.unwrap().remove(0);
        let outcome = queue.retry(first.receipt, Duration::ZERO).await.unwrap();
        assert_eq!(outcome, RetryOutcome::Requeued { attempt: 2 });

        let second = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.task, first.task);
        assert_ne!(second.receipt, first.receipt);
    }

    #[tokio::test]
    async fn test_exhausted_message_is_parked_not_dropped() {
        let queue = InMemoryQueue::new(2);
        queue.enqueue(&task()).await.unwrap();

        let d1 = queue.receive(1).await.unwrap().remove(0);
        queue.retry(d1.receipt, Duration::ZERO).await.unwrap();
        let d2 = queue.receive(1).await.unwrap().remove(0);
        let outcome = queue.retry(d2.receipt, Duration::ZERO).await.unwrap();

        assert_eq!(outcome, RetryOutcome::DeadLettered { attempts: 2 });
        assert!(queue.is_drained().await);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_delayed_retry_is_not_ready_yet() {
        let queue = InMemoryQueue::new(3);
        queue.enqueue(&task()).await.unwrap();
        let d1 = queue.receive(1).await.unwrap().remove(0);
        queue.retry(d1.receipt, Duration::from_secs(3600)).await.unwrap();

        assert!(queue.receive(10).await.unwrap().is_empty());
        assert_eq!(queue.ready_len().await, 1);
    }

    #[tokio::test]
    async fn test_lapsed_visibility_redelivers() {
        let queue = InMemoryQueue::new(3).with_visibility_timeout(Duration::ZERO);
        queue.enqueue(&task()).await.unwrap();

        let d1 = queue.receive(1).await.unwrap().remove(0);
        // Never acked: the next receive sees it again.
        let d2 = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(d2.attempt, 2);
        assert_eq!(d2.task, d1.task);
        assert!(!queue.ack(d1.receipt).await.unwrap());
        assert!(queue.ack(d2.receipt).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_enqueue() {
        let queue = InMemoryQueue::default();
        queue.close().await;
        assert_eq!(queue.enqueue(&task()).await, Err(QueueError::Closed));
    }
}
