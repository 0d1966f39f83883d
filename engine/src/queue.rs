//! Job queue and idempotency seams
//!
//! The durable queue and the idempotency table are external services;
//! these traits are their interface. The in-memory implementations back
//! local serving and the test suite with the same semantics:
//! at-least-once delivery, per-repository message grouping (single
//! writer per repository), and dead-lettering after max attempts.

use crate::types::IngestJob;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("enqueue failed: {0}")]
    Enqueue(String),

    #[error("queue backend error: {0}")]
    Backend(String),
}

/// A delivered message awaiting ack/nack
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub job: IngestJob,
    /// Delivery attempt, 1-based
    pub attempt: u32,
}

/// Durable at-least-once job queue
pub trait JobQueue: Send + Sync {
    /// Enqueue a job; returns the message id
    fn enqueue(&self, job: &IngestJob) -> Result<String, QueueError>;

    /// Pop the next deliverable message. Messages of a repository with
    /// an in-flight delivery are held back (message-group ordering).
    fn receive(&self) -> Result<Option<QueueMessage>, QueueError>;

    /// Delete a successfully processed message
    fn ack(&self, message_id: &str) -> Result<(), QueueError>;

    /// Return a failed message for redelivery; moves to the dead-letter
    /// destination once attempts are exhausted
    fn nack(&self, message_id: &str) -> Result<(), QueueError>;
}

/// Conditional-write idempotency table
pub trait IdempotencyStore: Send + Sync {
    /// Insert the key unless it exists and has not expired. Returns
    /// false when the key was already present (duplicate).
    fn insert_once(&self, key: &str, ttl: Duration) -> Result<bool, QueueError>;
}

// ---------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    dead: Vec<QueueMessage>,
    next_id: u64,
}

/// In-process queue with SQS-like semantics
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
    max_attempts: u32,
}

impl MemoryQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self { state: Mutex::new(MemoryQueueState::default()), max_attempts: max_attempts.max(1) }
    }

    /// Messages currently waiting for delivery
    pub fn depth(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Dead-lettered jobs
    pub fn dead_letters(&self) -> Vec<IngestJob> {
        self.state.lock().dead.iter().map(|m| m.job.clone()).collect()
    }
}

impl JobQueue for MemoryQueue {
    fn enqueue(&self, job: &IngestJob) -> Result<String, QueueError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("msg-{}", state.next_id);
        state.ready.push_back(QueueMessage { id: id.clone(), job: job.clone(), attempt: 0 });
        Ok(id)
    }

    fn receive(&self) -> Result<Option<QueueMessage>, QueueError> {
        let mut state = self.state.lock();
        let busy: HashSet<String> =
            state.in_flight.values().map(|m| m.job.repository.clone()).collect();

        let position = state.ready.iter().position(|m| !busy.contains(&m.job.repository));
        let Some(message) = position.and_then(|p| state.ready.remove(p)) else {
            return Ok(None);
        };

        let mut message = message;
        message.attempt += 1;
        state.in_flight.insert(message.id.clone(), message.clone());
        Ok(Some(message))
    }

    fn ack(&self, message_id: &str) -> Result<(), QueueError> {
        self.state.lock().in_flight.remove(message_id);
        Ok(())
    }

    fn nack(&self, message_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let Some(message) = state.in_flight.remove(message_id) else {
            return Ok(());
        };
        if message.attempt >= self.max_attempts {
            log::warn!(
                "job for {} moved to dead-letter after {} attempts",
                message.job.repository,
                message.attempt
            );
            state.dead.push(message);
        } else {
            state.ready.push_back(message);
        }
        Ok(())
    }
}

/// In-process idempotency table with TTL expiry
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for MemoryIdempotencyStore {
    fn insert_once(&self, key: &str, ttl: Duration) -> Result<bool, QueueError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, expiry| *expiry > now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_owned(), now + ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(repo: &str) -> IngestJob {
        IngestJob {
            repository: repo.to_owned(),
            commit_sha: "abc".to_owned(),
            pusher: "dev".to_owned(),
            namespace: repo.rsplit('/').next().unwrap_or(repo).to_owned(),
        }
    }

    #[test]
    fn test_enqueue_receive_ack() {
        let queue = MemoryQueue::new(3);
        queue.enqueue(&job("o/a")).unwrap();

        let message = queue.receive().unwrap().unwrap();
        assert_eq!(message.job.repository, "o/a");
        assert_eq!(message.attempt, 1);
        queue.ack(&message.id).unwrap();
        assert!(queue.receive().unwrap().is_none());
    }

    #[test]
    fn test_repository_message_group() {
        let queue = MemoryQueue::new(3);
        queue.enqueue(&job("o/a")).unwrap();
        queue.enqueue(&job("o/a")).unwrap();
        queue.enqueue(&job("o/b")).unwrap();

        let first = queue.receive().unwrap().unwrap();
        assert_eq!(first.job.repository, "o/a");
        // Second o/a message is held back while the first is in flight
        let second = queue.receive().unwrap().unwrap();
        assert_eq!(second.job.repository, "o/b");
        assert!(queue.receive().unwrap().is_none());

        queue.ack(&first.id).unwrap();
        let third = queue.receive().unwrap().unwrap();
        assert_eq!(third.job.repository, "o/a");
    }

    #[test]
    fn test_nack_redelivers_then_dead_letters() {
        let queue = MemoryQueue::new(2);
        queue.enqueue(&job("o/a")).unwrap();

        let m1 = queue.receive().unwrap().unwrap();
        queue.nack(&m1.id).unwrap();
        let m2 = queue.receive().unwrap().unwrap();
        assert_eq!(m2.attempt, 2);
        queue.nack(&m2.id).unwrap();

        assert!(queue.receive().unwrap().is_none());
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[test]
    fn test_idempotency_conditional_insert() {
        let store = MemoryIdempotencyStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.insert_once("delivery-1", ttl).unwrap());
        assert!(!store.insert_once("delivery-1", ttl).unwrap());
        assert!(store.insert_once("delivery-2", ttl).unwrap());
    }

    #[test]
    fn test_idempotency_ttl_expiry() {
        let store = MemoryIdempotencyStore::new();
        assert!(store.insert_once("k", Duration::from_millis(10)).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.insert_once("k", Duration::from_secs(60)).unwrap());
    }
}
