//! In-memory implementation of the EventBus trait for testing and development

use crate::{AckHandle, BusError, BusMessage, BusResult, Delivery, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// EventBus implementation using in-memory channels
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Integration tests that need fast, isolated message buses
///
/// It models a topic exchange: each call to [`EventBus::consume`] registers a
/// named queue bound to a subject pattern, and every published message is
/// copied once into each queue whose binding matches. Two subscriptions on
/// different queue names both receive the message; per queue, deliveries
/// arrive in publish order through a bounded channel.
///
/// Ack/nack outcomes are recorded per queue so tests can assert the delivery
/// policy of the dispatcher.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Bind a queue before publishing
/// let mut stream = bus.consume("order-service.cart.checkedout.v1", "cart.checkedout.v1").await?;
///
/// bus.publish("cart.checkedout.v1", b"hello".to_vec()).await?;
///
/// let delivery = stream.next().await.unwrap();
/// assert_eq!(delivery.message.subject, "cart.checkedout.v1");
/// delivery.ack().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    queues: Arc<Mutex<HashMap<String, QueueBinding>>>,
    acks: Arc<Mutex<Vec<AckRecord>>>,
    buffer_size: usize,
}

struct QueueBinding {
    pattern: String,
    sender: mpsc::Sender<BusMessage>,
}

/// Outcome recorded for a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Ack,
    Nack,
}

/// Ledger entry written when a delivery is acked or nacked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRecord {
    pub queue: String,
    pub subject: String,
    pub outcome: AckOutcome,
}

impl InMemoryBus {
    /// Create a new in-memory event bus with a per-queue buffer of 1024
    /// messages. Publishing awaits when a queue is full (backpressure).
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new in-memory event bus with a custom per-queue buffer size
    pub fn with_capacity(buffer_size: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            acks: Arc::new(Mutex::new(Vec::new())),
            buffer_size,
        }
    }

    /// Snapshot of all ack/nack outcomes recorded so far
    pub fn ack_records(&self) -> Vec<AckRecord> {
        self.acks.lock().expect("ack ledger poisoned").clone()
    }

    /// Check if a subject matches a subscription pattern
    ///
    /// Supports topic wildcards:
    /// - `*` matches exactly one token
    /// - `>` matches one or more tokens
    ///
    /// # Examples
    /// - `order.>` matches `order.created.v1`
    /// - `order.*.v1` matches `order.created.v1`
    /// - `order.*` does NOT match `order.created.v1` (too many tokens)
    fn matches_pattern(subject: &str, pattern: &str) -> bool {
        let subject_tokens: Vec<&str> = subject.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        let mut s_idx = 0;
        let mut p_idx = 0;

        while s_idx < subject_tokens.len() && p_idx < pattern_tokens.len() {
            let pattern_token = pattern_tokens[p_idx];

            if pattern_token == ">" {
                // `>` matches all remaining tokens
                return true;
            } else if pattern_token == "*" || subject_tokens[s_idx] == pattern_token {
                s_idx += 1;
                p_idx += 1;
            } else {
                return false;
            }
        }

        // Both must be exhausted for a full match (unless pattern ended with `>`)
        s_idx == subject_tokens.len() && p_idx == pattern_tokens.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryAck {
    ledger: Arc<Mutex<Vec<AckRecord>>>,
    queue: String,
    subject: String,
}

impl InMemoryAck {
    fn record(&self, outcome: AckOutcome) {
        self.ledger
            .lock()
            .expect("ack ledger poisoned")
            .push(AckRecord {
                queue: self.queue.clone(),
                subject: self.subject.clone(),
                outcome,
            });
    }
}

#[async_trait]
impl AckHandle for InMemoryAck {
    async fn ack(&self) {
        self.record(AckOutcome::Ack);
    }

    async fn nack(&self) {
        self.record(AckOutcome::Nack);
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish_message(&self, msg: BusMessage) -> BusResult<()> {
        // Collect matching senders first so the lock is not held across await
        let targets: Vec<(String, mpsc::Sender<BusMessage>)> = {
            let queues = self.queues.lock().expect("queue registry poisoned");
            queues
                .iter()
                .filter(|(_, binding)| Self::matches_pattern(&msg.subject, &binding.pattern))
                .map(|(name, binding)| (name.clone(), binding.sender.clone()))
                .collect()
        };

        for (queue, sender) in targets {
            if sender.send(msg.clone()).await.is_err() {
                tracing::warn!(queue = %queue, subject = %msg.subject, "queue consumer gone, dropping message");
            }
        }

        Ok(())
    }

    async fn consume(&self, queue: &str, subject: &str) -> BusResult<BoxStream<'static, Delivery>> {
        let (sender, mut receiver) = mpsc::channel(self.buffer_size);

        {
            let mut queues = self.queues.lock().expect("queue registry poisoned");
            if queues.contains_key(queue) {
                return Err(BusError::SubscribeError(format!(
                    "queue {} already has a consumer",
                    queue
                )));
            }
            queues.insert(
                queue.to_string(),
                QueueBinding {
                    pattern: subject.to_string(),
                    sender,
                },
            );
        }

        let ledger = self.acks.clone();
        let queue_name = queue.to_string();

        let stream = async_stream::stream! {
            while let Some(msg) = receiver.recv().await {
                let acker = InMemoryAck {
                    ledger: ledger.clone(),
                    queue: queue_name.clone(),
                    subject: msg.subject.clone(),
                };
                yield Delivery::new(msg, Box::new(acker));
            }
        };

        Ok(stream.boxed())
    }
}
