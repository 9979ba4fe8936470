//! Multi-queue event dispatcher
//!
//! Owns the bus subscriptions of one service and enacts the delivery policy:
//! manual ack, no in-broker retries, failed messages dead-lettered to
//! `{serviceName}.dlq` with failure metadata headers. A separate operator
//! tool may re-drive the DLQ.

use crate::{BusError, BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Error type returned by event handlers. Any error short-circuits to the
/// dispatcher, which dead-letters the message and nacks it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Processes a single message body.
///
/// Return `Ok(())` to ack; return an error to send the message to the DLQ
/// and nack without requeue.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError>;
}

struct Subscription {
    routing_key: String,
    handler: Arc<dyn EventHandler>,
}

/// Manages one service's queue subscriptions with registered handlers.
///
/// Each registered routing key gets the service-owned queue
/// `{serviceName}.{routingKey}`. Subscriptions run in their own tasks:
/// within one queue messages process sequentially in arrival order, across
/// queues processing is parallel.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{BusMessage, Dispatcher, EventHandler, HandlerError, InMemoryBus};
/// use async_trait::async_trait;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// struct LogHandler;
///
/// #[async_trait]
/// impl EventHandler for LogHandler {
///     async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError> {
///         println!("got {} bytes", msg.payload.len());
///         Ok(())
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = Arc::new(InMemoryBus::new());
/// let mut dispatcher = Dispatcher::new(bus, "order-service");
/// dispatcher.register("cart.checkedout.v1", Arc::new(LogHandler));
///
/// let shutdown = CancellationToken::new();
/// let handle = dispatcher.start(shutdown.clone()).await?;
///
/// // ... later
/// shutdown.cancel();
/// handle.join().await;
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher {
    bus: Arc<dyn EventBus>,
    service_name: String,
    subscriptions: Vec<Subscription>,
    dlq_timeout: Duration,
}

/// Handle over the running consumer tasks, used to await graceful shutdown.
pub struct DispatcherHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Wait for every consumer loop to finish. In-flight handlers complete
    /// and their ack/nack lands before the loops return.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "consumer task panicked");
            }
        }
    }
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn EventBus>, service_name: impl Into<String>) -> Self {
        Self {
            bus,
            service_name: service_name.into(),
            subscriptions: Vec::new(),
            dlq_timeout: Duration::from_secs(3),
        }
    }

    /// Associate a routing key with a handler. Must be called before
    /// [`Dispatcher::start`].
    pub fn register(&mut self, routing_key: &str, handler: Arc<dyn EventHandler>) {
        self.subscriptions.push(Subscription {
            routing_key: routing_key.to_string(),
            handler,
        });
    }

    /// Open every subscription and spawn one consumer task per queue.
    ///
    /// Fails fast: if any subscription cannot be opened nothing is spawned.
    /// Cancelling `shutdown` stops all loops; the handle joins them.
    pub async fn start(self, shutdown: CancellationToken) -> BusResult<DispatcherHandle> {
        let mut streams = Vec::with_capacity(self.subscriptions.len());

        for sub in &self.subscriptions {
            let queue = service_queue(&self.service_name, &sub.routing_key);
            let stream = self.bus.consume(&queue, &sub.routing_key).await?;
            tracing::info!(queue = %queue, "started consumer");
            streams.push((queue, stream));
        }

        let mut tasks = Vec::with_capacity(streams.len());
        for (sub, (queue, stream)) in self.subscriptions.into_iter().zip(streams) {
            tasks.push(tokio::spawn(consume_loop(
                self.bus.clone(),
                self.service_name.clone(),
                queue,
                stream,
                sub.handler,
                shutdown.clone(),
                self.dlq_timeout,
            )));
        }

        Ok(DispatcherHandle { tasks })
    }
}

/// Queue owned by `service` for `routing_key`; this is the durable
/// subscription that isolates per-consumer delivery state.
pub(crate) fn service_queue(service: &str, routing_key: &str) -> String {
    format!("{}.{}", service, routing_key)
}

async fn consume_loop(
    bus: Arc<dyn EventBus>,
    service_name: String,
    queue: String,
    mut stream: BoxStream<'static, crate::Delivery>,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
    dlq_timeout: Duration,
) {
    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe = stream.next() => match maybe {
                Some(delivery) => delivery,
                None => {
                    tracing::warn!(queue = %queue, "subscription closed");
                    break;
                }
            },
        };

        let span = tracing::info_span!(
            "process_event",
            queue = %queue,
            subject = %delivery.message.subject,
        );

        async {
            let body = delivery.message.clone();
            match handler.handle(delivery.message.clone()).await {
                Ok(()) => delivery.ack().await,
                Err(err) => {
                    tracing::error!(error = %err, "handler error, dead-lettering message");

                    if let Err(dlq_err) =
                        dead_letter(&bus, &service_name, &queue, &body, &err, dlq_timeout).await
                    {
                        // The message is still nacked; at-least-once is
                        // preserved at the producer's next emission.
                        tracing::error!(error = %dlq_err, "failed to publish to DLQ");
                    }

                    delivery.nack().await;
                }
            }
        }
        .instrument(span)
        .await;
    }

    tracing::info!(queue = %queue, "stopped consumer");
}

/// Publish a failed message body to the service's dead-letter queue with
/// failure metadata headers, bounded by `dlq_timeout`.
async fn dead_letter(
    bus: &Arc<dyn EventBus>,
    service_name: &str,
    original_queue: &str,
    body: &BusMessage,
    handler_err: &HandlerError,
    dlq_timeout: Duration,
) -> BusResult<()> {
    let mut headers = HashMap::new();
    headers.insert("x-original-queue".to_string(), original_queue.to_string());
    headers.insert("x-error".to_string(), handler_err.to_string());
    headers.insert(
        "x-failed-at".to_string(),
        chrono::Utc::now().to_rfc3339(),
    );

    let dlq = format!("{}.dlq", service_name);
    let msg = BusMessage::new(dlq, body.payload.clone()).with_headers(headers);

    tokio::time::timeout(dlq_timeout, bus.publish_message(msg))
        .await
        .map_err(|_| BusError::PublishError("DLQ publish timed out".to_string()))?
}
