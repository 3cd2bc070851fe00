// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Topic-addressed Pub/Sub
//
// Every subscription owns a bounded queue and a dispatcher task. Publishing
// enqueues the envelope on each subscriber of the exact topic, in
// registration order, and returns without waiting for handlers. Each
// envelope is handled in its own task, capped per subscription. A full queue
// drops the envelope for that subscription only; publishers never wait.
//
// In-memory only: nothing is persisted or replayed, delivery is at most once.

use futures::FutureExt;
use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, trace, warn};

use crate::domain::events::{Envelope, EnvelopeError, Message, Topic};
use crate::domain::node_config::BusConfig;

/// Receives envelopes for one subscription.
///
/// Errors and panics are caught at the dispatch boundary and logged; they
/// never reach the publisher or other subscribers.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Name used in dispatch failure logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()>;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Envelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        (self.f)(envelope).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct SubscriberSlot {
    id: SubscriptionId,
    sender: mpsc::Sender<Arc<Envelope>>,
}

struct BusInner {
    subscribers: RwLock<HashMap<Topic, Vec<SubscriberSlot>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    max_in_flight: usize,
}

/// Event bus for publishing and subscribing to topic-addressed envelopes
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose subscriptions buffer `queue_capacity` envelopes
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_config(&BusConfig {
            queue_capacity,
            ..BusConfig::default()
        })
    }

    /// Create event bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::with_config(&BusConfig::default())
    }

    pub fn with_config(config: &BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: config.queue_capacity.max(1),
                max_in_flight: config.max_in_flight.max(1),
            }),
        }
    }

    /// Register `handler` on `topic` and start its dispatcher.
    ///
    /// Must be called from within a Tokio runtime. Registering the same
    /// handler twice yields two independent subscriptions.
    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.queue_capacity);

        debug!(topic = %topic, subscription = %id, handler = handler.name(), "Subscribed");
        tokio::spawn(dispatch_loop(
            id,
            topic.clone(),
            handler,
            receiver,
            self.inner.max_in_flight,
        ));

        self.inner
            .subscribers
            .write()
            .entry(topic.clone())
            .or_default()
            .push(SubscriberSlot { id, sender });

        Subscription {
            id,
            topic,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe an async closure
    pub fn subscribe_fn<F, Fut>(&self, topic: Topic, name: impl Into<String>, f: F) -> Subscription
    where
        F: Fn(Arc<Envelope>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe(topic, Arc::new(FnHandler::new(name, f)))
    }

    /// Publish a payload to every subscriber of `topic`.
    ///
    /// Never waits: the envelope is offered to every subscriber queue and
    /// dropped for any subscription whose queue is full.
    pub async fn publish(
        &self,
        topic: Topic,
        payload: Message,
        source_id: impl Into<String>,
    ) -> Result<(), BusError> {
        let envelope = Envelope::new(topic, payload, source_id)?;
        self.deliver(Arc::new(envelope));
        Ok(())
    }

    /// Publish raw JSON arriving from a transport boundary.
    pub async fn publish_json(
        &self,
        topic: &str,
        payload: Value,
        source_id: impl Into<String>,
    ) -> Result<(), BusError> {
        let topic: Topic = topic.parse()?;
        let message = Message::decode(&topic, payload)?;
        self.publish(topic, message, source_id).await
    }

    fn deliver(&self, envelope: Arc<Envelope>) {
        let senders: Vec<(SubscriptionId, mpsc::Sender<Arc<Envelope>>)> = {
            let subscribers = self.inner.subscribers.read();
            subscribers
                .get(&envelope.topic)
                .map(|slots| slots.iter().map(|s| (s.id, s.sender.clone())).collect())
                .unwrap_or_default()
        };

        counter!("orion_bus_messages_published_total", "topic" => envelope.topic.to_string())
            .increment(1);

        if senders.is_empty() {
            debug!(topic = %envelope.topic, "No subscribers for topic");
            return;
        }

        trace!(topic = %envelope.topic, envelope_id = %envelope.id, subscribers = senders.len(), "Publishing envelope");
        for (id, sender) in senders {
            match sender.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        topic = %envelope.topic,
                        subscription = %id,
                        envelope_id = %envelope.id,
                        "Subscriber queue full, dropping envelope"
                    );
                    counter!("orion_bus_envelopes_dropped_total", "topic" => envelope.topic.to_string())
                        .increment(1);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(topic = %envelope.topic, subscription = %id, "Subscription closed during publish");
                }
            }
        }
    }

    /// Get the number of active subscriptions on a topic
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .subscribers
            .read()
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle to one registration. Dropping it leaves the subscription active.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Remove the registration. Envelopes already queued are still handled.
    ///
    /// Returns false if the bus is gone or the subscription was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut subscribers = inner.subscribers.write();
        let Some(slots) = subscribers.get_mut(&self.topic) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|slot| slot.id != self.id);
        let removed = slots.len() < before;
        if slots.is_empty() {
            subscribers.remove(&self.topic);
        }
        if removed {
            debug!(topic = %self.topic, subscription = %self.id, "Unsubscribed");
        }
        removed
    }
}

impl fmt::Debug for BusInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusInner")
            .field("queue_capacity", &self.queue_capacity)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

async fn dispatch_loop(
    id: SubscriptionId,
    topic: Topic,
    handler: Arc<dyn EventHandler>,
    mut receiver: mpsc::Receiver<Arc<Envelope>>,
    max_in_flight: usize,
) {
    let limiter = Arc::new(Semaphore::new(max_in_flight));

    while let Some(envelope) = receiver.recv().await {
        let Ok(permit) = limiter.clone().acquire_owned().await else {
            break;
        };
        let handler = handler.clone();
        let topic = topic.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let envelope_id = envelope.id;
            let failure = match AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => DispatchError::Handler(e),
                Err(panic) => DispatchError::Panicked(panic_message(panic.as_ref())),
            };
            error!(
                topic = %topic,
                subscription = %id,
                handler = handler.name(),
                envelope_id = %envelope_id,
                "Event handler failed: {}",
                failure
            );
            counter!("orion_bus_dispatch_failures_total", "topic" => topic.to_string()).increment(1);
        });
    }

    debug!(topic = %topic, subscription = %id, "Dispatcher stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Failure of a single handler invocation. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error("handler returned error: {0:#}")]
    Handler(anyhow::Error),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Errors returned to publishers
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("Payload {kind} is not accepted on topic '{topic}'")]
    PayloadMismatch { topic: String, kind: &'static str },

    #[error("Invalid payload for topic '{topic}': {source}")]
    InvalidPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<EnvelopeError> for BusError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::UnknownTopic(topic) => BusError::UnknownTopic(topic),
            EnvelopeError::PayloadMismatch { topic, kind } => BusError::PayloadMismatch { topic, kind },
            EnvelopeError::InvalidPayload { topic, source } => BusError::InvalidPayload { topic, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::events::{AgentLog, LogLevel, SYSTEM_SOURCE};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn log_message(text: &str) -> Message {
        Message::AgentLog(AgentLog {
            agent_id: AgentId::new("Director").unwrap(),
            level: LogLevel::Info,
            message: text.to_string(),
        })
    }

    fn collector(bus: &EventBus, topic: Topic, name: &str) -> (Subscription, mpsc::UnboundedReceiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = bus.subscribe_fn(topic, name, move |envelope| {
            let tx = tx.clone();
            async move {
                tx.send(envelope)?;
                Ok::<(), anyhow::Error>(())
            }
        });
        (sub, rx)
    }

    fn fail() -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    fn explode() -> anyhow::Result<()> {
        panic!("handler exploded")
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Arc<Envelope>>) -> Arc<Envelope> {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for envelope")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.publish(Topic::AgentLog, log_message("hello"), SYSTEM_SOURCE)
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count(&Topic::AgentLog), 0);
    }

    #[tokio::test]
    async fn test_exact_topic_delivery() {
        let bus = EventBus::new(4);
        let (_sub, mut rx) = collector(&bus, Topic::AgentLog, "log-sink");
        let (_other, mut other_rx) = collector(&bus, Topic::TaskResult, "result-sink");

        bus.publish(Topic::AgentLog, log_message("hello"), "Director")
            .await
            .unwrap();

        let envelope = next(&mut rx).await;
        assert_eq!(envelope.topic, Topic::AgentLog);
        assert_eq!(envelope.source_id, "Director");
        assert!(timeout(Duration::from_millis(50), other_rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_others() {
        let bus = EventBus::new(4);
        bus.subscribe_fn(Topic::AgentLog, "always-fails", |_| async { fail() });
        bus.subscribe_fn(Topic::AgentLog, "always-panics", |_| async { explode() });
        let (_sub, mut rx) = collector(&bus, Topic::AgentLog, "log-sink");

        for i in 0..3 {
            bus.publish(Topic::AgentLog, log_message(&format!("m{i}")), SYSTEM_SOURCE)
                .await
                .unwrap();
        }
        for _ in 0..3 {
            next(&mut rx).await;
        }
    }

    #[tokio::test]
    async fn test_duplicate_subscriptions_each_receive() {
        let bus = EventBus::new(4);
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
        for name in ["first", "second"] {
            let tx = tx.clone();
            bus.subscribe_fn(Topic::AgentLog, name, move |_| {
                let tx = tx.clone();
                async move {
                    tx.send(name)?;
                    Ok::<(), anyhow::Error>(())
                }
            });
        }
        assert_eq!(bus.subscriber_count(&Topic::AgentLog), 2);

        bus.publish(Topic::AgentLog, log_message("x"), SYSTEM_SOURCE)
            .await
            .unwrap();

        let mut seen = vec![
            timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap(),
            timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap(),
        ];
        seen.sort();
        assert_eq!(seen, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new(4);
        let (sub, mut rx) = collector(&bus, Topic::AgentLog, "log-sink");
        assert!(sub.unsubscribe());
        assert_eq!(bus.subscriber_count(&Topic::AgentLog), 0);

        bus.publish(Topic::AgentLog, log_message("late"), SYSTEM_SOURCE)
            .await
            .unwrap();
        // Sender side is gone, so the channel closes without a message.
        assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payload_topic_mismatch_is_rejected() {
        let bus = EventBus::new(4);
        let err = bus
            .publish(Topic::TaskResult, log_message("wrong"), SYSTEM_SOURCE)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::PayloadMismatch { .. }));
    }

    #[tokio::test]
    async fn test_publish_json_boundary() {
        let bus = EventBus::new(4);
        let (_sub, mut rx) = collector(&bus, Topic::AgentLog, "log-sink");

        bus.publish_json(
            "agent.log",
            json!({"agent_id": "GPTASe", "level": "SUCCESS", "message": "Completed 'x'."}),
            "GPTASe",
        )
        .await
        .unwrap();
        match &next(&mut rx).await.payload {
            Message::AgentLog(log) => assert_eq!(log.level, LogLevel::Success),
            other => panic!("unexpected payload {other:?}"),
        }

        let err = bus
            .publish_json("agent.unknown", json!({}), SYSTEM_SOURCE)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownTopic(_)));

        let err = bus
            .publish_json("agent.log", json!({"level": "LOUD"}), SYSTEM_SOURCE)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_stall_publisher() {
        let bus = EventBus::new(16);
        bus.subscribe_fn(Topic::AgentLog, "sleepy", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), anyhow::Error>(())
        });

        let publish_all = async {
            for i in 0..8 {
                bus.publish(Topic::AgentLog, log_message(&format!("m{i}")), SYSTEM_SOURCE)
                    .await
                    .unwrap();
            }
        };
        timeout(Duration::from_secs(1), publish_all)
            .await
            .expect("publish waited on handler completion");
    }

    #[tokio::test]
    async fn test_stuck_subscriber_drops_instead_of_blocking() {
        let bus = EventBus::with_config(&BusConfig {
            queue_capacity: 2,
            max_in_flight: 1,
        });
        bus.subscribe_fn(Topic::AgentLog, "stuck", |_| async {
            std::future::pending::<()>().await;
            Ok::<(), anyhow::Error>(())
        });
        let (_sub, mut rx) = collector(&bus, Topic::AgentLog, "log-sink");

        let publish_all = async {
            for i in 0..50 {
                bus.publish(Topic::AgentLog, log_message(&format!("m{i}")), SYSTEM_SOURCE)
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        };
        timeout(Duration::from_secs(1), publish_all)
            .await
            .expect("publish blocked on a full subscriber queue");

        // The healthy co-subscriber keeps receiving after the stuck one fills up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.publish(Topic::AgentLog, log_message("after"), SYSTEM_SOURCE)
            .await
            .unwrap();
        let mut saw_after = false;
        while let Ok(Some(envelope)) = timeout(Duration::from_secs(1), rx.recv()).await {
            if let Message::AgentLog(log) = &envelope.payload {
                if log.message == "after" {
                    saw_after = true;
                    break;
                }
            }
        }
        assert!(saw_after);
    }
}
