//! [`Eventer`] – named-topic publish/subscribe owned by any observable
//! entity (robot, driver, manager).
//!
//! Each registered topic is backed by its own [`tokio::sync::broadcast`]
//! channel, so every subscriber receives every payload and a slow subscriber
//! never blocks the publisher or its peers. When a subscriber falls more than
//! the channel capacity behind, the oldest payloads are dropped for that
//! subscriber only.
//!
//! Handlers registered with [`Eventer::on`] / [`Eventer::once`] run on their
//! own Tokio task, one task per subscription, which preserves publish order
//! per subscriber. A handler that panics is logged and keeps its
//! subscription.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ferrobot_types::{FerroError, Value};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Default channel capacity (payloads buffered per subscriber before the
/// oldest are dropped).
pub const DEFAULT_CAPACITY: usize = 16;

/// A published payload together with its topic and delivery metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub payload: Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}

/// Raw receiver for one topic, see [`Eventer::subscribe`].
pub type EventReceiver = broadcast::Receiver<Event>;

struct TopicChannel {
    sender: broadcast::Sender<Event>,
    tasks: Vec<AbortHandle>,
}

/// Shared pub/sub holder. Clone it cheaply – all clones share the same
/// topics and subscribers.
#[derive(Clone)]
pub struct Eventer {
    topics: Arc<RwLock<BTreeMap<String, TopicChannel>>>,
    capacity: usize,
}

impl Eventer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an eventer whose topic channels buffer `capacity` payloads.
    /// Capacities below 8 are raised to 8.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(BTreeMap::new())),
            capacity: capacity.max(8),
        }
    }

    /// Register `topic` as publishable. Registering twice is a no-op.
    pub fn add_event(&self, topic: &str) {
        let mut topics = self.topics.write();
        if !topics.contains_key(topic) {
            let (sender, _) = broadcast::channel(self.capacity);
            topics.insert(
                topic.to_string(),
                TopicChannel {
                    sender,
                    tasks: Vec::new(),
                },
            );
        }
    }

    /// Remove `topic`. Its handler tasks are aborted, so payloads still
    /// buffered for them are never delivered.
    pub fn delete_event(&self, topic: &str) {
        if let Some(channel) = self.topics.write().remove(topic) {
            for task in &channel.tasks {
                task.abort();
            }
            debug!(topic, subscribers = channel.tasks.len(), "event deleted");
        }
    }

    /// Names of the currently registered topics.
    pub fn events(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    /// Publishing handle for a registered topic, `None` when unknown.
    pub fn event(&self, topic: &str) -> Option<EventHandle> {
        self.topics.read().get(topic).map(|channel| EventHandle {
            topic: topic.to_string(),
            sender: channel.sender.clone(),
        })
    }

    /// Whether `topic` is registered.
    pub fn has_event(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    /// Deliver `payload` to every current subscriber of `topic`.
    ///
    /// Never blocks. Publishing to an unregistered topic logs a warning and
    /// does nothing; publishing with no subscribers is silently dropped.
    pub fn publish(&self, topic: &str, payload: impl Into<Value>) {
        let topics = self.topics.read();
        match topics.get(topic) {
            Some(channel) => {
                // Err only means "no receivers right now".
                let _ = channel.sender.send(Event::new(topic, payload.into()));
            }
            None => warn!(topic, "publish to unregistered event ignored"),
        }
    }

    /// Raw receiver for `topic`, used by streaming consumers such as the
    /// HTTP event endpoints. `None` when the topic is unregistered.
    pub fn subscribe(&self, topic: &str) -> Option<EventReceiver> {
        self.topics.read().get(topic).map(|c| c.sender.subscribe())
    }

    /// Run `handler` for every payload published to `topic` from now on.
    ///
    /// # Errors
    ///
    /// * [`FerroError::UnknownEvent`] if `topic` is not registered.
    /// * [`FerroError::Runtime`] when called outside a Tokio runtime.
    pub fn on<F>(&self, topic: &str, handler: F) -> Result<Subscription, FerroError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.spawn_subscriber(topic, false, handler)
    }

    /// Like [`Eventer::on`] but the subscription ends after the first
    /// delivered payload.
    ///
    /// # Errors
    ///
    /// Same as [`Eventer::on`].
    pub fn once<F>(&self, topic: &str, handler: F) -> Result<Subscription, FerroError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.spawn_subscriber(topic, true, handler)
    }

    fn spawn_subscriber<F>(&self, topic: &str, once: bool, handler: F) -> Result<Subscription, FerroError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| FerroError::Runtime(format!("cannot subscribe to '{topic}': {e}")))?;

        let mut topics = self.topics.write();
        let channel = topics
            .get_mut(topic)
            .ok_or_else(|| FerroError::UnknownEvent(topic.to_string()))?;

        // Subscribe before spawning so nothing published after this call
        // returns can be missed.
        let mut receiver = channel.sender.subscribe();
        let name = topic.to_string();
        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let payload = event.payload;
                        if std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                            error!(topic = %name, "event handler panicked");
                        }
                        if once {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %name, skipped, "subscriber lagged; oldest payloads dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let abort = task.abort_handle();
        channel.tasks.retain(|t| !t.is_finished());
        channel.tasks.push(abort.clone());
        Ok(Subscription { abort })
    }
}

impl Default for Eventer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Eventer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eventer").field("events", &self.events()).finish()
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Publishing handle for one topic, obtained from [`Eventer::event`].
///
/// Stays usable after the topic is deleted, but publications then reach no
/// one.
#[derive(Clone, Debug)]
pub struct EventHandle {
    topic: String,
    sender: broadcast::Sender<Event>,
}

impl EventHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `payload`; returns the number of subscribers it was queued
    /// for.
    pub fn publish(&self, payload: impl Into<Value>) -> usize {
        self.sender
            .send(Event::new(self.topic.clone(), payload.into()))
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Handle to a running subscription. Dropping it keeps the subscription
/// alive; call [`Subscription::cancel`] to end it.
#[derive(Debug, Clone)]
pub struct Subscription {
    abort: AbortHandle,
}

impl Subscription {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// `true` once the subscription has ended (cancelled, `once` fired, or
    /// topic deleted).
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn recv_timeout(rx: &mut mpsc::UnboundedReceiver<Value>) -> Option<Value> {
        tokio::time::timeout(Duration::from_millis(500), rx.recv()).await.ok().flatten()
    }

    #[test]
    fn add_event_is_idempotent() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        eventer.add_event("data");
        eventer.add_event("error");
        assert_eq!(eventer.events(), vec!["data".to_string(), "error".to_string()]);
    }

    #[test]
    fn event_lookup_is_soft_on_unknown_topic() {
        let eventer = Eventer::new();
        assert!(eventer.event("missing").is_none());
        eventer.add_event("data");
        assert_eq!(eventer.event("data").unwrap().topic(), "data");
    }

    #[test]
    fn publish_to_unknown_topic_is_a_no_op() {
        let eventer = Eventer::new();
        eventer.publish("nope", 1);
        assert!(eventer.events().is_empty());
    }

    #[test]
    fn on_outside_runtime_is_an_error() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let err = eventer.on("data", |_| {}).unwrap_err();
        assert!(matches!(err, FerroError::Runtime(_)));
    }

    #[tokio::test]
    async fn on_unknown_topic_is_an_error() {
        let eventer = Eventer::new();
        let err = eventer.on("data", |_| {}).unwrap_err();
        assert_eq!(err, FerroError::UnknownEvent("data".into()));
    }

    #[tokio::test]
    async fn on_receives_every_payload_in_order() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let (tx, mut rx) = mpsc::unbounded_channel();
        eventer.on("data", move |v| {
            let _ = tx.send(v);
        })
        .unwrap();

        for i in 0..5 {
            eventer.publish("data", i);
        }
        for i in 0..5 {
            assert_eq!(recv_timeout(&mut rx).await, Some(Value::Int(i)));
        }
    }

    #[tokio::test]
    async fn every_subscriber_gets_its_own_copy() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        eventer.on("data", move |v| {
            let _ = tx_a.send(v);
        })
        .unwrap();
        eventer.on("data", move |v| {
            let _ = tx_b.send(v);
        })
        .unwrap();

        eventer.publish("data", "hello");
        assert_eq!(recv_timeout(&mut rx_a).await, Some(Value::from("hello")));
        assert_eq!(recv_timeout(&mut rx_b).await, Some(Value::from("hello")));
    }

    #[tokio::test]
    async fn once_fires_a_single_time() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = eventer
            .once("data", move |v| {
                let _ = tx.send(v);
            })
            .unwrap();

        eventer.publish("data", 1);
        eventer.publish("data", 2);
        assert_eq!(recv_timeout(&mut rx).await, Some(Value::Int(1)));
        // The sender is dropped with the finished task, closing the channel.
        assert_eq!(recv_timeout(&mut rx).await, None);
        assert!(sub.is_finished());
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_receiving() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = eventer
            .on("data", move |v| {
                let _ = tx.send(v);
            })
            .unwrap();
        sub.cancel();
        tokio::task::yield_now().await;
        eventer.publish("data", 1);
        assert_eq!(recv_timeout(&mut rx).await, None);
    }

    #[tokio::test]
    async fn panicking_handler_keeps_its_subscription() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let (tx, mut rx) = mpsc::unbounded_channel();
        eventer
            .on("data", move |v| {
                if v == Value::Int(1) {
                    panic!("bad payload");
                }
                let _ = tx.send(v);
            })
            .unwrap();

        eventer.publish("data", 1);
        eventer.publish("data", 2);
        assert_eq!(recv_timeout(&mut rx).await, Some(Value::Int(2)));
    }

    #[tokio::test]
    async fn delete_event_drops_subscribers() {
        let eventer = Eventer::new();
        eventer.add_event("data");
        let (tx, mut rx) = mpsc::unbounded_channel();
        eventer.on("data", move |v| {
            let _ = tx.send(v);
        })
        .unwrap();

        eventer.delete_event("data");
        assert!(!eventer.has_event("data"));
        eventer.publish("data", 1);
        assert_eq!(recv_timeout(&mut rx).await, None);
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_newest_payloads() {
        let eventer = Eventer::with_capacity(8);
        eventer.add_event("data");
        let mut rx = eventer.subscribe("data").unwrap();
        for i in 0..20 {
            eventer.publish("data", i);
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(12))
        ));
        assert_eq!(rx.recv().await.unwrap().payload, Value::Int(12));
    }

    #[tokio::test]
    async fn event_handle_publishes_to_subscribers() {
        let eventer = Eventer::new();
        eventer.add_event("value");
        let handle = eventer.event("value").unwrap();
        let mut rx = eventer.subscribe("value").unwrap();
        assert_eq!(handle.publish(2.5), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "value");
        assert_eq!(event.payload, Value::Float(2.5));
    }
}
