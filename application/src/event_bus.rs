//! In-process publish/subscribe for consultation progress events.
//!
//! Two independent delivery sets: subscribers keyed by consultation id and
//! subscribers keyed by [`EventKind`]. Each subscriber owns an unbounded
//! queue drained by its own delivery task, so [`EventBus::publish`] never
//! waits on a subscriber and events reach each subscriber in publish order.
//!
//! Handler failures are isolated to the failing subscriber. A subscriber
//! that reports [`DeliveryError::Closed`] (or whose queue is gone) is
//! removed; a request's subscriber set is discarded as soon as it is empty.

use crate::ports::event_subscriber::{DeliveryError, EventSubscriber};
use crew_domain::{ConsultationId, EventKind, StreamEvent};
use futures::FutureExt;
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

type EventSender = mpsc::UnboundedSender<Arc<StreamEvent>>;

/// Which delivery set a subscription lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Request(ConsultationId),
    Kind(EventKind),
}

/// Returned by `subscribe*`; pass it to [`EventBus::unsubscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    key: SubscriptionKey,
}

impl SubscriptionHandle {
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }
}

#[derive(Default)]
struct Routes {
    by_request: HashMap<ConsultationId, HashMap<u64, EventSender>>,
    by_kind: HashMap<EventKind, HashMap<u64, EventSender>>,
}

impl Routes {
    fn remove(&mut self, id: u64, key: &SubscriptionKey) -> bool {
        match key {
            SubscriptionKey::Request(request_id) => {
                remove_from(&mut self.by_request, request_id, id)
            }
            SubscriptionKey::Kind(kind) => remove_from(&mut self.by_kind, kind, id),
        }
    }
}

/// Remove one subscriber and drop the set once it is empty
fn remove_from<K: std::hash::Hash + Eq>(
    sets: &mut HashMap<K, HashMap<u64, EventSender>>,
    key: &K,
    id: u64,
) -> bool {
    let Some(set) = sets.get_mut(key) else {
        return false;
    };
    let removed = set.remove(&id).is_some();
    if set.is_empty() {
        sets.remove(key);
    }
    removed
}

struct BusInner {
    // std lock: unsubscribe runs from `Drop`, and it is only held for map edits
    routes: RwLock<Routes>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: u64, key: &SubscriptionKey) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.remove(id, key)
    }
}

/// Event bus shared by the workflow, the executor and the transports
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                routes: RwLock::new(Routes::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to every event of one consultation.
    ///
    /// Must be called from within a Tokio runtime (spawns the delivery task).
    pub fn subscribe(
        &self,
        request_id: ConsultationId,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> SubscriptionHandle {
        self.register(SubscriptionKey::Request(request_id), subscriber)
    }

    /// Subscribe to one event kind across all consultations
    pub fn subscribe_kind(
        &self,
        kind: EventKind,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> SubscriptionHandle {
        self.register(SubscriptionKey::Kind(kind), subscriber)
    }

    /// Subscribe to one consultation as a [`Stream`].
    ///
    /// `initial` is queued ahead of any published event. Dropping the stream
    /// unsubscribes.
    pub fn stream(&self, request_id: ConsultationId, initial: Option<StreamEvent>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(event) = initial {
            let _ = tx.send(event);
        }
        let handle = self.subscribe(request_id, Arc::new(ChannelSubscriber::new(tx)));
        EventStream {
            rx,
            handle: Some(handle),
            bus: self.clone(),
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.inner.remove(handle.id, &handle.key);
        if removed {
            debug!(subscription = handle.id, key = ?handle.key, "Unsubscribed");
        }
        removed
    }

    /// Queue `event` for every current subscriber of its consultation and of
    /// its kind. Never blocks. Returns the number of deliveries queued.
    pub fn publish(&self, event: StreamEvent) -> usize {
        let event = Arc::new(event);
        let mut queued = 0;
        let mut dead: Vec<(u64, SubscriptionKey)> = Vec::new();

        {
            let routes = self.inner.routes.read().unwrap_or_else(|e| e.into_inner());
            let by_request = routes
                .by_request
                .get(&event.request_id)
                .into_iter()
                .flatten()
                .map(|(id, tx)| (id, tx, SubscriptionKey::Request(event.request_id.clone())));
            let by_kind = routes
                .by_kind
                .get(&event.kind)
                .into_iter()
                .flatten()
                .map(|(id, tx)| (id, tx, SubscriptionKey::Kind(event.kind.clone())));

            for (id, tx, key) in by_request.chain(by_kind) {
                if tx.send(Arc::clone(&event)).is_ok() {
                    queued += 1;
                } else {
                    dead.push((*id, key));
                }
            }
        }

        if !dead.is_empty() {
            let mut routes = self.inner.routes.write().unwrap_or_else(|e| e.into_inner());
            for (id, key) in &dead {
                routes.remove(*id, key);
            }
            debug!(removed = dead.len(), "Dropped unreachable subscribers");
        }

        trace!(kind = %event.kind, request = %event.request_id, queued, "Published event");
        queued
    }

    /// Build and publish an event
    pub fn emit(&self, kind: EventKind, request_id: &ConsultationId, data: Value) -> usize {
        self.publish(StreamEvent::new(kind, request_id.clone(), data))
    }

    pub fn subscriber_count(&self, request_id: &ConsultationId) -> usize {
        let routes = self.inner.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.by_request.get(request_id).map_or(0, HashMap::len)
    }

    pub fn kind_subscriber_count(&self, kind: &EventKind) -> usize {
        let routes = self.inner.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.by_kind.get(kind).map_or(0, HashMap::len)
    }

    /// Number of consultations with at least one subscriber
    pub fn tracked_requests(&self) -> usize {
        let routes = self.inner.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.by_request.len()
    }

    fn register(
        &self,
        key: SubscriptionKey,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut routes = self.inner.routes.write().unwrap_or_else(|e| e.into_inner());
            match &key {
                SubscriptionKey::Request(request_id) => routes
                    .by_request
                    .entry(request_id.clone())
                    .or_default()
                    .insert(id, tx),
                SubscriptionKey::Kind(kind) => {
                    routes.by_kind.entry(kind.clone()).or_default().insert(id, tx)
                }
            };
        }

        tokio::spawn(deliver(
            rx,
            subscriber,
            Arc::downgrade(&self.inner),
            id,
            key.clone(),
        ));
        debug!(subscription = id, key = ?key, "Subscribed");
        SubscriptionHandle { id, key }
    }
}

/// Delivery task: drains one subscriber's queue in order
async fn deliver(
    mut rx: mpsc::UnboundedReceiver<Arc<StreamEvent>>,
    subscriber: Arc<dyn EventSubscriber>,
    bus: Weak<BusInner>,
    id: u64,
    key: SubscriptionKey,
) {
    while let Some(event) = rx.recv().await {
        let outcome = AssertUnwindSafe(subscriber.on_event(&event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(DeliveryError::Closed)) => {
                debug!(subscription = id, "Subscriber closed, removing");
                if let Some(bus) = bus.upgrade() {
                    bus.remove(id, &key);
                }
                return;
            }
            Ok(Err(DeliveryError::Failed(reason))) => {
                warn!(subscription = id, kind = %event.kind, %reason, "Event handler failed");
            }
            Err(_) => {
                warn!(subscription = id, kind = %event.kind, "Event handler panicked");
            }
        }
    }
}

/// Subscriber forwarding events into a channel
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl EventSubscriber for ChannelSubscriber {
    async fn on_event(&self, event: &StreamEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(event.clone())
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Live event stream for one consultation
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    handle: Option<SubscriptionHandle>,
    bus: EventBus,
}

impl EventStream {
    /// Next event, or `None` once the stream is closed
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Unsubscribe now; already queued events can still be received
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.bus.unsubscribe(&handle);
        }
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct AlwaysFails;

    #[async_trait]
    impl EventSubscriber for AlwaysFails {
        async fn on_event(&self, _event: &StreamEvent) -> Result<(), DeliveryError> {
            Err(DeliveryError::Failed("boom".to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl EventSubscriber for Panics {
        async fn on_event(&self, _event: &StreamEvent) -> Result<(), DeliveryError> {
            panic!("handler bug");
        }
    }

    struct ClosedTransport {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventSubscriber for ClosedTransport {
        async fn on_event(&self, _event: &StreamEvent) -> Result<(), DeliveryError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Closed)
        }
    }

    struct Stalls {
        started: AtomicUsize,
    }

    #[async_trait]
    impl EventSubscriber for Stalls {
        async fn on_event(&self, _event: &StreamEvent) -> Result<(), DeliveryError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn event(request: &ConsultationId, n: usize) -> StreamEvent {
        StreamEvent::new(EventKind::SpecialistStarted, request.clone(), json!({ "n": n }))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_block_others() {
        let bus = EventBus::new();
        let request = ConsultationId::new("c-1");
        bus.subscribe(request.clone(), Arc::new(AlwaysFails));
        bus.subscribe(request.clone(), Arc::new(Panics));
        let mut stream = bus.stream(request.clone(), None);

        for n in 0..20 {
            bus.publish(event(&request, n));
        }

        for n in 0..20 {
            let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.data["n"], n);
        }
        assert_eq!(bus.subscriber_count(&request), 3);
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_delay_publish_or_others() {
        let bus = EventBus::new();
        let request = ConsultationId::new("c-slow");
        let stalled = Arc::new(Stalls {
            started: AtomicUsize::new(0),
        });
        bus.subscribe(request.clone(), stalled.clone());
        let mut stream = bus.stream(request.clone(), None);

        let started = std::time::Instant::now();
        for n in 0..10 {
            assert_eq!(bus.publish(event(&request, n)), 2);
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        tokio::time::timeout(Duration::from_secs(2), async {
            for n in 0..10 {
                assert_eq!(stream.next().await.unwrap().data["n"], n);
            }
        })
        .await
        .expect("well-behaved subscriber waited on the stalled one");

        // the stalled handler is still inside its first event
        wait_until(|| stalled.started.load(Ordering::SeqCst) > 0).await;
        assert_eq!(stalled.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_kind_subscribers_receive_across_requests() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe_kind(EventKind::Completed, Arc::new(ChannelSubscriber::new(tx)));

        bus.emit(EventKind::Completed, &ConsultationId::new("a"), json!({}));
        bus.emit(EventKind::Evaluating, &ConsultationId::new("a"), json!({}));
        bus.emit(EventKind::Completed, &ConsultationId::new("b"), json!({}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.request_id.as_str(), "a");
        assert_eq!(second.request_id.as_str(), "b");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_in_both_sets_gets_both_deliveries() {
        let bus = EventBus::new();
        let request = ConsultationId::new("c-2");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber: Arc<dyn EventSubscriber> = Arc::new(ChannelSubscriber::new(tx));
        bus.subscribe(request.clone(), Arc::clone(&subscriber));
        bus.subscribe_kind(EventKind::Error, subscriber);

        assert_eq!(bus.emit(EventKind::Error, &request, json!({})), 2);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed_on_first_failure() {
        let bus = EventBus::new();
        let request = ConsultationId::new("c-3");
        let closed = Arc::new(ClosedTransport {
            seen: AtomicUsize::new(0),
        });
        bus.subscribe(request.clone(), closed.clone());
        assert_eq!(bus.tracked_requests(), 1);

        bus.publish(event(&request, 0));
        wait_until(|| bus.subscriber_count(&request) == 0).await;

        assert_eq!(bus.tracked_requests(), 0);
        assert_eq!(bus.publish(event(&request, 1)), 0);
        assert_eq!(closed.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_unsubscribe_discards_request_set() {
        let bus = EventBus::new();
        let request = ConsultationId::new("c-4");
        let first = bus.subscribe(request.clone(), Arc::new(AlwaysFails));
        let second = bus.subscribe(request.clone(), Arc::new(AlwaysFails));

        assert!(bus.unsubscribe(&first));
        assert_eq!(bus.tracked_requests(), 1);
        assert!(bus.unsubscribe(&second));
        assert_eq!(bus.tracked_requests(), 0);
        assert!(!bus.unsubscribe(&second));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_allocates_nothing() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(event(&ConsultationId::new("nobody"), 0)), 0);
        assert_eq!(bus.tracked_requests(), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let bus = EventBus::new();
        let request = ConsultationId::new("c-5");
        let initial = StreamEvent::new(EventKind::Connected, request.clone(), json!({}));
        let mut stream = bus.stream(request.clone(), Some(initial));

        bus.publish(event(&request, 1));
        assert_eq!(stream.next().await.unwrap().kind, EventKind::Connected);
        assert_eq!(stream.next().await.unwrap().data["n"], 1);

        drop(stream);
        assert_eq!(bus.tracked_requests(), 0);
    }
}
