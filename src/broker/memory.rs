//! In-process broker
//!
//! Implements the transport traits with direct exchanges, durable queues,
//! per-channel prefetch and requeue-on-close. Used by the test suite and
//! for running the pipeline without an external broker. A few knobs inject
//! failures: rejected publishes, refused connections, forced heartbeat
//! errors.
//!
//! Closed channels are forgotten and only the most recent
//! [`PUBLISHED_HISTORY`] accepted messages are remembered, so a long-running
//! embedder keeps bounded state.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::errors::BrokerError;
use super::transport::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, OutboundMessage, QueueSpec,
};
use crate::config::{BrokerConfig, BrokerEndpoint};

/// Accepted messages kept for [`InMemoryBroker::published`]
pub const PUBLISHED_HISTORY: usize = 1024;

#[derive(Debug, Default)]
struct QueueState {
    spec: Option<QueueSpec>,
    ready: VecDeque<Vec<u8>>,
    /// Redelivered bodies waiting at the head of `ready`
    redelivered: usize,
}

#[derive(Debug)]
struct Unacked {
    channel: u64,
    queue: String,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    /// exchange -> (routing key, queue) bindings
    exchanges: HashMap<String, Vec<(String, String)>>,
    queues: BTreeMap<String, QueueState>,
    unacked: BTreeMap<u64, Unacked>,
    prefetch: HashMap<u64, u16>,
    open_channels: HashSet<u64>,
    next_tag: u64,
    next_channel: u64,
    published: VecDeque<OutboundMessage>,
}

impl State {
    fn route(&mut self, message: &OutboundMessage) -> Result<(), BrokerError> {
        let targets: Vec<String> = if message.exchange.is_empty() {
            vec![message.routing_key.clone()]
        } else {
            let bindings = self.exchanges.get(&message.exchange).ok_or_else(|| {
                BrokerError::Channel(format!("no exchange '{}'", message.exchange))
            })?;
            bindings
                .iter()
                .filter(|(key, _)| *key == message.routing_key)
                .map(|(_, queue)| queue.clone())
                .collect()
        };

        for queue in targets {
            if let Some(state) = self.queues.get_mut(&queue) {
                state.ready.push_back(message.body.clone());
            }
        }
        if self.published.len() == PUBLISHED_HISTORY {
            self.published.pop_front();
        }
        self.published.push_back(message.clone());
        Ok(())
    }

    /// Requeue the channel's unacked deliveries and drop its bookkeeping
    fn forget_channel(&mut self, channel: u64) {
        self.open_channels.remove(&channel);
        self.prefetch.remove(&channel);
        self.requeue_channel(channel);
    }

    fn requeue_channel(&mut self, channel: u64) {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.channel == channel)
            .map(|(tag, _)| *tag)
            .collect();
        // Oldest first ends up at the head
        for tag in tags.into_iter().rev() {
            if let Some(entry) = self.unacked.remove(&tag) {
                self.push_front(&entry.queue, entry.body);
            }
        }
    }

    fn push_front(&mut self, queue: &str, body: Vec<u8>) {
        if let Some(state) = self.queues.get_mut(queue) {
            state.ready.push_front(body);
            state.redelivered += 1;
        }
    }

    fn in_flight(&self, channel: u64) -> usize {
        self.unacked.values().filter(|u| u.channel == channel).count()
    }
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    reject_publishes: AtomicBool,
    refuse_connections: AtomicBool,
    fail_heartbeats: AtomicBool,
    publish_calls: AtomicU64,
    connections_opened: AtomicU64,
}

/// An in-process broker; clones share the same state
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                reject_publishes: AtomicBool::new(false),
                refuse_connections: AtomicBool::new(false),
                fail_heartbeats: AtomicBool::new(false),
                publish_calls: AtomicU64::new(0),
                connections_opened: AtomicU64::new(0),
            }),
        }
    }

    /// Connector handing out connections to this broker
    #[must_use]
    pub fn connector(&self) -> Arc<dyn BrokerConnector> {
        Arc::new(self.clone())
    }

    /// Make every publish fail with a channel error
    pub fn set_reject_publishes(&self, reject: bool) {
        self.shared.reject_publishes.store(reject, Ordering::SeqCst);
    }

    pub fn set_refuse_connections(&self, refuse: bool) {
        self.shared.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn set_fail_heartbeats(&self, fail: bool) {
        self.shared.fail_heartbeats.store(fail, Ordering::SeqCst);
    }

    /// Number of `publish` calls, accepted or not
    #[must_use]
    pub fn publish_calls(&self) -> u64 {
        self.shared.publish_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.shared.connections_opened.load(Ordering::SeqCst)
    }

    /// Recently accepted messages, in publish order
    #[must_use]
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.shared.state.lock().published.iter().cloned().collect()
    }

    /// Channels currently tracked as open
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.shared.state.lock().open_channels.len()
    }

    /// Ready messages in `queue`, oldest first
    #[must_use]
    pub fn queued(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ready plus unacknowledged messages in `queue`
    #[must_use]
    pub fn depth(&self, queue: &str) -> usize {
        let state = self.shared.state.lock();
        let ready = state.queues.get(queue).map_or(0, |q| q.ready.len());
        ready + state.unacked.values().filter(|u| u.queue == queue).count()
    }

    #[must_use]
    pub fn has_queue(&self, queue: &str) -> bool {
        self.shared.state.lock().queues.contains_key(queue)
    }

    #[must_use]
    pub fn queue_spec(&self, queue: &str) -> Option<QueueSpec> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .and_then(|q| q.spec.clone())
    }

    /// Whether `exchange` routes `routing_key` to `queue`
    #[must_use]
    pub fn is_bound(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.shared
            .state
            .lock()
            .exchanges
            .get(exchange)
            .is_some_and(|b| b.iter().any(|(k, q)| k == routing_key && q == queue))
    }

    /// Put a message straight onto a queue, creating it if needed
    pub fn inject(&self, queue: &str, body: impl Into<Vec<u8>>) {
        {
            let mut state = self.shared.state.lock();
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .ready
                .push_back(body.into());
        }
        self.shared.notify.notify_waiters();
    }

    /// Remove and return every ready message in `queue`
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        let mut state = self.shared.state.lock();
        state
            .queues
            .get_mut(queue)
            .map(|q| {
                q.redelivered = 0;
                q.ready.drain(..).collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        _config: &BrokerConfig,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection(format!("{endpoint} refused connection")));
        }
        self.shared.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            open: AtomicBool::new(true),
            channels: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    open: AtomicBool,
    channels: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn heartbeat(&self) -> Result<(), BrokerError> {
        if self.shared.fail_heartbeats.load(Ordering::SeqCst) {
            self.open.store(false, Ordering::SeqCst);
            return Err(BrokerError::Connection("heartbeat missed".into()));
        }
        Ok(())
    }

    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::Connection("connection closed".into()));
        }
        let id = {
            let mut state = self.shared.state.lock();
            state.next_channel += 1;
            let id = state.next_channel;
            state.open_channels.insert(id);
            id
        };
        self.channels.lock().push(id);
        Ok(Arc::new(MemoryChannel {
            shared: Arc::clone(&self.shared),
            id,
            owner: Arc::clone(&self.channels),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.open.store(false, Ordering::SeqCst);
        let channels: Vec<u64> = self.channels.lock().drain(..).collect();
        {
            let mut state = self.shared.state.lock();
            for id in channels {
                state.forget_channel(id);
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

struct MemoryChannel {
    shared: Arc<Shared>,
    id: u64,
    /// Channel ids of the owning connection
    owner: Arc<Mutex<Vec<u64>>>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BrokerError::Channel(format!("channel {} is closed", self.id)))
        }
    }

    /// Take the next ready delivery if prefetch allows
    fn try_next(shared: &Shared, channel: u64, queue: &str) -> Option<Option<Delivery>> {
        let mut state = shared.state.lock();
        if !state.open_channels.contains(&channel) {
            return Some(None);
        }
        let limit = state.prefetch.get(&channel).copied().unwrap_or(0);
        if limit > 0 && state.in_flight(channel) >= usize::from(limit) {
            return None;
        }

        let queue_state = state.queues.get_mut(queue)?;
        let body = queue_state.ready.pop_front()?;
        let redelivered = queue_state.redelivered > 0;
        if redelivered {
            queue_state.redelivered -= 1;
        }

        state.next_tag += 1;
        let delivery_tag = state.next_tag;
        state.unacked.insert(
            delivery_tag,
            Unacked {
                channel,
                queue: queue.to_string(),
                body: body.clone(),
            },
        );
        Some(Some(Delivery {
            delivery_tag,
            body,
            redelivered,
        }))
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.shared
            .state
            .lock()
            .open_channels
            .contains(&self.id)
    }

    async fn confirm_select(&self) -> Result<(), BrokerError> {
        self.ensure_open()
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<bool, BrokerError> {
        self.shared.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        if self.shared.reject_publishes.load(Ordering::SeqCst) {
            return Err(BrokerError::Channel("publish rejected".into()));
        }
        self.shared.state.lock().route(message)?;
        self.shared.notify.notify_waiters();
        Ok(true)
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared.state.lock().prefetch.insert(self.id, count);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
    ) -> Result<BoxStream<'static, Result<Delivery, BrokerError>>, BrokerError> {
        self.ensure_open()?;
        if !self.shared.state.lock().queues.contains_key(queue) {
            return Err(BrokerError::Channel(format!("no queue '{queue}'")));
        }

        let shared = Arc::clone(&self.shared);
        let channel = self.id;
        let queue = queue.to_string();
        let deliveries = stream::unfold((shared, queue), move |(shared, queue)| async move {
            loop {
                let next = {
                    let notified = shared.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    match MemoryChannel::try_next(&shared, channel, &queue) {
                        Some(next) => next,
                        None => {
                            notified.await;
                            continue;
                        }
                    }
                };
                return next.map(|delivery| (Ok::<_, BrokerError>(delivery), (shared, queue)));
            }
        });
        Ok(deliveries.boxed())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let removed = self.shared.state.lock().unacked.remove(&delivery_tag);
        self.shared.notify.notify_waiters();
        match removed {
            Some(_) => Ok(()),
            None => Err(BrokerError::Channel(format!("unknown delivery tag {delivery_tag}"))),
        }
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.ensure_open()?;
        {
            let mut state = self.shared.state.lock();
            let entry = state.unacked.remove(&delivery_tag).ok_or_else(|| {
                BrokerError::Channel(format!("unknown delivery tag {delivery_tag}"))
            })?;
            if requeue {
                state.push_front(&entry.queue, entry.body);
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared
            .state
            .lock()
            .exchanges
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        let queue = state.queues.entry(spec.name.clone()).or_default();
        match &queue.spec {
            Some(existing) if existing != spec => Err(BrokerError::Channel(format!(
                "queue '{}' redeclared with different arguments",
                spec.name
            ))),
            _ => {
                queue.spec = Some(spec.clone());
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::Channel(format!("no queue '{queue}'")));
        }
        let bindings = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::Channel(format!("no exchange '{exchange}'")))?;
        let binding = (routing_key.to_string(), queue.to_string());
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    async fn queue_message_count(&self, name: &str) -> Result<Option<u32>, BrokerError> {
        self.ensure_open()?;
        let state = self.shared.state.lock();
        Ok(state
            .queues
            .get(name)
            .map(|q| u32::try_from(q.ready.len()).unwrap_or(u32::MAX)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.owner.lock().retain(|id| *id != self.id);
        self.shared.state.lock().forget_channel(self.id);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}
