//! Buffered publishing with a single background sender
//!
//! Producers push onto a bounded channel; one drainer task delivers the
//! messages in order, retrying each up to `send_attempts` times before
//! dropping it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, warn};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;

use super::connection::ConnectionManager;
use super::errors::BrokerError;
use super::stats::PublishStats;
use super::transport::OutboundMessage;

/// Final fate of one buffered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Dropped { attempts: u32 },
}

/// Producer handle onto the publish buffer
#[derive(Clone)]
pub struct Publisher {
    sender: mpsc::Sender<OutboundMessage>,
    stats: Arc<PublishStats>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Publisher {
    /// Create the buffer and spawn its drainer
    pub fn spawn(
        connections: Arc<ConnectionManager>,
        buffer_size: usize,
        send_attempts: u32,
        stop: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let stats = Arc::new(PublishStats::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let drainer = Drainer {
            connections,
            send_attempts: send_attempts.max(1),
            stats: Arc::clone(&stats),
            pending: Arc::clone(&pending),
            drained: Arc::clone(&drained),
        };
        let handle = tokio::spawn(drainer.run(receiver, stop));

        (
            Self {
                sender,
                stats,
                pending,
                drained,
            },
            handle,
        )
    }

    /// Enqueue a message for the background sender
    ///
    /// With `block = false` a full buffer fails immediately and the message
    /// is lost; with `block = true` this waits for space.
    pub async fn publish(&self, message: OutboundMessage, block: bool) -> Result<(), BrokerError> {
        self.pending.fetch_add(1, Ordering::SeqCst);

        let sent = if block {
            self.sender
                .send(message)
                .await
                .map_err(|_| BrokerError::Shutdown)
        } else {
            self.sender.try_send(message).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BrokerError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => BrokerError::Shutdown,
            })
        };

        match sent {
            Ok(()) => {
                self.stats.record_enqueued();
                Ok(())
            }
            Err(e) => {
                self.settle_one();
                if matches!(e, BrokerError::QueueFull) {
                    self.stats.record_rejected_full();
                    error!("Publish buffer full, message lost");
                }
                Err(e)
            }
        }
    }

    /// Wait until every enqueued message has been delivered or dropped
    pub async fn flush(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<PublishStats> {
        &self.stats
    }

    fn settle_one(&self) {
        settle(&self.pending, &self.drained);
    }
}

fn settle(pending: &AtomicUsize, drained: &Notify) {
    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
        drained.notify_waiters();
    }
}

struct Drainer {
    connections: Arc<ConnectionManager>,
    send_attempts: u32,
    stats: Arc<PublishStats>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drainer {
    async fn run(self, mut receiver: mpsc::Receiver<OutboundMessage>, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                message = receiver.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        // Deliver what was already buffered before exiting
        receiver.close();
        while let Ok(message) = receiver.try_recv() {
            self.handle(message).await;
        }
        debug!("Publish drainer stopped");
    }

    async fn handle(&self, message: OutboundMessage) {
        match deliver_with_retry(&self.connections, &message, self.send_attempts, &self.stats).await
        {
            DeliveryOutcome::Delivered { .. } => self.stats.record_delivered(),
            DeliveryOutcome::Dropped { attempts } => {
                self.stats.record_dropped();
                error!(
                    "Message to {}/{} lost after {} attempts",
                    message.exchange, message.routing_key, attempts
                );
            }
        }
        settle(&self.pending, &self.drained);
    }
}

/// Send one message, invalidating the session and retrying on failure
pub async fn deliver_with_retry(
    connections: &ConnectionManager,
    message: &OutboundMessage,
    send_attempts: u32,
    stats: &PublishStats,
) -> DeliveryOutcome {
    for attempt in 1..=send_attempts {
        stats.record_attempt();

        let session = match connections.session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Publish attempt {}/{}: no session: {}", attempt, send_attempts, e);
                continue;
            }
        };

        match session.channel.publish(message).await {
            Ok(true) => return DeliveryOutcome::Delivered { attempts: attempt },
            Ok(false) => {
                warn!(
                    "Publish attempt {}/{} not confirmed by {}",
                    attempt, send_attempts, session.endpoint
                );
            }
            Err(e) => {
                warn!("Publish attempt {}/{} failed: {}", attempt, send_attempts, e);
            }
        }
        connections.invalidate().await;
    }

    DeliveryOutcome::Dropped {
        attempts: send_attempts,
    }
}
