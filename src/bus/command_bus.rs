use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::events::{Event, EventKind, Payload};

/// Command bus tuning
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Bound of each subscription's delivery channel
    pub subscriber_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
        }
    }
}

/// Identifies one subscription for the lifetime of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Everything the dispatch loop reacts to goes through one FIFO queue, so a
/// subscribe is ordered against publishes exactly as the callers issued them.
enum BusCommand {
    Publish(Arc<Event>),
    Subscribe {
        id: SubscriptionId,
        sender: mpsc::Sender<Arc<Event>>,
    },
    Unsubscribe(SubscriptionId),
    SubscriberCount(oneshot::Sender<usize>),
    Shutdown,
}

/// In-process publish/subscribe bus
///
/// Publishers never block and never see an error. A single dispatch loop
/// drains the intake queue and fans every event out to each live
/// subscription. A subscription whose channel is full is evicted instead of
/// stalling the loop or dropping the event for everyone else; the evicted
/// consumer keeps whatever it already holds and then sees the end of its
/// stream.
///
/// Cloning the bus is cheap; all clones feed the same dispatch loop.
#[derive(Clone)]
pub struct CommandBus {
    intake: mpsc::UnboundedSender<BusCommand>,
    next_subscription: Arc<AtomicU64>,
    config: BusConfig,
}

impl CommandBus {
    /// Create the bus and spawn its dispatch loop on the current runtime
    pub fn start(config: BusConfig) -> Self {
        let (intake, receiver) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_loop(receiver));

        Self {
            intake,
            next_subscription: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// Publish an event built from its parts and return its id
    pub fn publish(&self, kind: EventKind, payload: Payload, source: Option<&str>) -> Uuid {
        self.publish_event(Event::new(kind, payload, source.map(str::to_string)))
    }

    /// Publish a pre-built event and return its id
    pub fn publish_event(&self, event: Event) -> Uuid {
        let id = event.id;
        let kind = event.kind;
        if self.intake.send(BusCommand::Publish(Arc::new(event))).is_err() {
            tracing::debug!(event_id = %id, %kind, "Command bus stopped, discarding event");
        }
        id
    }

    /// Subscribe with the configured channel capacity
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(self.config.subscriber_capacity)
    }

    /// Subscribe with an explicit channel capacity
    ///
    /// The subscription receives every event published after this call
    /// returns, and none published before it.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        if self
            .intake
            .send(BusCommand::Subscribe { id, sender })
            .is_err()
        {
            tracing::debug!(subscription = %id, "Command bus stopped, subscription will be empty");
        }

        Subscription {
            id,
            receiver,
            intake: self.intake.clone(),
        }
    }

    /// Stop delivering to a subscription. Safe to call more than once.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let _ = self.intake.send(BusCommand::Unsubscribe(subscription.id));
    }

    /// Number of live subscriptions, as seen by the dispatch loop
    pub async fn subscriber_count(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self.intake.send(BusCommand::SubscriberCount(reply)).is_err() {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Stop the dispatch loop. Every subscription ends once drained.
    pub fn shutdown(&self) {
        let _ = self.intake.send(BusCommand::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.intake.is_closed()
    }
}

/// One consumer's ordered, bounded view of the bus
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Arc<Event>>,
    intake: mpsc::UnboundedSender<BusCommand>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the subscription has been evicted or removed,
    /// or the bus has shut down, and everything already delivered has been
    /// consumed.
    pub async fn next_event(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Subscription::next_event`]
    pub fn try_next_event(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.intake.send(BusCommand::Unsubscribe(self.id));
    }
}

async fn dispatch_loop(mut intake: mpsc::UnboundedReceiver<BusCommand>) {
    let mut subscribers: Vec<(SubscriptionId, mpsc::Sender<Arc<Event>>)> = Vec::new();
    tracing::info!("Command bus dispatch loop started");

    while let Some(command) = intake.recv().await {
        match command {
            BusCommand::Publish(event) => {
                subscribers.retain(|(id, sender)| match sender.try_send(Arc::clone(&event)) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscription = %id,
                            event_id = %event.id,
                            "Subscriber channel full, evicting slow subscriber"
                        );
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(subscription = %id, "Subscriber disconnected");
                        false
                    }
                });
            }
            BusCommand::Subscribe { id, sender } => {
                tracing::debug!(subscription = %id, "Subscriber added");
                subscribers.push((id, sender));
            }
            BusCommand::Unsubscribe(id) => {
                let before = subscribers.len();
                subscribers.retain(|(existing, _)| *existing != id);
                if subscribers.len() != before {
                    tracing::debug!(subscription = %id, "Subscriber removed");
                }
            }
            BusCommand::SubscriberCount(reply) => {
                let _ = reply.send(subscribers.len());
            }
            BusCommand::Shutdown => break,
        }
    }

    tracing::info!(
        remaining_subscribers = subscribers.len(),
        "Command bus dispatch loop stopped"
    );
}
