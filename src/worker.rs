use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Error, Result};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{
    message::{Channel, Notification},
    outcome::{DeliveryOutcome, DeliveryStatus},
    policy::{ChannelPolicy, CommitPolicy},
    validation::validate_notification,
};

/// One message pulled from a channel's input queue. The receipt is the
/// broker-side handle used to commit or return the message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub receipt: u64,
    pub payload: Vec<u8>,
}

/// Ordered input stream for one channel: blocking fetch at the current read
/// position, plus commit/requeue of a fetched message by receipt.
pub trait InboundQueue: Send + 'static {
    fn fetch(&mut self) -> impl Future<Output = Result<InboundMessage, Error>> + Send;

    fn commit(&mut self, receipt: u64) -> impl Future<Output = Result<(), Error>> + Send;

    fn requeue(&mut self, receipt: u64) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Channel-specific delivery simulation. Infallible: a failed delivery is a
/// normal outcome value, not an error.
pub trait DeliveryPolicy: Send + Sync + 'static {
    fn simulate(&self, notification: &Notification) -> impl Future<Output = DeliveryOutcome> + Send;
}

/// Durable sink for delivery outcomes. Implementations must be safe for
/// concurrent use from all channel workers.
pub trait OutcomeStore: Send + Sync + 'static {
    fn save(&self, outcome: &DeliveryOutcome) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Emits one completion event per processed notification onto the shared
/// completion stream. Must not report success before the transport has
/// acknowledged the event.
pub trait CompletionPublisher: Send + Sync + 'static {
    fn publish(&self, outcome: &DeliveryOutcome) -> impl Future<Output = Result<(), Error>> + Send;
}

impl DeliveryPolicy for ChannelPolicy {
    fn simulate(&self, notification: &Notification) -> impl Future<Output = DeliveryOutcome> + Send {
        async move {
            let delay_ms = rand::random_range(self.min_latency_ms..=self.max_latency_ms);

            let started = Instant::now();
            sleep(Duration::from_millis(delay_ms)).await;
            let latency_ms = started.elapsed().as_millis() as i64;

            if rand::random::<f64>() < self.failure_rate {
                DeliveryOutcome::new(notification, DeliveryStatus::Failed, latency_ms)
                    .with_error(self.failure_message.clone())
            } else {
                debug!(
                    recipient = %notification.recipient,
                    latency_ms,
                    "Simulated delivery succeeded"
                );
                DeliveryOutcome::new(notification, DeliveryStatus::Sent, latency_ms)
            }
        }
    }
}

/// Jittered exponential delay for the fetch-retry loop. Unlike a bounded
/// retry helper this never gives up: a worker must not advance past a message
/// it cannot fetch.
pub struct FetchBackoff {
    delay_ms: u64,
    initial_delay_ms: u64,
    max_delay_ms: u64,
}

impl FetchBackoff {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            delay_ms: initial_delay_ms,
            initial_delay_ms,
            max_delay_ms,
        }
    }

    pub fn reset(&mut self) {
        self.delay_ms = self.initial_delay_ms;
    }

    pub async fn wait(&mut self) {
        let jitter = rand::random_range(-0.1..=0.1);

        let jittered_delay = (self.delay_ms as f64 * (1.0 + jitter)) as u64;

        sleep(Duration::from_millis(jittered_delay)).await;

        self.delay_ms = std::cmp::min(self.delay_ms * 2, self.max_delay_ms);
    }
}

/// Processing unit for one channel: fetch, simulate, persist, publish,
/// commit, one message at a time. All collaborators are injected at
/// construction; the store and publisher handles are shared with sibling
/// workers.
pub struct ChannelWorker<Q, P, S, C>
where
    Q: InboundQueue,
    P: DeliveryPolicy,
    S: OutcomeStore,
    C: CompletionPublisher,
{
    channel: Channel,
    queue: Q,
    policy: P,
    store: Arc<S>,
    publisher: Arc<C>,
    commit_policy: CommitPolicy,
    backoff: FetchBackoff,
}

impl<Q, P, S, C> ChannelWorker<Q, P, S, C>
where
    Q: InboundQueue,
    P: DeliveryPolicy,
    S: OutcomeStore,
    C: CompletionPublisher,
{
    pub fn new(
        channel: Channel,
        queue: Q,
        policy: P,
        store: Arc<S>,
        publisher: Arc<C>,
        commit_policy: CommitPolicy,
        backoff: FetchBackoff,
    ) -> Self {
        Self {
            channel,
            queue,
            policy,
            store,
            publisher,
            commit_policy,
            backoff,
        }
    }

    /// Run the fetch-process loop until the token is cancelled.
    ///
    /// Cancellation is observed only at the fetch boundary: an iteration that
    /// has already fetched a message always runs through commit before the
    /// worker stops, so no message is ever left fetched-but-uncommitted.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(channel = %self.channel, "Channel worker started, waiting for messages");

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = self.queue.fetch() => fetched,
            };

            match fetched {
                Ok(message) => {
                    self.backoff.reset();
                    self.handle(message).await;
                }
                Err(e) => {
                    if !cancel.is_cancelled() {
                        warn!(
                            channel = %self.channel,
                            error = %e,
                            "Failed to fetch from input stream, backing off"
                        );
                    }
                    self.backoff.wait().await;
                }
            }
        }

        info!(channel = %self.channel, "Channel worker stopped");
    }

    /// Process one fetched message through to commit.
    async fn handle(&mut self, message: InboundMessage) {
        let notification = match self.parse(&message.payload) {
            Ok(notification) => notification,
            Err(e) => {
                // Poison pill: a malformed payload can never be processed,
                // so it is skipped and committed rather than retried.
                warn!(
                    channel = %self.channel,
                    error = %e,
                    "Discarding malformed notification message"
                );
                self.commit(message.receipt).await;
                return;
            }
        };

        info!(
            channel = %self.channel,
            notification_id = %notification.id,
            recipient = %notification.recipient,
            "Processing notification"
        );

        let outcome = self.policy.simulate(&notification).await;

        let persisted = match self.store.save(&outcome).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    channel = %self.channel,
                    notification_id = %outcome.notification_id,
                    error = %e,
                    "Failed to persist delivery outcome"
                );
                false
            }
        };

        let published = match self.publisher.publish(&outcome).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    channel = %self.channel,
                    notification_id = %outcome.notification_id,
                    error = %e,
                    "Failed to publish completion event"
                );
                false
            }
        };

        match self.commit_policy {
            CommitPolicy::Always => self.commit(message.receipt).await,
            CommitPolicy::AfterSinks if persisted && published => {
                self.commit(message.receipt).await;
            }
            CommitPolicy::AfterSinks => {
                warn!(
                    channel = %self.channel,
                    notification_id = %outcome.notification_id,
                    "Returning message to the queue until the outcome reaches both sinks"
                );
                if let Err(e) = self.queue.requeue(message.receipt).await {
                    warn!(channel = %self.channel, error = %e, "Failed to requeue message");
                }
            }
        }

        info!(
            channel = %self.channel,
            notification_id = %outcome.notification_id,
            status = %outcome.status,
            latency_ms = outcome.latency_ms,
            "Notification processed"
        );
    }

    fn parse(&self, payload: &[u8]) -> Result<Notification, Error> {
        let notification = serde_json::from_slice::<Notification>(payload)?;
        validate_notification(&notification)?;
        Ok(notification)
    }

    async fn commit(&mut self, receipt: u64) {
        if let Err(e) = self.queue.commit(receipt).await {
            warn!(
                channel = %self.channel,
                error = %e,
                "Failed to commit read position"
            );
        }
    }
}
