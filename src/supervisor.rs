use std::sync::Arc;

use anyhow::{Error, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    clients::{database::OutcomeRepository, rbmq::RabbitMqClient},
    config::Config,
    models::{message::Channel, policy::ChannelPolicy},
    worker::{ChannelWorker, FetchBackoff},
};

/// Owns one channel worker per configured channel. Startup is all-or-nothing:
/// any worker that cannot be constructed aborts the whole bring-up. After
/// startup, failures stay inside the owning worker's fetch-retry loop and
/// never affect sibling channels.
pub struct Supervisor {
    cancel: CancellationToken,
    handles: Vec<(Channel, JoinHandle<()>)>,
}

impl Supervisor {
    pub async fn start(config: &Config) -> Result<Self, Error> {
        let store = Arc::new(OutcomeRepository::connect(&config.database_url).await?);

        let rabbitmq = RabbitMqClient::connect(config).await?;
        let publisher = Arc::new(rabbitmq.completion_publisher(config).await?);

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(Channel::ALL.len());

        for channel in Channel::ALL {
            let queue = rabbitmq
                .consumer_for(channel, config.queue_name(channel))
                .await?;

            let worker = ChannelWorker::new(
                channel,
                queue,
                ChannelPolicy::for_channel(channel),
                Arc::clone(&store),
                Arc::clone(&publisher),
                config.commit_policy,
                FetchBackoff::new(
                    config.fetch_retry_initial_delay_ms,
                    config.fetch_retry_max_delay_ms,
                ),
            );

            handles.push((channel, tokio::spawn(worker.run(cancel.clone()))));
        }

        info!(workers = handles.len(), "All channel workers started");

        Ok(Self { cancel, handles })
    }

    /// Signal every worker and block until each one has stopped. Workers
    /// observe the signal at their fetch boundary, so in-flight messages
    /// finish their full cycle first.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for (channel, handle) in self.handles {
            match handle.await {
                Ok(()) => info!(channel = %channel, "Channel worker shut down"),
                Err(e) => error!(channel = %channel, error = %e, "Channel worker task panicked"),
            }
        }
    }
}
