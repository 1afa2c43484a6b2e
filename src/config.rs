use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{message::Channel, policy::CommitPolicy};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub email_queue_name: String,
    pub sms_queue_name: String,
    pub push_queue_name: String,
    pub completion_queue_name: String,
    pub prefetch_count: u16,

    pub database_url: String,

    pub fetch_retry_initial_delay_ms: u64,
    pub fetch_retry_max_delay_ms: u64,

    #[serde(default)]
    pub commit_policy: CommitPolicy,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    pub fn queue_name(&self, channel: Channel) -> &str {
        match channel {
            Channel::Email => &self.email_queue_name,
            Channel::Sms => &self.sms_queue_name,
            Channel::Push => &self.push_queue_name,
        }
    }
}
