use serde::Deserialize;

use crate::models::message::Channel;

/// Static simulation parameters for one channel. Built once at supervisor
/// construction and shared read-only with that channel's worker.
#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub failure_rate: f64,
    pub failure_message: String,
}

impl ChannelPolicy {
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Email => Self::email(),
            Channel::Sms => Self::sms(),
            Channel::Push => Self::push(),
        }
    }

    pub fn email() -> Self {
        Self {
            min_latency_ms: 50,
            max_latency_ms: 200,
            failure_rate: 0.10,
            failure_message: "SMTP connection timeout".to_string(),
        }
    }

    pub fn sms() -> Self {
        Self {
            min_latency_ms: 30,
            max_latency_ms: 100,
            failure_rate: 0.10,
            failure_message: "carrier gateway unreachable".to_string(),
        }
    }

    pub fn push() -> Self {
        Self {
            min_latency_ms: 20,
            max_latency_ms: 80,
            failure_rate: 0.10,
            failure_message: "device token invalid".to_string(),
        }
    }
}

/// When a worker advances its committed read position.
///
/// `Always` reproduces the source system's at-least-once/best-effort
/// behavior: the position advances whether or not the outcome reached the
/// store and the completion stream. `AfterSinks` trades liveness for
/// consistency: the message is requeued until both sinks accept the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    #[default]
    Always,
    AfterSinks,
}
