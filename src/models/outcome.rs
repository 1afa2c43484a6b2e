use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::{Channel, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryStatus::Sent => write!(f, "SENT"),
            DeliveryStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result record of one delivery attempt. Created exactly once per attempt,
/// immutable afterwards, written to the outcome store and serialized into the
/// completion event.
///
/// `notification_id` is deliberately not unique in storage: a redelivery of
/// the same notification produces a second, independent row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub id: Uuid,
    pub notification_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub observed_at: DateTime<Utc>,
    pub latency_ms: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DeliveryOutcome {
    pub fn new(notification: &Notification, status: DeliveryStatus, latency_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id: notification.id.clone(),
            channel: notification.channel,
            recipient: notification.recipient.clone(),
            status,
            observed_at: Utc::now(),
            latency_ms,
            error_message: None,
        }
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }
}
