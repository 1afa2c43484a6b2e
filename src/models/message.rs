use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// One delivery medium. Each channel has its own input queue, worker, and
/// simulation policy; the variants serialize to the uppercase names used on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Push];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Push => "PUSH",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Incoming notification record as published by the type-routing stage.
///
/// The `channel` field is expected to match the queue the record arrived on;
/// the worker trusts the router on that and only validates the payload itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub channel: Channel,
    pub recipient: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub body: String,
}
