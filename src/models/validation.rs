use anyhow::{Result, anyhow};

use crate::models::message::Notification;

pub fn validate_notification(notification: &Notification) -> Result<()> {
    if notification.id.is_empty() {
        return Err(anyhow!("Notification id cannot be empty"));
    }

    if notification.recipient.is_empty() {
        return Err(anyhow!("Notification recipient cannot be empty"));
    }

    Ok(())
}
