//! Local notification delivery.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{Notification, NotificationChannel};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

/// Number of notifications the outbox retains
pub const OUTBOX_CAPACITY: usize = 100;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: NotificationChannel, title: &str, body: &str) -> Result<()>;
}

/// Notifier that logs each notification and keeps the most recent ones for
/// guardians to poll
pub struct OutboxNotifier {
    outbox: Mutex<VecDeque<Notification>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self {
            outbox: Mutex::new(VecDeque::with_capacity(OUTBOX_CAPACITY)),
        }
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<Notification> {
        let outbox = match self.outbox.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outbox.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for OutboxNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, channel: NotificationChannel, title: &str, body: &str) -> Result<()> {
        info!("🔔 [{}] {}: {}", channel.channel_id(), title, body);

        let notification = Notification {
            channel,
            title: title.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        let mut outbox = match self.outbox.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if outbox.len() == OUTBOX_CAPACITY {
            outbox.pop_front();
        }
        outbox.push_back(notification);
        Ok(())
    }
}
