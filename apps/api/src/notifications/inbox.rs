//! In-app notification inbox. Keeps the most recent `INBOX_CAPACITY`
//! notifications per user.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::notifications::{Notification, NotificationSink};

pub const INBOX_CAPACITY: usize = 100;

#[derive(Default)]
pub struct InAppNotifications {
    inboxes: RwLock<HashMap<Uuid, Vec<Notification>>>,
}

impl InAppNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest last. `limit` keeps the most recent ones.
    pub async fn list(&self, user_id: Uuid, unread_only: bool, limit: usize) -> Vec<Notification> {
        let inboxes = self.inboxes.read().await;
        let Some(inbox) = inboxes.get(&user_id) else {
            return vec![];
        };
        let matching: Vec<&Notification> = inbox.iter().filter(|n| !unread_only || !n.read).collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Returns false if the notification does not exist for this user.
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> bool {
        let mut inboxes = self.inboxes.write().await;
        match inboxes
            .get_mut(&user_id)
            .and_then(|inbox| inbox.iter_mut().find(|n| n.id == notification_id))
        {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, user_id: Uuid) -> usize {
        let mut inboxes = self.inboxes.write().await;
        inboxes
            .get_mut(&user_id)
            .map(|inbox| {
                inbox
                    .iter_mut()
                    .filter(|n| !n.read)
                    .map(|n| n.read = true)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationSink for InAppNotifications {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        let mut inboxes = self.inboxes.write().await;
        let inbox = inboxes.entry(notification.user_id).or_default();
        inbox.push(notification.clone());
        if inbox.len() > INBOX_CAPACITY {
            let excess = inbox.len() - INBOX_CAPACITY;
            inbox.drain(..excess);
        }
        debug!("In-app notification for {}: {}", notification.user_id, notification.title);
        Ok(())
    }
}
