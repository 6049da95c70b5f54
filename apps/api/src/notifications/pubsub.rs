//! Redis pub/sub fan-out. Each notification is published as JSON on
//! `jobpilot:notifications:{user_id}`.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::notifications::{Notification, NotificationSink};

const CHANNEL_PREFIX: &str = "jobpilot:notifications";

pub fn channel_for(user_id: Uuid) -> String {
    format!("{CHANNEL_PREFIX}:{user_id}")
}

pub struct RedisNotificationSink {
    client: redis::Client,
}

impl RedisNotificationSink {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

fn redis_error(e: redis::RedisError) -> ServiceError {
    ServiceError::Upstream(format!("redis: {e}"))
}

#[async_trait]
impl NotificationSink for RedisNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;
        let channel = channel_for(notification.user_id);
        let receivers: i64 = conn.publish(&channel, payload).await.map_err(redis_error)?;
        debug!("Published notification on {channel} to {receivers} subscriber(s)");
        Ok(())
    }
}
