//! In-app notification storage.
//!
//! [`NotificationRepository`] is implemented durably by [`crate::store::Store`];
//! [`InMemoryNotificationRepository`] is a test double.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{NotificationData, NotificationKind};

/// Default page size for notification listings
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// A stored in-app notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppNotification {
    pub id: String,

    pub user_id: String,

    #[serde(rename = "type")]
    pub kind: NotificationKind,

    pub title: String,

    pub message: String,

    pub metadata: serde_json::Value,

    pub read: bool,

    pub created_at: DateTime<Utc>,
}

/// Filters for listing notifications
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub limit: usize,
    pub unread_only: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            unread_only: false,
        }
    }
}

/// Per-user notification store
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, user_id: &str, data: NotificationData) -> Result<InAppNotification>;

    /// Newest first
    async fn list(&self, user_id: &str, options: ListOptions) -> Result<Vec<InAppNotification>>;

    /// Returns false if no such notification exists for the user
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<bool>;

    async fn mark_all_read(&self, user_id: &str) -> Result<usize>;

    async fn unread_count(&self, user_id: &str) -> Result<usize>;

    async fn clear(&self, user_id: &str) -> Result<()>;
}

/// Process-local notification store
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: Mutex<HashMap<String, Vec<InAppNotification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, user_id: &str, data: NotificationData) -> Result<InAppNotification> {
        let notification = InAppNotification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: data.kind,
            title: data.title,
            message: data.message,
            metadata: data.metadata,
            read: false,
            created_at: Utc::now(),
        };

        let mut map = self.notifications.lock().await;
        map.entry(user_id.to_string())
            .or_default()
            .insert(0, notification.clone());
        Ok(notification)
    }

    async fn list(&self, user_id: &str, options: ListOptions) -> Result<Vec<InAppNotification>> {
        let map = self.notifications.lock().await;
        let list = map
            .get(user_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|n| !options.unread_only || !n.read)
                    .take(options.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(list)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        let mut map = self.notifications.lock().await;
        let found = map
            .get_mut(user_id)
            .and_then(|items| items.iter_mut().find(|n| n.id == notification_id));
        match found {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let mut map = self.notifications.lock().await;
        let mut changed = 0;
        if let Some(items) = map.get_mut(user_id) {
            for notification in items.iter_mut().filter(|n| !n.read) {
                notification.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn unread_count(&self, user_id: &str) -> Result<usize> {
        let map = self.notifications.lock().await;
        Ok(map
            .get(user_id)
            .map(|items| items.iter().filter(|n| !n.read).count())
            .unwrap_or(0))
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        self.notifications.lock().await.remove(user_id);
        Ok(())
    }
}
