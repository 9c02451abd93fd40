//! Durable in-app notifications.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};

use super::{json_column, new_id, Store};
use crate::notify::{
    InAppNotification, ListOptions, NotificationData, NotificationKind, NotificationRepository,
};

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<InAppNotification> {
    let kind: String = row.get(2)?;
    let kind = NotificationKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("Unknown notification kind: {kind}").into(),
        )
    })?;
    Ok(InAppNotification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        title: row.get(3)?,
        message: row.get(4)?,
        metadata: json_column(5, row.get(5)?)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[async_trait]
impl NotificationRepository for Store {
    async fn create(&self, user_id: &str, data: NotificationData) -> Result<InAppNotification> {
        let notification = InAppNotification {
            id: new_id(),
            user_id: user_id.to_string(),
            kind: data.kind,
            title: data.title,
            message: data.message,
            metadata: data.metadata,
            read: false,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notifications (id, user_id, kind, title, message, metadata, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                notification.id,
                notification.user_id,
                notification.kind.as_str(),
                notification.title,
                notification.message,
                serde_json::to_string(&notification.metadata)?,
                notification.created_at
            ],
        )
        .context("Failed to insert notification")?;

        Ok(notification)
    }

    async fn list(&self, user_id: &str, options: ListOptions) -> Result<Vec<InAppNotification>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, title, message, metadata, read, created_at
             FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                params![user_id, options.unread_only, options.limit as i64],
                notification_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![notification_id, user_id],
        )?;
        Ok(changed == 1)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            [user_id],
        )?;
        Ok(changed)
    }

    async fn unread_count(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM notifications WHERE user_id = ?1", [user_id])?;
        Ok(())
    }
}
