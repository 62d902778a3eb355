//! Notification sink and inbox

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{NotificationDraft, NotificationStatus};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub dedup_key: String,
    pub title: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Insert a notification unless an unread one with the same dedup key exists.
///
/// Returns whether a row was written.
pub async fn raise(conn: &mut PgConnection, draft: &NotificationDraft) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (id, kind, dedup_key, title, message, status)
        VALUES ($1, $2, $3, $4, $5, 'UNREAD')
        ON CONFLICT (dedup_key) WHERE status = 'UNREAD' DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(draft.kind.as_str())
    .bind(&draft.dedup_key)
    .bind(&draft.title)
    .bind(&draft.message)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

impl NotificationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Newest first, optionally filtered by read state
    pub async fn list(&self, status: Option<NotificationStatus>) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, kind, dedup_key, title, message, status, created_at, read_at
            FROM notifications
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id
            LIMIT 500
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        Ok(notifications)
    }

    /// Marking an already-read notification again leaves it unchanged.
    pub async fn mark_read(&self, id: Uuid) -> AppResult<Notification> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET status = 'READ', read_at = COALESCE(read_at, NOW())
            WHERE id = $1
            RETURNING id, kind, dedup_key, title, message, status, created_at, read_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {}", id)))
    }
}
