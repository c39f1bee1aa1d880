use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::db::models::DbNotification;
use crate::db::sqlite::Storage;
use crate::error::CredtrackError;

pub const CREDENTIAL_EXPIRING: &str = "credential_expiring";

impl Storage {
    /// Insert unless this (credential, kind, validity) was already notified.
    /// Returns whether a row was written.
    pub async fn insert_notification(
        &self,
        user_id: i64,
        credential_id: i64,
        kind: &str,
        validity: NaiveDate,
        payload: &Value,
    ) -> Result<bool, CredtrackError> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO notifications
               (user_id, credential_id, kind, validity, payload, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(user_id)
        .bind(credential_id)
        .bind(kind)
        .bind(validity)
        .bind(serde_json::to_string(payload)?)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn notification_exists(
        &self,
        credential_id: i64,
        kind: &str,
        validity: NaiveDate,
    ) -> Result<bool, CredtrackError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE credential_id = ? AND kind = ? AND validity = ?",
        )
        .bind(credential_id)
        .bind(kind)
        .bind(validity)
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    pub async fn notifications_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<DbNotification>, CredtrackError> {
        let rows = sqlx::query_as::<_, DbNotification>(
            r#"SELECT id, user_id, credential_id, kind, validity, payload, created_at
               FROM notifications WHERE user_id = ? ORDER BY id DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
