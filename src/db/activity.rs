use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use crate::db::models::DbActivity;
use crate::db::sqlite::Storage;
use crate::error::CredtrackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityEvent {
    Created,
    Updated,
    Deleted,
    Restored,
}

impl ActivityEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityEvent::Created => "created",
            ActivityEvent::Updated => "updated",
            ActivityEvent::Deleted => "deleted",
            ActivityEvent::Restored => "restored",
        }
    }
}

/// One audit-trail entry, written in the same transaction as the change it describes.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub log_name: &'static str,
    pub event: ActivityEvent,
    pub subject_type: &'static str,
    pub subject_id: i64,
    pub causer_id: Option<i64>,
    /// `attributes` (new values) and, for updates, `old`.
    pub properties: Value,
}

/// Keys of `after` whose values differ from `before`, as `(old, attributes)`.
pub fn dirty_fields(before: &Value, after: &Value) -> (Map<String, Value>, Map<String, Value>) {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut old = Map::new();
    let mut attributes = Map::new();
    for (key, value) in after {
        let previous = before.get(key).unwrap_or(&Value::Null);
        if previous != value {
            old.insert(key.clone(), previous.clone());
            attributes.insert(key.clone(), value.clone());
        }
    }
    (old, attributes)
}

pub(crate) async fn record(
    conn: &mut SqliteConnection,
    entry: &ActivityEntry,
) -> Result<i64, CredtrackError> {
    let properties = serde_json::to_string(&entry.properties)?;
    let result = sqlx::query(
        r#"INSERT INTO activity_log
           (log_name, event, subject_type, subject_id, causer_id, properties, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.log_name)
    .bind(entry.event.as_str())
    .bind(entry.subject_type)
    .bind(entry.subject_id)
    .bind(entry.causer_id)
    .bind(properties)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    tracing::info!(
        target: "audit",
        log = entry.log_name,
        event = entry.event.as_str(),
        subject_id = entry.subject_id,
        causer_id = ?entry.causer_id,
        "activity recorded"
    );
    Ok(result.last_insert_rowid())
}

impl Storage {
    /// Newest first. Optionally restricted to one subject.
    pub async fn list_activity(
        &self,
        subject: Option<(&str, i64)>,
        limit: i64,
    ) -> Result<Vec<DbActivity>, CredtrackError> {
        let rows = match subject {
            Some((subject_type, subject_id)) => {
                sqlx::query_as::<_, DbActivity>(
                    r#"SELECT id, log_name, event, subject_type, subject_id, causer_id,
                       properties, created_at
                       FROM activity_log WHERE subject_type = ? AND subject_id = ?
                       ORDER BY id DESC LIMIT ?"#,
                )
                .bind(subject_type)
                .bind(subject_id)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, DbActivity>(
                    r#"SELECT id, log_name, event, subject_type, subject_id, causer_id,
                       properties, created_at
                       FROM activity_log ORDER BY id DESC LIMIT ?"#,
                )
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dirty_fields_reports_only_changes() {
        let before = json!({"fscs": "12345", "concession": null, "secrecy": "R"});
        let after = json!({"fscs": "12345", "concession": "2025-01-15", "secrecy": "S"});
        let (old, attributes) = dirty_fields(&before, &after);
        assert_eq!(Value::Object(old), json!({"concession": null, "secrecy": "R"}));
        assert_eq!(
            Value::Object(attributes),
            json!({"concession": "2025-01-15", "secrecy": "S"})
        );
    }
}
