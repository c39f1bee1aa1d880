use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::db::activity::{self, ActivityEntry, ActivityEvent, dirty_fields};
use crate::db::models::DbCredential;
use crate::db::sqlite::{Storage, Trashed};
use crate::domain::CredentialFields;
use crate::error::CredtrackError;

const LOG_NAME: &str = "credential";
const SUBJECT_TYPE: &str = "credential";

const CREDENTIAL_COLUMNS: &str = "c.id, c.user_id, c.fscs, c.type, c.secrecy, c.credential, \
                                  c.concession, c.validity, c.observation, c.created_at, \
                                  c.updated_at, c.deleted_at";

#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialFilter {
    pub trashed: Trashed,
    pub user_id: Option<i64>,
}

/// An active credential held by an active user, with the holder's contact data.
#[derive(Debug, Clone)]
pub struct ExpiringCredential {
    pub credential: DbCredential,
    pub user_name: String,
    pub user_full_name: String,
    pub user_email: String,
}

/// A credential counts as active only while both it and its holder are
/// not soft-deleted; `Only` is the complement of that.
fn scope(trashed: Trashed) -> &'static str {
    match trashed {
        Trashed::Without => "c.deleted_at IS NULL AND u.deleted_at IS NULL",
        Trashed::With => "1 = 1",
        Trashed::Only => "(c.deleted_at IS NOT NULL OR u.deleted_at IS NOT NULL)",
    }
}

/// Audited attributes of a credential, as stored in the activity log.
fn audit_attributes(user_id: i64, fields: &CredentialFields) -> Value {
    json!({
        "user_id": user_id,
        "fscs": fields.fscs,
        "type": fields.kind,
        "secrecy": fields.secrecy,
        "credential": fields.credential,
        "concession": fields.concession,
        "validity": fields.validity,
        "observation": fields.observation,
    })
}

fn entry(event: ActivityEvent, subject_id: i64, causer_id: Option<i64>, properties: Value) -> ActivityEntry {
    ActivityEntry {
        log_name: LOG_NAME,
        event,
        subject_type: SUBJECT_TYPE,
        subject_id,
        causer_id,
        properties,
    }
}

async fn fetch_one(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<DbCredential>, CredtrackError> {
    let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials c WHERE c.id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(conn).await?;
    row.map(row_to_model).transpose()
}

fn row_to_model(row: SqliteRow) -> Result<DbCredential, CredtrackError> {
    let kind: String = row.try_get("type")?;
    let secrecy: String = row.try_get("secrecy")?;
    let kind = kind
        .parse()
        .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
    let secrecy = secrecy
        .parse()
        .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

    let fields = CredentialFields {
        fscs: row.try_get("fscs")?,
        kind,
        secrecy,
        credential: row.try_get("credential")?,
        concession: row.try_get::<Option<NaiveDate>, _>("concession")?,
        validity: row.try_get::<Option<NaiveDate>, _>("validity")?,
        observation: row.try_get("observation")?,
    };

    Ok(DbCredential {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        fields,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
    })
}

async fn purge(
    conn: &mut SqliteConnection,
    before: &DbCredential,
    causer_id: Option<i64>,
) -> Result<(), CredtrackError> {
    sqlx::query("DELETE FROM credentials WHERE id = ?")
        .bind(before.id)
        .execute(&mut *conn)
        .await?;
    let properties = json!({
        "old": audit_attributes(before.user_id, &before.fields),
        "force": true,
    });
    activity::record(conn, &entry(ActivityEvent::Deleted, before.id, causer_id, properties))
        .await?;
    Ok(())
}

/// Permanently remove every credential of `user_id`, trashed ones included,
/// logging each one as a forced delete. Returns how many were removed.
pub(crate) async fn purge_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    causer_id: Option<i64>,
) -> Result<usize, CredtrackError> {
    let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials c WHERE c.user_id = ? ORDER BY c.id");
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(&mut *conn).await?;
    let credentials = rows
        .into_iter()
        .map(row_to_model)
        .collect::<Result<Vec<_>, _>>()?;
    for credential in &credentials {
        purge(&mut *conn, credential, causer_id).await?;
    }
    Ok(credentials.len())
}

impl Storage {
    /// Insert and log `created`. `fields.validity` must already be derived.
    pub async fn insert_credential(
        &self,
        user_id: i64,
        fields: &CredentialFields,
        causer_id: Option<i64>,
    ) -> Result<DbCredential, CredtrackError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"INSERT INTO credentials
               (user_id, fscs, type, secrecy, credential, concession, validity, observation,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(user_id)
        .bind(&fields.fscs)
        .bind(fields.kind.as_str())
        .bind(fields.secrecy.as_str())
        .bind(&fields.credential)
        .bind(fields.concession)
        .bind(fields.validity)
        .bind(&fields.observation)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let properties = json!({ "attributes": audit_attributes(user_id, fields) });
        activity::record(&mut tx, &entry(ActivityEvent::Created, id, causer_id, properties))
            .await?;

        let stored = fetch_one(&mut tx, id)
            .await?
            .ok_or_else(|| CredtrackError::not_found("credential", id))?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Update all mutable fields and log `updated` with the dirty attributes.
    /// Nothing is logged when no audited attribute changed.
    pub async fn update_credential(
        &self,
        id: i64,
        user_id: i64,
        fields: &CredentialFields,
        causer_id: Option<i64>,
    ) -> Result<DbCredential, CredtrackError> {
        let mut tx = self.pool().begin().await?;
        let before = fetch_one(&mut tx, id)
            .await?
            .ok_or_else(|| CredtrackError::not_found("credential", id))?;

        sqlx::query(
            r#"UPDATE credentials SET
                user_id = ?, fscs = ?, type = ?, secrecy = ?, credential = ?,
                concession = ?, validity = ?, observation = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(user_id)
        .bind(&fields.fscs)
        .bind(fields.kind.as_str())
        .bind(fields.secrecy.as_str())
        .bind(&fields.credential)
        .bind(fields.concession)
        .bind(fields.validity)
        .bind(&fields.observation)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let (old, attributes) = dirty_fields(
            &audit_attributes(before.user_id, &before.fields),
            &audit_attributes(user_id, fields),
        );
        if !attributes.is_empty() {
            let properties = json!({ "attributes": attributes, "old": old });
            activity::record(&mut tx, &entry(ActivityEvent::Updated, id, causer_id, properties))
                .await?;
        }

        let stored = fetch_one(&mut tx, id)
            .await?
            .ok_or_else(|| CredtrackError::not_found("credential", id))?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Fetch by id, including soft-deleted rows.
    pub async fn get_credential(&self, id: i64) -> Result<Option<DbCredential>, CredtrackError> {
        let mut conn = self.pool().acquire().await?;
        fetch_one(&mut conn, id).await
    }

    pub async fn list_credentials(
        &self,
        filter: CredentialFilter,
    ) -> Result<Vec<DbCredential>, CredtrackError> {
        let mut sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials c JOIN users u ON u.id = c.user_id \
             WHERE {}",
            scope(filter.trashed)
        );
        if filter.user_id.is_some() {
            sql.push_str(" AND c.user_id = ?");
        }
        sql.push_str(" ORDER BY c.validity IS NULL, c.validity, c.id");

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter().map(row_to_model).collect()
    }

    /// Whether another non-deleted credential carries this FSCS code.
    pub async fn fscs_taken(&self, fscs: &str, except_id: Option<i64>) -> Result<bool, CredtrackError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM credentials WHERE fscs = ? AND id != ? AND deleted_at IS NULL",
        )
        .bind(fscs)
        .bind(except_id.unwrap_or(-1))
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    /// Soft delete and log `deleted`; false when already trashed.
    pub async fn soft_delete_credential(
        &self,
        id: i64,
        causer_id: Option<i64>,
    ) -> Result<bool, CredtrackError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            "UPDATE credentials SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        let properties = json!({ "attributes": { "deleted_at": now } });
        activity::record(&mut tx, &entry(ActivityEvent::Deleted, id, causer_id, properties))
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Restore and log `restored`; false when not trashed.
    pub async fn restore_credential(
        &self,
        id: i64,
        causer_id: Option<i64>,
    ) -> Result<bool, CredtrackError> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            "UPDATE credentials SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        let properties = json!({ "attributes": { "deleted_at": null } });
        activity::record(&mut tx, &entry(ActivityEvent::Restored, id, causer_id, properties))
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Remove permanently. The audit trail keeps its entries, plus a final
    /// `deleted` entry carrying the last attributes.
    pub async fn force_delete_credential(
        &self,
        id: i64,
        causer_id: Option<i64>,
    ) -> Result<bool, CredtrackError> {
        let mut tx = self.pool().begin().await?;
        let Some(before) = fetch_one(&mut tx, id).await? else {
            return Ok(false);
        };
        purge(&mut tx, &before, causer_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Active credentials of active users with validity in `[from, to]`.
    pub async fn expiring_credentials(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ExpiringCredential>, CredtrackError> {
        let sql = format!(
            r#"SELECT {CREDENTIAL_COLUMNS}, u.name AS user_name, u.full_name AS user_full_name,
               u.email AS user_email
               FROM credentials c JOIN users u ON u.id = c.user_id
               WHERE {active}
                 AND c.validity IS NOT NULL AND c.validity BETWEEN ? AND ?
               ORDER BY c.validity, c.id"#,
            active = scope(Trashed::Without)
        );
        let rows = sqlx::query(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                let user_name: String = row.try_get("user_name")?;
                let user_full_name: String = row.try_get("user_full_name")?;
                let user_email: String = row.try_get("user_email")?;
                Ok(ExpiringCredential {
                    credential: row_to_model(row)?,
                    user_name,
                    user_full_name,
                    user_email,
                })
            })
            .collect()
    }

    /// Credentials outside the active scope: trashed themselves or held by a trashed user.
    pub async fn count_trashed_credentials(&self) -> Result<i64, CredtrackError> {
        let sql = format!(
            "SELECT COUNT(*) FROM credentials c JOIN users u ON u.id = c.user_id WHERE {}",
            scope(Trashed::Only)
        );
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(self.pool()).await?;
        Ok(count)
    }
}
