use chrono::Utc;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;

use crate::db::credentials::purge_for_user;
use crate::db::models::DbUser;
use crate::db::rbac::replace_roles;
use crate::db::sqlite::{Storage, Trashed};
use crate::domain::validation::ValidatedUser;
use crate::error::CredtrackError;

const USER_COLUMNS: &str = "u.id, u.name, u.full_name, u.email, u.api_token_hash, u.rank_id, \
                            u.office_id, u.created_at, u.updated_at, u.deleted_at";

async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> Result<Option<DbUser>, CredtrackError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

impl Storage {
    /// Insert the user together with their token hash and roles, all or nothing.
    pub async fn insert_user(
        &self,
        user: &ValidatedUser,
        api_token_hash: Option<&str>,
        roles: &BTreeSet<String>,
    ) -> Result<DbUser, CredtrackError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            r#"INSERT INTO users
               (name, full_name, email, api_token_hash, rank_id, office_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&user.name)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(api_token_hash)
        .bind(user.rank_id)
        .bind(user.office_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        replace_roles(&mut tx, id, roles).await?;

        let created = fetch_user(&mut tx, id)
            .await?
            .ok_or_else(|| CredtrackError::not_found("user", id))?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn update_user(&self, id: i64, user: &ValidatedUser) -> Result<(), CredtrackError> {
        sqlx::query(
            r#"UPDATE users SET
                name = ?, full_name = ?, email = ?, rank_id = ?, office_id = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&user.name)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.rank_id)
        .bind(user.office_id)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch by id, including soft-deleted rows.
    pub async fn get_user(&self, id: i64) -> Result<Option<DbUser>, CredtrackError> {
        let mut conn = self.pool().acquire().await?;
        fetch_user(&mut conn, id).await
    }

    pub async fn list_users(&self, trashed: Trashed) -> Result<Vec<DbUser>, CredtrackError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE {} ORDER BY u.full_name, u.id",
            trashed.clause("u")
        );
        let users = sqlx::query_as::<_, DbUser>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(users)
    }

    pub async fn set_user_token_hash(
        &self,
        id: i64,
        token_hash: &str,
    ) -> Result<(), CredtrackError> {
        sqlx::query("UPDATE users SET api_token_hash = ?, updated_at = ? WHERE id = ?")
            .bind(token_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Whether `column` (`name` or `email`) already holds `value` on another user,
    /// soft-deleted users included.
    pub async fn user_field_taken(
        &self,
        column: UserUniqueColumn,
        value: &str,
        except_id: Option<i64>,
    ) -> Result<bool, CredtrackError> {
        let sql = format!(
            "SELECT COUNT(*) FROM users WHERE lower({col}) = lower(?) AND id != ?",
            col = column.as_str()
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(value)
            .bind(except_id.unwrap_or(-1))
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }

    pub async fn count_users(&self, trashed: Trashed) -> Result<i64, CredtrackError> {
        let sql = format!("SELECT COUNT(*) FROM users u WHERE {}", trashed.clause("u"));
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(self.pool()).await?;
        Ok(count)
    }

    pub async fn active_user_exists(&self, id: i64) -> Result<bool, CredtrackError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_one(self.pool())
                .await?;
        Ok(count > 0)
    }

    /// Soft delete; returns false when the user was already trashed.
    pub async fn soft_delete_user(&self, id: i64) -> Result<bool, CredtrackError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn restore_user(&self, id: i64) -> Result<bool, CredtrackError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Permanently remove the user. Credentials are purged one by one so each
    /// leaves a forced `deleted` entry; grants and notifications cascade.
    /// Returns the number of purged credentials, or `None` for an unknown user.
    pub async fn force_delete_user(
        &self,
        id: i64,
        causer_id: Option<i64>,
    ) -> Result<Option<usize>, CredtrackError> {
        let mut tx = self.pool().begin().await?;
        if fetch_user(&mut tx, id).await?.is_none() {
            return Ok(None);
        }
        let purged = purge_for_user(&mut tx, id, causer_id).await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(purged))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserUniqueColumn {
    Name,
    Email,
}

impl UserUniqueColumn {
    fn as_str(self) -> &'static str {
        match self {
            UserUniqueColumn::Name => "name",
            UserUniqueColumn::Email => "email",
        }
    }
}
