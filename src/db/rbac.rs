use sqlx::SqliteConnection;
use std::collections::BTreeSet;

use crate::db::sqlite::Storage;
use crate::domain::ValidationErrors;
use crate::error::CredtrackError;

/// Replace the roles of `user_id` on `conn`. On unknown names the caller's
/// transaction must be dropped, which rolls the partial assignment back.
pub(crate) async fn replace_roles(
    conn: &mut SqliteConnection,
    user_id: i64,
    roles: &BTreeSet<String>,
) -> Result<(), CredtrackError> {
    sqlx::query("DELETE FROM user_has_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let mut unknown = Vec::new();
    for role in roles {
        let result = sqlx::query(
            "INSERT INTO user_has_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?",
        )
        .bind(user_id)
        .bind(role)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            unknown.push(role.as_str());
        }
    }
    if !unknown.is_empty() {
        return Err(ValidationErrors::single(
            "roles",
            format!("Unknown roles: {}.", unknown.join(", ")),
        )
        .into());
    }
    Ok(())
}

impl Storage {
    pub async fn list_roles(&self) -> Result<Vec<String>, CredtrackError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM roles ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn roles_of(&self, user_id: i64) -> Result<BTreeSet<String>, CredtrackError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT r.name FROM roles r
               JOIN user_has_roles ur ON ur.role_id = r.id
               WHERE ur.user_id = ?"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Direct grants plus grants inherited through roles.
    pub async fn permissions_of(&self, user_id: i64) -> Result<BTreeSet<String>, CredtrackError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT p.name FROM permissions p
               JOIN user_has_permissions up ON up.permission_id = p.id
               WHERE up.user_id = ?
               UNION
               SELECT p.name FROM permissions p
               JOIN role_has_permissions rp ON rp.permission_id = p.id
               JOIN user_has_roles ur ON ur.role_id = rp.role_id
               WHERE ur.user_id = ?"#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Replace the user's roles. Unknown role names fail validation and leave
    /// the assignment untouched.
    pub async fn sync_roles(
        &self,
        user_id: i64,
        roles: &BTreeSet<String>,
    ) -> Result<(), CredtrackError> {
        let mut tx = self.pool().begin().await?;
        replace_roles(&mut tx, user_id, roles).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Grant a single permission directly to a user.
    pub async fn grant_permission(
        &self,
        user_id: i64,
        permission: &str,
    ) -> Result<(), CredtrackError> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO user_has_permissions (user_id, permission_id)
               SELECT ?, id FROM permissions WHERE name = ?"#,
        )
        .bind(user_id)
        .bind(permission)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 && !self.permissions_of(user_id).await?.contains(permission) {
            return Err(ValidationErrors::single(
                "permission",
                format!("Unknown permission: {permission}."),
            )
            .into());
        }
        Ok(())
    }
}
