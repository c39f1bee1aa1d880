use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

use crate::authz::permission::{all_permissions, default_roles};
use crate::db::schema::SQLITE_INIT;
use crate::error::CredtrackError;

pub type SqlitePool = Pool<Sqlite>;

/// Soft-delete scope for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trashed {
    /// Active rows only.
    #[default]
    Without,
    /// Active and soft-deleted rows.
    With,
    /// Soft-deleted rows only.
    Only,
}

impl Trashed {
    /// `WHERE`-clause fragment for the given table alias.
    pub(crate) fn clause(self, alias: &str) -> String {
        match self {
            Trashed::Without => format!("{alias}.deleted_at IS NULL"),
            Trashed::With => "1 = 1".to_string(),
            Trashed::Only => format!("{alias}.deleted_at IS NOT NULL"),
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database, apply the schema and seed roles.
    pub async fn connect(database_url: &str) -> Result<Self, CredtrackError> {
        let in_memory = database_url.contains(":memory:");
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        if !in_memory {
            let parent = connect_opts.get_filename().parent().map(|p| p.to_path_buf());
            if let Some(parent) = parent.filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Each in-memory connection is its own database; pin a single one for the pool's lifetime.
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };
        let pool = pool_opts.connect_with(connect_opts).await?;

        let storage = Self::new(pool);
        storage.init_schema().await?;
        storage.seed_authorization().await?;
        info!(in_memory, "database ready");
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), CredtrackError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert every known permission and the default roles. Idempotent.
    pub async fn seed_authorization(&self) -> Result<(), CredtrackError> {
        let mut tx = self.pool.begin().await?;

        for permission in all_permissions() {
            sqlx::query("INSERT OR IGNORE INTO permissions (name) VALUES (?)")
                .bind(permission.name())
                .execute(&mut *tx)
                .await?;
        }

        for role in default_roles() {
            sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
                .bind(role.name)
                .execute(&mut *tx)
                .await?;
            for permission in &role.permissions {
                sqlx::query(
                    r#"INSERT OR IGNORE INTO role_has_permissions (role_id, permission_id)
                       SELECT r.id, p.id FROM roles r, permissions p
                       WHERE r.name = ? AND p.name = ?"#,
                )
                .bind(role.name)
                .bind(permission)
                .execute(&mut *tx)
                .await?;
            }
            debug!(role = role.name, grants = role.permissions.len(), "role seeded");
        }

        tx.commit().await?;
        Ok(())
    }
}
