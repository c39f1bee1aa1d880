//! Database module: models, schema and storage for the credential registry.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup, schema init and role seeding
//! - one file per table group with the `Storage` queries for it

pub mod activity;
pub mod credentials;
pub mod lookup;
pub mod models;
pub mod notifications;
pub mod rbac;
pub mod schema;
pub mod sqlite;
pub mod users;

pub use credentials::{CredentialFilter, ExpiringCredential};
pub use models::{CredentialView, DbActivity, DbCredential, DbNotification, DbOffice, DbRank, DbUser};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage, Trashed};
