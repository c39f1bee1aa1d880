//! SQL DDL for initializing the registry database.
//! SQLite-first design; dates are stored as ISO-8601 TEXT.

/// SQLite schema with:
/// - `users` / `credentials` soft-deleted through `deleted_at`
/// - `credentials.type` / `credentials.secrecy` constrained to their codes
/// - role/permission join tables keyed by name-unique `roles` / `permissions`
/// - append-only `activity_log`
/// - `notifications` unique per (credential, validity) so reruns do not repeat
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS ranks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    abbreviation TEXT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS offices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    acronym TEXT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    api_token_hash TEXT NULL, -- SHA-256 hex of the token secret
    rank_id INTEGER NULL REFERENCES ranks(id) ON DELETE SET NULL,
    office_id INTEGER NULL REFERENCES offices(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    fscs TEXT NULL,
    type TEXT NOT NULL CHECK (type IN ('CRED', 'TCMS')),
    secrecy TEXT NOT NULL CHECK (secrecy IN ('R', 'S', 'AR')),
    credential TEXT NULL,
    concession TEXT NULL, -- YYYY-MM-DD
    validity TEXT NULL,   -- YYYY-MM-DD, derived
    observation TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_credentials_user_id ON credentials(user_id);
CREATE INDEX IF NOT EXISTS idx_credentials_validity ON credentials(validity);
CREATE INDEX IF NOT EXISTS idx_credentials_fscs ON credentials(fscs);

CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS role_has_permissions (
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS user_has_roles (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);

CREATE TABLE IF NOT EXISTS user_has_permissions (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, permission_id)
);

CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_name TEXT NOT NULL,
    event TEXT NOT NULL,
    subject_type TEXT NOT NULL,
    subject_id INTEGER NOT NULL,
    causer_id INTEGER NULL,
    properties TEXT NOT NULL, -- JSON object
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_subject ON activity_log(subject_type, subject_id);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    credential_id INTEGER NOT NULL REFERENCES credentials(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    validity TEXT NOT NULL,
    payload TEXT NOT NULL, -- JSON object
    created_at TEXT NOT NULL,
    UNIQUE (credential_id, kind, validity)
)
"#;
