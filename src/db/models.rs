use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::domain::{CredentialFields, CredentialStatus, StatusColor, derive_status};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbRank {
    pub id: i64,
    pub name: String,
    pub abbreviation: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbOffice {
    pub id: i64,
    pub name: String,
    pub acronym: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip)]
    pub api_token_hash: Option<String>,
    pub rank_id: Option<i64>,
    pub office_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DbUser {
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbCredential {
    pub id: i64,
    pub user_id: i64,
    #[serde(flatten)]
    pub fields: CredentialFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DbCredential {
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn status(&self, today: NaiveDate) -> CredentialStatus {
        derive_status(&self.fields, today)
    }

    pub fn into_view(self, today: NaiveDate) -> CredentialView {
        let status = self.status(today);
        CredentialView {
            status,
            status_color: status.color(),
            credential: self,
        }
    }
}

/// API representation: stored row plus the derived status.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CredentialView {
    #[serde(flatten)]
    pub credential: DbCredential,
    pub status: CredentialStatus,
    pub status_color: StatusColor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbActivity {
    pub id: i64,
    pub log_name: String,
    pub event: String,
    pub subject_type: String,
    pub subject_id: i64,
    pub causer_id: Option<i64>,
    #[sqlx(json)]
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbNotification {
    pub id: i64,
    pub user_id: i64,
    pub credential_id: i64,
    pub kind: String,
    pub validity: NaiveDate,
    #[sqlx(json)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}
