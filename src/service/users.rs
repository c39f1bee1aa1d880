use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::authz::Principal;
use crate::db::users::UserUniqueColumn;
use crate::db::{CredentialFilter, CredentialView, DbNotification, DbUser, Storage, Trashed};
use crate::domain::validation::{UserInput, ValidatedUser};
use crate::domain::ValidationErrors;
use crate::error::CredtrackError;
use crate::service::tokens::{self, IssuedToken};

/// A user with roles and active credentials, as shown on the detail page.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: DbUser,
    pub roles: BTreeSet<String>,
    pub credentials: Vec<CredentialView>,
}

/// Returned once on creation or token rotation.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithToken {
    #[serde(flatten)]
    pub user: DbUser,
    pub token: String,
}

#[derive(Clone)]
pub struct UserService {
    storage: Storage,
}

impl UserService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn validate(
        &self,
        input: UserInput,
        except_id: Option<i64>,
    ) -> Result<ValidatedUser, CredtrackError> {
        let user = input.validate()?;
        let mut errors = ValidationErrors::new();

        if self
            .storage
            .user_field_taken(UserUniqueColumn::Name, &user.name, except_id)
            .await?
        {
            errors.add("name", "The name has already been taken.");
        }
        if self
            .storage
            .user_field_taken(UserUniqueColumn::Email, &user.email, except_id)
            .await?
        {
            errors.add("email", "The email has already been taken.");
        }
        if let Some(rank_id) = user.rank_id
            && !self.storage.rank_exists(rank_id).await?
        {
            errors.add("rank_id", "The selected rank is invalid.");
        }
        if let Some(office_id) = user.office_id
            && !self.storage.office_exists(office_id).await?
        {
            errors.add("office_id", "The selected office is invalid.");
        }

        errors.into_result()?;
        Ok(user)
    }

    /// Create a user with a first API token and the given roles in one transaction.
    pub async fn create(
        &self,
        input: UserInput,
        roles: &BTreeSet<String>,
    ) -> Result<UserWithToken, CredtrackError> {
        let user = self.validate(input, None).await?;
        let secret = tokens::new_secret();
        let created = self
            .storage
            .insert_user(&user, Some(&tokens::hash_secret(&secret)), roles)
            .await?;
        info!(target: "audit", user_id = created.id, ?roles, "user created");
        info!(target: "security", user_id = created.id, "api token issued");
        Ok(UserWithToken {
            token: tokens::plain(created.id, &secret),
            user: created,
        })
    }

    pub async fn update(&self, id: i64, input: UserInput) -> Result<DbUser, CredtrackError> {
        self.get(id).await?;
        let user = self.validate(input, Some(id)).await?;
        self.storage.update_user(id, &user).await?;
        info!(target: "audit", user_id = id, "user updated");
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<DbUser, CredtrackError> {
        self.storage
            .get_user(id)
            .await?
            .ok_or_else(|| CredtrackError::not_found("user", id))
    }

    pub async fn detail(&self, id: i64, today: NaiveDate) -> Result<UserDetail, CredtrackError> {
        let user = self.get(id).await?;
        let roles = self.storage.roles_of(id).await?;
        let credentials = self
            .storage
            .list_credentials(CredentialFilter {
                trashed: Trashed::Without,
                user_id: Some(id),
            })
            .await?
            .into_iter()
            .map(|c| c.into_view(today))
            .collect();
        Ok(UserDetail {
            user,
            roles,
            credentials,
        })
    }

    pub async fn list(&self, trashed: Trashed) -> Result<Vec<DbUser>, CredtrackError> {
        self.storage.list_users(trashed).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), CredtrackError> {
        if !self.storage.soft_delete_user(id).await? {
            return Err(CredtrackError::not_found("user", id));
        }
        info!(target: "audit", user_id = id, "user deleted");
        Ok(())
    }

    pub async fn restore(&self, id: i64) -> Result<DbUser, CredtrackError> {
        if !self.storage.restore_user(id).await? {
            return Err(CredtrackError::not_found("user", id));
        }
        info!(target: "audit", user_id = id, "user restored");
        self.get(id).await
    }

    /// Remove the user for good, purging their credentials with audit entries.
    pub async fn force_delete(&self, id: i64, causer_id: Option<i64>) -> Result<(), CredtrackError> {
        let Some(credentials) = self.storage.force_delete_user(id, causer_id).await? else {
            return Err(CredtrackError::not_found("user", id));
        };
        info!(target: "audit", user_id = id, credentials, "user force deleted");
        Ok(())
    }

    pub async fn sync_roles(
        &self,
        id: i64,
        roles: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, CredtrackError> {
        self.get(id).await?;
        self.storage.sync_roles(id, roles).await?;
        info!(target: "audit", user_id = id, ?roles, "roles synced");
        self.storage.roles_of(id).await
    }

    pub async fn notifications(&self, id: i64) -> Result<Vec<DbNotification>, CredtrackError> {
        self.get(id).await?;
        self.storage.notifications_for_user(id).await
    }

    /// Replace the user's token; the previous one stops working immediately.
    pub async fn rotate_token(&self, id: i64) -> Result<IssuedToken, CredtrackError> {
        let issued = tokens::issue(id);
        self.storage.set_user_token_hash(id, &issued.hash).await?;
        info!(target: "security", user_id = id, "api token issued");
        Ok(issued)
    }

    /// Resolve a bearer token to an active user and their grants.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, CredtrackError> {
        let Some((user_id, secret)) = tokens::parse(token) else {
            warn!(target: "security", "malformed api token");
            return Err(CredtrackError::Unauthorized);
        };

        let user = self
            .storage
            .get_user(user_id)
            .await?
            .filter(|u| !u.is_trashed());
        let verified = user.as_ref().is_some_and(|u| {
            u.api_token_hash
                .as_deref()
                .is_some_and(|hash| tokens::verify(secret, hash))
        });
        let Some(user) = user.filter(|_| verified) else {
            warn!(target: "security", user_id, "api token rejected");
            return Err(CredtrackError::Unauthorized);
        };

        Ok(Principal {
            user_id: user.id,
            name: user.name,
            roles: self.storage.roles_of(user_id).await?,
            permissions: self.storage.permissions_of(user_id).await?,
        })
    }
}
