use chrono::NaiveDate;
use tracing::{debug, info};

use crate::db::{CredentialFilter, CredentialView, DbActivity, DbCredential, Storage};
use crate::domain::validation::{CredentialInput, ValidatedCredential};
use crate::domain::{CredentialStatus, DENIED_FSCS, ValidationErrors, apply_validity};
use crate::error::CredtrackError;

const ACTIVITY_PAGE: i64 = 200;

/// Credential writes go through here so the validity hook runs before every save.
#[derive(Clone)]
pub struct CredentialService {
    storage: Storage,
}

impl CredentialService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn validate(
        &self,
        input: CredentialInput,
        except_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<ValidatedCredential, CredtrackError> {
        let valid = input.validate(today)?;
        let mut errors = ValidationErrors::new();

        if !self.storage.active_user_exists(valid.user_id).await? {
            errors.add("user_id", "The selected user is invalid.");
        }
        if let Some(fscs) = valid.fields.fscs.as_deref()
            && fscs != DENIED_FSCS
            && self.storage.fscs_taken(fscs, except_id).await?
        {
            errors.add("fscs", "The fscs has already been taken.");
        }

        errors.into_result()?;
        Ok(valid)
    }

    async fn fetch(&self, id: i64) -> Result<DbCredential, CredtrackError> {
        self.storage
            .get_credential(id)
            .await?
            .ok_or_else(|| CredtrackError::not_found("credential", id))
    }

    pub async fn create(
        &self,
        input: CredentialInput,
        causer_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<CredentialView, CredtrackError> {
        let ValidatedCredential { user_id, mut fields } = self.validate(input, None, today).await?;
        apply_validity(&mut fields, None);

        let stored = self
            .storage
            .insert_credential(user_id, &fields, causer_id)
            .await?;
        info!(
            credential_id = stored.id,
            user_id,
            kind = %stored.fields.kind,
            validity = ?stored.fields.validity,
            "credential created"
        );
        Ok(stored.into_view(today))
    }

    /// Trashed credentials must be restored before they can be edited.
    pub async fn update(
        &self,
        id: i64,
        input: CredentialInput,
        causer_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<CredentialView, CredtrackError> {
        let existing = self.fetch(id).await?;
        if existing.is_trashed() {
            return Err(CredtrackError::not_found("credential", id));
        }

        let ValidatedCredential { user_id, mut fields } =
            self.validate(input, Some(id), today).await?;
        if apply_validity(&mut fields, Some(&existing.fields)) {
            debug!(credential_id = id, validity = ?fields.validity, "validity recomputed");
        }

        let stored = self
            .storage
            .update_credential(id, user_id, &fields, causer_id)
            .await?;
        info!(credential_id = id, user_id, "credential updated");
        Ok(stored.into_view(today))
    }

    /// Trashed credentials stay viewable for history.
    pub async fn get(&self, id: i64, today: NaiveDate) -> Result<CredentialView, CredtrackError> {
        Ok(self.fetch(id).await?.into_view(today))
    }

    pub async fn list(
        &self,
        filter: CredentialFilter,
        status: Option<CredentialStatus>,
        today: NaiveDate,
    ) -> Result<Vec<CredentialView>, CredtrackError> {
        let views = self
            .storage
            .list_credentials(filter)
            .await?
            .into_iter()
            .map(|c| c.into_view(today))
            .filter(|view| status.is_none_or(|wanted| view.status == wanted))
            .collect();
        Ok(views)
    }

    pub async fn delete(&self, id: i64, causer_id: Option<i64>) -> Result<(), CredtrackError> {
        self.fetch(id).await?;
        if !self.storage.soft_delete_credential(id, causer_id).await? {
            return Err(CredtrackError::not_found("credential", id));
        }
        info!(credential_id = id, "credential deleted");
        Ok(())
    }

    pub async fn restore(
        &self,
        id: i64,
        causer_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<CredentialView, CredtrackError> {
        if !self.storage.restore_credential(id, causer_id).await? {
            return Err(CredtrackError::not_found("credential", id));
        }
        info!(credential_id = id, "credential restored");
        self.get(id, today).await
    }

    pub async fn force_delete(&self, id: i64, causer_id: Option<i64>) -> Result<(), CredtrackError> {
        if !self.storage.force_delete_credential(id, causer_id).await? {
            return Err(CredtrackError::not_found("credential", id));
        }
        info!(credential_id = id, "credential force deleted");
        Ok(())
    }

    pub async fn activity(&self, id: i64) -> Result<Vec<DbActivity>, CredtrackError> {
        self.storage
            .list_activity(Some(("credential", id)), ACTIVITY_PAGE)
            .await
    }

    pub async fn all_activity(&self) -> Result<Vec<DbActivity>, CredtrackError> {
        self.storage.list_activity(None, ACTIVITY_PAGE).await
    }
}
