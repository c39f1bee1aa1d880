use tracing::warn;

use super::{Ability, Principal, Resource};
use crate::error::CredtrackError;

/// Account policy. Nobody may delete or force-delete their own account,
/// whatever their grants.
pub struct UserPolicy;

impl UserPolicy {
    pub fn can_delete(actor: &Principal, target_id: i64) -> bool {
        actor.user_id != target_id && actor.can(Ability::Delete, Resource::User)
    }

    pub fn can_force_delete(actor: &Principal, target_id: i64) -> bool {
        actor.user_id != target_id && actor.can(Ability::ForceDelete, Resource::User)
    }

    pub fn authorize_delete(
        actor: &Principal,
        target_id: i64,
        force: bool,
    ) -> Result<(), CredtrackError> {
        let allowed = if force {
            Self::can_force_delete(actor, target_id)
        } else {
            Self::can_delete(actor, target_id)
        };
        if allowed {
            return Ok(());
        }
        warn!(
            target: "security",
            user_id = actor.user_id,
            target_id,
            force,
            "user deletion denied"
        );
        let ability = if force { "force_delete_user" } else { "delete_user" };
        Err(CredtrackError::forbidden(ability))
    }
}
