//! Role/permission authorization.
//!
//! Permissions are plain strings (`update_credential`); a user's effective set
//! is the union of direct grants and the grants of their roles. `super_admin`
//! passes every permission check but not the user policy.

pub mod permission;
pub mod policy;

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

use crate::error::CredtrackError;
pub use permission::{Ability, OPERATOR, Permission, Resource, SUPER_ADMIN, VIEWER};

/// The authenticated user and their effective grants.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub name: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn is_super_admin(&self) -> bool {
        self.roles.contains(SUPER_ADMIN)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_super_admin() || self.permissions.contains(permission)
    }

    pub fn can(&self, ability: Ability, resource: Resource) -> bool {
        self.has_permission(&Permission::new(ability, resource).name())
    }

    /// `Forbidden` (HTTP 403) unless the grant is present.
    pub fn authorize(&self, ability: Ability, resource: Resource) -> Result<(), CredtrackError> {
        if self.can(ability, resource) {
            return Ok(());
        }
        let permission = Permission::new(ability, resource).name();
        warn!(
            target: "security",
            user_id = self.user_id,
            permission = %permission,
            "authorization denied"
        );
        Err(CredtrackError::forbidden(permission))
    }
}
