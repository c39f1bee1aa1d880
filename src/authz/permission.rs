use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ability {
    ViewAny,
    View,
    Create,
    Update,
    Delete,
    Restore,
    ForceDelete,
}

impl Ability {
    pub const ALL: [Ability; 7] = [
        Ability::ViewAny,
        Ability::View,
        Ability::Create,
        Ability::Update,
        Ability::Delete,
        Ability::Restore,
        Ability::ForceDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Ability::ViewAny => "view_any",
            Ability::View => "view",
            Ability::Create => "create",
            Ability::Update => "update",
            Ability::Delete => "delete",
            Ability::Restore => "restore",
            Ability::ForceDelete => "force_delete",
        }
    }

    fn is_read(self) -> bool {
        matches!(self, Ability::ViewAny | Ability::View)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Credential,
    User,
    Rank,
    Office,
    Role,
    Activity,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Credential,
        Resource::User,
        Resource::Rank,
        Resource::Office,
        Resource::Role,
        Resource::Activity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Credential => "credential",
            Resource::User => "user",
            Resource::Rank => "rank",
            Resource::Office => "office",
            Resource::Role => "role",
            Resource::Activity => "activity",
        }
    }

    /// The activity log is append-only; it only has a listing permission.
    fn abilities(self) -> &'static [Ability] {
        match self {
            Resource::Activity => &[Ability::ViewAny],
            _ => &Ability::ALL,
        }
    }
}

/// A `<ability>_<resource>` permission string such as `force_delete_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub ability: Ability,
    pub resource: Resource,
}

impl Permission {
    pub const fn new(ability: Ability, resource: Resource) -> Self {
        Self { ability, resource }
    }

    pub fn name(&self) -> String {
        format!("{}_{}", self.ability.as_str(), self.resource.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.ability.as_str(), self.resource.as_str())
    }
}

pub const SUPER_ADMIN: &str = "super_admin";
pub const OPERATOR: &str = "operator";
pub const VIEWER: &str = "viewer";

/// Every permission the application checks.
pub fn all_permissions() -> Vec<Permission> {
    Resource::ALL
        .into_iter()
        .flat_map(|resource| {
            resource
                .abilities()
                .iter()
                .map(move |&ability| Permission::new(ability, resource))
        })
        .collect()
}

/// A role seeded on schema init.
#[derive(Debug, Clone, Serialize)]
pub struct RoleSeed {
    pub name: &'static str,
    pub permissions: BTreeSet<String>,
}

/// `super_admin` carries every grant (and also bypasses checks), `operator`
/// manages credentials short of force-deleting them, `viewer` reads.
pub fn default_roles() -> Vec<RoleSeed> {
    let all = all_permissions();

    let super_admin = all.iter().map(Permission::name).collect();

    let operator = all
        .iter()
        .filter(|p| match p.resource {
            Resource::Credential => p.ability != Ability::ForceDelete,
            Resource::User | Resource::Rank | Resource::Office | Resource::Activity => {
                p.ability.is_read()
            }
            Resource::Role => false,
        })
        .map(Permission::name)
        .collect();

    let viewer = all
        .iter()
        .filter(|p| p.ability.is_read() && p.resource != Resource::Role)
        .map(Permission::name)
        .collect();

    vec![
        RoleSeed {
            name: SUPER_ADMIN,
            permissions: super_admin,
        },
        RoleSeed {
            name: OPERATOR,
            permissions: operator,
        },
        RoleSeed {
            name: VIEWER,
            permissions: viewer,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_follow_ability_resource() {
        assert_eq!(
            Permission::new(Ability::ForceDelete, Resource::User).name(),
            "force_delete_user"
        );
        assert_eq!(
            Permission::new(Ability::ViewAny, Resource::Activity).to_string(),
            "view_any_activity"
        );
    }

    #[test]
    fn activity_only_has_listing_permission() {
        let names: Vec<String> = all_permissions().iter().map(Permission::name).collect();
        assert!(names.contains(&"view_any_activity".to_string()));
        assert!(!names.contains(&"delete_activity".to_string()));
        assert_eq!(names.len(), 5 * 7 + 1);
    }

    #[test]
    fn operator_cannot_force_delete_or_manage_users() {
        let roles = default_roles();
        let operator = roles.iter().find(|r| r.name == OPERATOR).unwrap();
        assert!(operator.permissions.contains("delete_credential"));
        assert!(operator.permissions.contains("restore_credential"));
        assert!(!operator.permissions.contains("force_delete_credential"));
        assert!(operator.permissions.contains("view_any_user"));
        assert!(!operator.permissions.contains("delete_user"));

        let viewer = roles.iter().find(|r| r.name == VIEWER).unwrap();
        assert!(viewer.permissions.iter().all(|p| p.starts_with("view")));
    }
}
