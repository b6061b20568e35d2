//! Access Aggregate
//!
//! An [`Actor`] carries a role and, for employees, the per-section grant
//! matrix loaded from the dashboard. [`PermissionResolver`] turns that into a
//! fail-closed allow/deny for a `(section, action)` pair.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, warn};

use crate::domain::value_objects::Flag;
use crate::{Result, StorefrontError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Employee,
    /// Also the landing spot for any role string the backend invents.
    #[serde(other)]
    Customer,
}

/// Admin resource area, the key into the permission matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Section { Users, Categories, Products, Orders, Brands, Deals, Goals, Stats }

impl Section {
    /// Sections an admin may hand to employees through grants. The rest stay
    /// admin-only whatever the matrix says.
    pub fn is_delegable(self) -> bool {
        matches!(self, Self::Users | Self::Categories | Self::Products | Self::Orders)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action { View, Create, Edit, Delete }

/// Account mutations no actor may apply to themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccountChange { ChangeRole, Deactivate }

/// One row of the employee permission matrix.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission_type: String,
    #[serde(default)] pub can_view: Flag,
    #[serde(default)] pub can_create: Flag,
    #[serde(default)] pub can_edit: Flag,
    #[serde(default)] pub can_delete: Flag,
}

impl PermissionGrant {
    pub fn new(section: Section, view: bool, create: bool, edit: bool, delete: bool) -> Self {
        Self {
            permission_type: section.to_string(),
            can_view: view.into(), can_create: create.into(), can_edit: edit.into(), can_delete: delete.into(),
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View => self.can_view.get(),
            Action::Create => self.can_create.get(),
            Action::Edit => self.can_edit.get(),
            Action::Delete => self.can_delete.get(),
        }
    }

    fn intersect(&self, other: &PermissionGrant) -> PermissionGrant {
        PermissionGrant {
            permission_type: self.permission_type.clone(),
            can_view: (self.can_view.get() && other.can_view.get()).into(),
            can_create: (self.can_create.get() && other.can_create.get()).into(),
            can_edit: (self.can_edit.get() && other.can_edit.get()).into(),
            can_delete: (self.can_delete.get() && other.can_delete.get()).into(),
        }
    }
}

/// Grants keyed by section, at most one per section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PermissionGrant>", into = "Vec<PermissionGrant>")]
pub struct PermissionMatrix { grants: HashMap<Section, PermissionGrant> }

impl PermissionMatrix {
    pub fn from_grants(rows: impl IntoIterator<Item = PermissionGrant>) -> Self {
        let mut grants: HashMap<Section, PermissionGrant> = HashMap::new();
        for row in rows {
            let Ok(section) = Section::from_str(&row.permission_type) else {
                warn!(permission_type = %row.permission_type, "dropping grant for unknown section");
                continue;
            };
            if !section.is_delegable() {
                warn!(%section, "ignoring grant on admin-only section");
                continue;
            }
            match grants.get_mut(&section) {
                Some(existing) => {
                    // Duplicate rows collapse to what both of them allow.
                    warn!(%section, "duplicate grant rows, keeping the intersection");
                    *existing = existing.intersect(&row);
                }
                None => { grants.insert(section, row); }
            }
        }
        Self { grants }
    }

    pub fn grant(&self, section: Section) -> Option<&PermissionGrant> { self.grants.get(&section) }
    pub fn len(&self) -> usize { self.grants.len() }
    pub fn is_empty(&self) -> bool { self.grants.is_empty() }
}

impl From<Vec<PermissionGrant>> for PermissionMatrix {
    fn from(rows: Vec<PermissionGrant>) -> Self { Self::from_grants(rows) }
}

impl From<PermissionMatrix> for Vec<PermissionGrant> {
    fn from(matrix: PermissionMatrix) -> Self { matrix.grants.into_values().collect() }
}

/// The authenticated user an admin page is mounted for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    id: String,
    role: Role,
    grants: Arc<PermissionMatrix>,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self { Self { id: id.into(), role: Role::Admin, grants: Arc::default() } }
    pub fn employee(id: impl Into<String>, grants: impl Into<Arc<PermissionMatrix>>) -> Self {
        Self { id: id.into(), role: Role::Employee, grants: grants.into() }
    }
    pub fn customer(id: impl Into<String>) -> Self { Self { id: id.into(), role: Role::Customer, grants: Arc::default() } }

    /// Builds an actor for `role`; grants are only kept for employees.
    pub fn with_role(id: impl Into<String>, role: Role, grants: impl Into<Arc<PermissionMatrix>>) -> Self {
        match role {
            Role::Employee => Self::employee(id, grants),
            Role::Admin => Self::admin(id),
            Role::Customer => Self::customer(id),
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn role(&self) -> Role { self.role }
    pub fn grants(&self) -> &PermissionMatrix { &self.grants }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn can(&self, section: Section, action: Action) -> bool { PermissionResolver.resolve(self, section, action) }
}

/// Stateless allow/deny decisions over an [`Actor`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn resolve(&self, actor: &Actor, section: Section, action: Action) -> bool {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Employee if section.is_delegable() => {
                actor.grants.grant(section).is_some_and(|g| g.allows(action))
            }
            Role::Employee | Role::Customer => false,
        };
        debug!(actor_id = %actor.id, role = %actor.role, %section, %action, allowed, "permission resolved");
        allowed
    }

    /// Resolves a raw section key; keys outside [`Section`] are denied for everyone.
    pub fn resolve_key(&self, actor: &Actor, key: &str, action: Action) -> bool {
        match Section::from_str(key) {
            Ok(section) => self.resolve(actor, section, action),
            Err(_) => {
                debug!(actor_id = %actor.id, key, %action, "unknown section denied");
                false
            }
        }
    }

    pub fn authorize(&self, actor: &Actor, section: Section, action: Action) -> Result<()> {
        if self.resolve(actor, section, action) { Ok(()) } else { Err(StorefrontError::AccessDenied { section, action }) }
    }

    /// Role changes and deactivation: never on oneself, otherwise needs `users`
    /// view and edit.
    pub fn authorize_account_change(&self, actor: &Actor, target_id: &str, change: AccountChange) -> Result<()> {
        if actor.id == target_id {
            warn!(actor_id = %actor.id, %change, "blocked account change on own account");
            return Err(StorefrontError::SelfModification(change));
        }
        self.authorize(actor, Section::Users, Action::View)?;
        self.authorize(actor, Section::Users, Action::Edit)
    }
}
