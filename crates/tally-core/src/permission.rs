//! # Permission Model
//!
//! Maps roles to capabilities and decides whether a user may perform an
//! action.
//!
//! ## Authorization Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      authorize(table, user, policy)                     │
//! │                                                                         │
//! │   user.role == admin ? ───────────────────────────────► ALLOW           │
//! │          │ no                                                           │
//! │          ▼                                                              │
//! │   user.role ∈ policy.roles ? ─────────────────────────► ALLOW           │
//! │          │ no                                                           │
//! │          ▼                                                              │
//! │   table[user.role] ∩ policy.permissions ≠ ∅ ? ────────► ALLOW           │
//! │          │ no                                                           │
//! │          ▼                                                              │
//! │   Forbidden(policy.action)                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`PermissionTable`] is built once at startup (defaults plus optional
//! overrides from configuration) and handed to whoever checks access. It is
//! never mutated afterwards, and permissions are never copied onto user
//! records.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::user::{Role, User};

// =============================================================================
// Permission
// =============================================================================

/// Capability strings understood by the back office.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Permission {
    ViewPurchases,
    CreatePurchases,
    ApprovePurchases,
    DeletePurchases,
    ViewReports,
    ManageVendors,
    ManageUsers,
    Sales,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::ViewPurchases,
        Permission::CreatePurchases,
        Permission::ApprovePurchases,
        Permission::DeletePurchases,
        Permission::ViewReports,
        Permission::ManageVendors,
        Permission::ManageUsers,
        Permission::Sales,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewPurchases => "view_purchases",
            Permission::CreatePurchases => "create_purchases",
            Permission::ApprovePurchases => "approve_purchases",
            Permission::DeletePurchases => "delete_purchases",
            Permission::ViewReports => "view_reports",
            Permission::ManageVendors => "manage_vendors",
            Permission::ManageUsers => "manage_users",
            Permission::Sales => "sales",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "permission".to_string(),
                allowed: Permission::ALL
                    .iter()
                    .map(|p| p.as_str().to_string())
                    .collect(),
            })
    }
}

// =============================================================================
// Permission Table
// =============================================================================

/// Immutable role → permission mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTable {
    grants: HashMap<Role, BTreeSet<Permission>>,
}

impl Default for PermissionTable {
    /// The stock table.
    ///
    /// | Role       | Permissions                                              |
    /// |------------|----------------------------------------------------------|
    /// | admin      | everything except `sales`                                |
    /// | manager    | view/create/approve purchases, view reports, vendors     |
    /// | accountant | view/create purchases, view reports                      |
    /// | user       | sales                                                    |
    fn default() -> Self {
        use Permission::*;

        let mut grants = HashMap::new();
        grants.insert(
            Role::Admin,
            BTreeSet::from([
                ViewPurchases,
                CreatePurchases,
                ApprovePurchases,
                DeletePurchases,
                ViewReports,
                ManageVendors,
                ManageUsers,
            ]),
        );
        grants.insert(
            Role::Manager,
            BTreeSet::from([
                ViewPurchases,
                CreatePurchases,
                ApprovePurchases,
                ViewReports,
                ManageVendors,
            ]),
        );
        grants.insert(
            Role::Accountant,
            BTreeSet::from([ViewPurchases, CreatePurchases, ViewReports]),
        );
        grants.insert(Role::User, BTreeSet::from([Sales]));

        PermissionTable { grants }
    }
}

impl PermissionTable {
    /// Builds a table from the defaults with whole-role replacements.
    ///
    /// Keys and values are the wire strings (`"manager"`,
    /// `"approve_purchases"`). Roles not mentioned keep their defaults. An
    /// unknown role or permission string is rejected so a typo in config
    /// fails startup instead of silently revoking access.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> CoreResult<Self> {
        let mut table = PermissionTable::default();

        for (role, permissions) in overrides {
            let role: Role = role.parse()?;
            let set = permissions
                .iter()
                .map(|p| p.parse::<Permission>())
                .collect::<Result<BTreeSet<_>, _>>()?;
            table.grants.insert(role, set);
        }

        Ok(table)
    }

    /// Permissions granted to a role. Total over [`Role`]: a role without an
    /// entry gets the empty set.
    pub fn permissions_for_role(&self, role: Role) -> BTreeSet<Permission> {
        self.grants.get(&role).cloned().unwrap_or_default()
    }

    /// Whether the user's role grants `permission`.
    ///
    /// Admin is not special-cased here. Use [`authorize`] for access checks.
    pub fn has_permission(&self, user: &User, permission: Permission) -> bool {
        self.grants
            .get(&user.role)
            .is_some_and(|set| set.contains(&permission))
    }
}

// =============================================================================
// Access Policy
// =============================================================================

/// Route-level requirement: a list of roles and a list of permissions, either
/// of which is sufficient. Admin always passes.
///
/// ## Example
/// ```rust
/// use tally_core::permission::{AccessPolicy, Permission};
/// use tally_core::user::Role;
///
/// const APPROVE: AccessPolicy = AccessPolicy::new("approve purchases")
///     .permissions(&[Permission::ApprovePurchases]);
/// const WRITE_PRODUCTS: AccessPolicy =
///     AccessPolicy::new("manage products").roles(&[Role::Manager]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub action: &'static str,
    pub roles: &'static [Role],
    pub permissions: &'static [Permission],
}

impl AccessPolicy {
    /// A policy only admins satisfy until roles or permissions are added.
    pub const fn new(action: &'static str) -> Self {
        AccessPolicy {
            action,
            roles: &[],
            permissions: &[],
        }
    }

    pub const fn roles(mut self, roles: &'static [Role]) -> Self {
        self.roles = roles;
        self
    }

    pub const fn permissions(mut self, permissions: &'static [Permission]) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Checks `user` against `policy`.
///
/// ## Errors
/// `CoreError::Forbidden` naming the policy's action.
pub fn authorize(table: &PermissionTable, user: &User, policy: &AccessPolicy) -> CoreResult<()> {
    if user.is_admin() || policy.roles.contains(&user.role) {
        return Ok(());
    }

    if policy
        .permissions
        .iter()
        .any(|p| table.has_permission(user, *p))
    {
        return Ok(());
    }

    Err(CoreError::Forbidden(policy.action.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with(role: Role) -> User {
        let now = Utc::now();
        User {
            id: "u1".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: "test@example.com".to_string(),
            role,
            department: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    const APPROVE: AccessPolicy =
        AccessPolicy::new("approve purchases").permissions(&[Permission::ApprovePurchases]);

    #[test]
    fn test_default_table() {
        let table = PermissionTable::default();

        let admin = table.permissions_for_role(Role::Admin);
        assert_eq!(admin.len(), 7);
        assert!(!admin.contains(&Permission::Sales));

        let manager = table.permissions_for_role(Role::Manager);
        assert!(manager.contains(&Permission::ApprovePurchases));
        assert!(!manager.contains(&Permission::DeletePurchases));

        let accountant = table.permissions_for_role(Role::Accountant);
        assert!(!accountant.contains(&Permission::ApprovePurchases));
        assert!(accountant.contains(&Permission::ViewReports));

        assert_eq!(
            table.permissions_for_role(Role::User),
            BTreeSet::from([Permission::Sales])
        );
    }

    #[test]
    fn test_authorize_by_permission() {
        let table = PermissionTable::default();

        assert!(authorize(&table, &user_with(Role::Manager), &APPROVE).is_ok());
        assert!(matches!(
            authorize(&table, &user_with(Role::User), &APPROVE),
            Err(CoreError::Forbidden(_))
        ));
        assert!(authorize(&table, &user_with(Role::Accountant), &APPROVE).is_err());
    }

    #[test]
    fn test_authorize_admin_always_passes() {
        let table = PermissionTable::with_overrides(&HashMap::from([(
            "admin".to_string(),
            vec![],
        )]))
        .unwrap();
        let admin_only = AccessPolicy::new("update order status");

        assert!(authorize(&table, &user_with(Role::Admin), &APPROVE).is_ok());
        assert!(authorize(&table, &user_with(Role::Admin), &admin_only).is_ok());
        assert!(authorize(&table, &user_with(Role::Manager), &admin_only).is_err());
    }

    #[test]
    fn test_authorize_by_role() {
        let table = PermissionTable::default();
        let policy = AccessPolicy::new("manage products").roles(&[Role::Manager]);

        assert!(authorize(&table, &user_with(Role::Manager), &policy).is_ok());
        assert!(authorize(&table, &user_with(Role::Accountant), &policy).is_err());
    }

    #[test]
    fn test_overrides_replace_one_role() {
        let overrides = HashMap::from([(
            "accountant".to_string(),
            vec!["approve_purchases".to_string()],
        )]);
        let table = PermissionTable::with_overrides(&overrides).unwrap();

        assert!(authorize(&table, &user_with(Role::Accountant), &APPROVE).is_ok());
        assert!(!table.has_permission(&user_with(Role::Accountant), Permission::ViewReports));
        assert!(table.has_permission(&user_with(Role::Manager), Permission::ViewReports));
    }

    #[test]
    fn test_overrides_reject_unknown_strings() {
        let bad_role = HashMap::from([("owner".to_string(), vec![])]);
        assert!(PermissionTable::with_overrides(&bad_role).is_err());

        let bad_perm = HashMap::from([("user".to_string(), vec!["refund".to_string()])]);
        assert!(PermissionTable::with_overrides(&bad_perm).is_err());
    }
}
