//! Route-level access policies.
//!
//! | Policy           | Satisfied by                        |
//! |------------------|-------------------------------------|
//! | `MANAGE_PRODUCTS`| role manager                        |
//! | `ADMIN_ONLY`     | admin                               |
//! | `VIEW_PURCHASES` | view_purchases                      |
//! | `CREATE_PURCHASES`| create_purchases                   |
//! | `DELETE_PURCHASES`| delete_purchases                   |
//! | `VIEW_VENDORS`   | view_purchases or manage_vendors    |
//! | `MANAGE_VENDORS` | manage_vendors                      |
//! | `VIEW_REPORTS`   | view_reports                        |
//! | `MANAGE_USERS`   | manage_users                        |
//!
//! Admin passes every policy. Approving a purchase is checked per purchase
//! inside the repository, not here.

use tally_core::{authorize, AccessPolicy, Permission, Role, User};

use crate::error::ApiResult;
use crate::state::AppState;

pub const MANAGE_PRODUCTS: AccessPolicy =
    AccessPolicy::new("manage products").roles(&[Role::Manager]);

pub const ADMIN_ONLY: AccessPolicy = AccessPolicy::new("manage orders");

pub const VIEW_PURCHASES: AccessPolicy =
    AccessPolicy::new("view purchases").permissions(&[Permission::ViewPurchases]);

pub const CREATE_PURCHASES: AccessPolicy =
    AccessPolicy::new("create purchases").permissions(&[Permission::CreatePurchases]);

pub const DELETE_PURCHASES: AccessPolicy =
    AccessPolicy::new("delete purchases").permissions(&[Permission::DeletePurchases]);

pub const VIEW_VENDORS: AccessPolicy = AccessPolicy::new("view vendors")
    .permissions(&[Permission::ViewPurchases, Permission::ManageVendors]);

pub const MANAGE_VENDORS: AccessPolicy =
    AccessPolicy::new("manage vendors").permissions(&[Permission::ManageVendors]);

pub const VIEW_REPORTS: AccessPolicy =
    AccessPolicy::new("view reports").permissions(&[Permission::ViewReports]);

pub const MANAGE_USERS: AccessPolicy =
    AccessPolicy::new("manage users").permissions(&[Permission::ManageUsers]);

/// `Forbidden` unless `user` satisfies `policy` under the configured table.
pub fn require(state: &AppState, user: &User, policy: &AccessPolicy) -> ApiResult<()> {
    authorize(&state.permissions, user, policy).map_err(|err| {
        tracing::warn!(user_id = %user.id, role = %user.role, action = policy.action, "Access denied");
        err.into()
    })
}
