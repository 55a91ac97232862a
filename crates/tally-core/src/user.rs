//! # Users
//!
//! Identity records. A user carries a [`Role`] and nothing else about
//! authorization: effective permissions are looked up in the
//! [`PermissionTable`](crate::permission::PermissionTable) at check time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::{validate_email, validate_required_text, ValidationResult};

// =============================================================================
// Role
// =============================================================================

/// Closed set of roles.
///
/// `User` is the sales-floor role and the default for self-registration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Manager,
    Accountant,
    #[default]
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Accountant, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Accountant => "accountant",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: Role::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Department
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Department {
    Finance,
    Operations,
    Sales,
    Marketing,
    Hr,
    It,
}

// =============================================================================
// User
// =============================================================================

/// A user as the rest of the system sees it. The password hash never leaves
/// the database layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<Department>,
    pub is_active: bool,
    #[ts(as = "Option<String>")]
    pub last_login: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Validated input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<Department>,
}

impl NewUser {
    /// Trims the names and normalizes the email.
    pub fn new(
        first_name: &str,
        last_name: &str,
        email: &str,
        role: Role,
        department: Option<Department>,
    ) -> ValidationResult<Self> {
        Ok(NewUser {
            first_name: validate_required_text("firstName", first_name, 50)?,
            last_name: validate_required_text("lastName", last_name, 50)?,
            email: validate_email(email)?,
            role,
            department,
        })
    }
}

/// The caller's own edit of their name and email. Role, department and
/// activation stay with administrators.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl ProfilePatch {
    /// Applies the patch in place and returns whether anything changed.
    /// On error `user` is untouched.
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) -> ValidationResult<bool> {
        let first_name = self
            .first_name
            .as_deref()
            .map(|n| validate_required_text("firstName", n, 50))
            .transpose()?;
        let last_name = self
            .last_name
            .as_deref()
            .map(|n| validate_required_text("lastName", n, 50))
            .transpose()?;
        let email = self.email.as_deref().map(validate_email).transpose()?;

        let mut next = user.clone();
        if let Some(first_name) = first_name {
            next.first_name = first_name;
        }
        if let Some(last_name) = last_name {
            next.last_name = last_name;
        }
        if let Some(email) = email {
            next.email = email;
        }

        if next == *user {
            return Ok(false);
        }
        next.updated_at = now;
        *user = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Accountant).unwrap(), "\"accountant\"");
        let d: Department = serde_json::from_str("\"hr\"").unwrap();
        assert_eq!(d, Department::Hr);
    }

    #[test]
    fn test_profile_patch() {
        let now = Utc::now();
        let mut user = User {
            id: "u1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@shop.io".to_string(),
            role: Role::User,
            department: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        let unchanged = ProfilePatch {
            email: Some(" ADA@shop.io ".to_string()),
            ..ProfilePatch::default()
        };
        assert!(!unchanged.apply(&mut user, Utc::now()).unwrap());
        assert_eq!(user.updated_at, now);

        let bad = ProfilePatch {
            first_name: Some("Augusta".to_string()),
            email: Some("nope".to_string()),
            ..ProfilePatch::default()
        };
        assert!(bad.apply(&mut user, Utc::now()).is_err());
        assert_eq!(user.first_name, "Ada");

        let rename = ProfilePatch {
            last_name: Some(" King ".to_string()),
            ..ProfilePatch::default()
        };
        assert!(rename.apply(&mut user, Utc::now()).unwrap());
        assert_eq!(user.last_name, "King");
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_new_user_normalizes_input() {
        let user = NewUser::new(" Ada ", "Lovelace", "ADA@Shop.io", Role::User, None).unwrap();
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.email, "ada@shop.io");

        assert!(NewUser::new("", "Lovelace", "ada@shop.io", Role::User, None).is_err());
        assert!(NewUser::new("Ada", "Lovelace", "not-an-email", Role::User, None).is_err());
    }
}
