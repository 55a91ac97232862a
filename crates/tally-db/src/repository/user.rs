//! # User Repository
//!
//! Accounts and credentials. This is the only place the password hash is
//! read: everything handed to the rest of the system is a plain [`User`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use tally_core::user::{NewUser, ProfilePatch};
use tally_core::{CoreError, Department, Page, PageRequest, Role, User};

use crate::error::{DbError, DbResult};

const USER_COLUMNS: &str = "id, first_name, last_name, email, role, department, is_active, \
                            last_login, created_at, updated_at";

/// A user together with their password hash, for credential checks.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: String,
    password_hash: String,
}

/// Changes an administrator may make to an account.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub role: Option<Role>,
    /// `Some(None)` clears the department.
    pub department: Option<Option<Department>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a new account.
    ///
    /// ## Errors
    /// `Conflict` if the email is already registered.
    pub async fn create(&self, new_user: &NewUser, password_hash: &str) -> DbResult<User> {
        debug!(email = %new_user.email, role = %new_user.role, "Creating user");

        if self.find_by_email(&new_user.email).await?.is_some() {
            return Err(CoreError::Conflict {
                field: "email",
                value: new_user.email.clone(),
            }
            .into());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            email: new_user.email.clone(),
            role: new_user.role,
            department: new_user.department,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO users (
                id, first_name, last_name, email, password_hash, role,
                department, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
            "#,
        )
        .bind(&user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(password_hash)
        .bind(user.role)
        .bind(user.department)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// ## Errors
    /// `NotFound` if no user has this id.
    pub async fn get(&self, id: &str) -> DbResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    pub async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// User and password hash by email, for login.
    pub async fn find_credentials_by_email(&self, email: &str) -> DbResult<Option<UserRecord>> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        let password_hash = self.password_hash(&user.id).await?;
        Ok(Some(UserRecord {
            user,
            password_hash,
        }))
    }

    /// User and password hash by id, for password changes.
    pub async fn get_credentials(&self, id: &str) -> DbResult<UserRecord> {
        let user = self.get(id).await?;
        let password_hash = self.password_hash(id).await?;
        Ok(UserRecord {
            user,
            password_hash,
        })
    }

    async fn password_hash(&self, id: &str) -> DbResult<String> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, password_hash FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("User", id))?;
        debug!(user_id = %row.id, "Loaded credentials");
        Ok(row.password_hash)
    }

    pub async fn update_password(&self, id: &str, password_hash: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        info!(user_id = %id, "Password changed");
        Ok(())
    }

    /// Stamps `last_login`. Does not touch `updated_at`.
    pub async fn touch_last_login(&self, id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE users SET last_login = ?2 WHERE id = ?1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Applies an administrator's changes and returns the updated user.
    pub async fn update(&self, id: &str, update: &UserUpdate) -> DbResult<User> {
        let mut user = self.get(id).await?;

        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(department) = update.department {
            user.department = department;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE users SET role = ?2, department = ?3, is_active = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&user.id)
        .bind(user.role)
        .bind(user.department)
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        info!(user_id = %id, role = %user.role, active = user.is_active, "User updated");
        Ok(user)
    }

    /// Applies the user's own name and email changes.
    ///
    /// ## Errors
    /// - `NotFound` if the user is absent
    /// - `Validation` for a blank name or malformed email
    /// - `Conflict` if the new email belongs to another account
    pub async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> DbResult<User> {
        let mut tx = self.pool.begin().await?;
        let mut user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("User", id))?;

        if !patch.apply(&mut user, Utc::now()).map_err(CoreError::from)? {
            return Ok(user);
        }

        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2")
                .bind(&user.email)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if taken > 0 {
            return Err(CoreError::Conflict {
                field: "email",
                value: user.email,
            }
            .into());
        }

        sqlx::query(
            "UPDATE users SET first_name = ?2, last_name = ?3, email = ?4, updated_at = ?5 WHERE id = ?1",
        )
        .bind(&user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %id, "Profile updated");
        Ok(user)
    }

    /// Users ordered by newest first.
    pub async fn list(&self, request: PageRequest) -> DbResult<Page<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))
        .bind(request.limit)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(users, self.count().await?, request))
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
