//! Database operations for the `users` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub public_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub phone: Option<&'a str>,
}

const USER_COLUMNS: &str =
    "id, public_id, email, password_hash, full_name, phone, role, created_at, updated_at";

/// Insert a customer account. The email is stored lowercase.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure, including a duplicate email.
pub async fn create_user(pool: &PgPool, user: NewUser<'_>) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, password_hash, full_name, phone) \
         VALUES (LOWER($1), $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user.email.trim())
    .bind(user.password_hash)
    .bind(user.full_name)
    .bind(user.phone)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = LOWER($1)"
    ))
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_id(pool: &PgPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Change a user's role (`customer` or `admin`).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no user has this email, or
/// [`DbError::Sqlx`] if the role violates the table check.
pub async fn set_user_role(pool: &PgPool, email: &str, role: &str) -> Result<UserRow, DbError> {
    sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET role = $2, updated_at = NOW() \
         WHERE email = LOWER($1) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(email.trim())
    .bind(role)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
