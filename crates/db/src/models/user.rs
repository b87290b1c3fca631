//! Subscriber accounts. Only the contact columns matter to delivery.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use dropbinge_core::types::{DbId, Timestamp};

/// A row from the `users` table (without the password hash).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub phone_number: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
}
