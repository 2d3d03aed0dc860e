//! User entity - Accounts that can authenticate against the API.
//!
//! Guest users are created by public ordering; they carry no password hash and
//! therefore can never obtain a token.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name
    #[sea_orm(unique)]
    pub username: String,
    /// Contact address used for order confirmations
    pub email: Option<String>,
    /// Display name
    pub first_name: String,
    /// Salted password digest, `None` for guest users
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Staff members bypass order windows and manage users
    pub is_staff: bool,
    /// Superusers hold every privilege
    pub is_superuser: bool,
    /// Inactive users cannot authenticate
    pub is_active: bool,
    /// When the user was created
    pub created_at: DateTimeUtc,
}

/// `User` is referenced by other tables but declares no outgoing relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
