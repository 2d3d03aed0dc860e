//! Menu entity - What the canteen serves on a given day.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Menu database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "menus")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Day the menu is served
    #[sea_orm(unique)]
    pub menu_date: Date,
    /// When the menu was published, if it was
    pub published_at: Option<DateTimeUtc>,
    /// URL-safe token for the public ordering page
    #[sea_orm(unique)]
    pub public_token: Option<String>,
    /// When the menu was created
    pub created_at: DateTimeUtc,
    /// When the menu was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
