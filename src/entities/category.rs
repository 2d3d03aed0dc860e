//! Category entity - Top level of the spending classification tree.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    /// Unique identifier for the category
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable name (e.g. "Food")
    #[sea_orm(unique)]
    pub name: String,
    /// Short code used in reports (e.g. "FOOD")
    #[sea_orm(unique)]
    pub code: String,
    /// Free-form description
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// When the category was created
    pub created_at: DateTimeUtc,
    /// When the category was last modified
    pub updated_at: DateTimeUtc,
}

/// Categories are only referenced by other tables
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
