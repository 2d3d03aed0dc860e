//! Subcategory entity - Optional second level under a category.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subcategory database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subcategories")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Parent category
    pub category_id: i64,
    /// Name, unique within the parent category
    pub name: String,
    /// Free-form description
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// When the subcategory was created
    pub created_at: DateTimeUtc,
    /// When the subcategory was last modified
    pub updated_at: DateTimeUtc,
}

/// Each subcategory belongs to one category
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Parent category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "Cascade"
    )]
    Category,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
