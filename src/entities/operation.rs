//! Operation entity - One recorded expense.
//!
//! `amount`, `day_of_month` and `iso_week` are derived from the other columns
//! by the service layer on every write.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "operations")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Date of the expense
    pub operation_date: Date,
    /// Day of month of `operation_date` (1-31)
    pub day_of_month: i32,
    /// ISO week number of `operation_date` (1-53)
    pub iso_week: i32,
    /// Spending category
    pub category_id: i64,
    /// Optional spending subcategory
    pub subcategory_id: Option<i64>,
    /// Number of units bought
    pub units: Decimal,
    /// Price per unit (GNF)
    pub unit_price: Decimal,
    /// `units * unit_price`
    pub amount: Decimal,
    /// Free-form description
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// User who recorded the operation
    pub created_by: Option<i64>,
    /// When the operation was created
    pub created_at: DateTimeUtc,
    /// When the operation was last modified
    pub updated_at: DateTimeUtc,
}

/// Operations reference the classification tree, which may not be deleted under them
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Spending category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "Restrict"
    )]
    Category,
    /// Spending subcategory
    #[sea_orm(
        belongs_to = "super::subcategory::Entity",
        from = "Column::SubcategoryId",
        to = "super::subcategory::Column::Id",
        on_delete = "Restrict"
    )]
    Subcategory,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::subcategory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subcategory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
