//! Forecast entity - Planned spending for one month of a category/subcategory.
//!
//! `month` always holds the first day of the month. Operations of that month
//! are reconciled against the forecast through imputations.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a forecast
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    /// Being prepared
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Approved
    #[sea_orm(string_value = "validated")]
    Validated,
    /// Month is over
    #[sea_orm(string_value = "closed")]
    Closed,
}

/// Forecast database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forecasts")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// First day of the forecast month
    pub month: Date,
    /// Category being planned
    pub category_id: i64,
    /// Optional subcategory being planned
    pub subcategory_id: Option<i64>,
    /// Planned amount (GNF)
    pub planned_amount: Decimal,
    /// Current status
    pub status: ForecastStatus,
    /// User who created the forecast
    pub created_by: Option<i64>,
    /// When the forecast was created
    pub created_at: DateTimeUtc,
    /// When the forecast was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Forecast and the classification tree
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Planned category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "Cascade"
    )]
    Category,
    /// Planned subcategory
    #[sea_orm(
        belongs_to = "super::subcategory::Entity",
        from = "Column::SubcategoryId",
        to = "super::subcategory::Column::Id",
        on_delete = "Cascade"
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
