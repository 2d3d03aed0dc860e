//! Imputation entity - Allocation of part of an operation against a forecast.
//!
//! At most one imputation exists per (operation, forecast) pair.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Imputation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "imputations")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Operation being allocated
    pub operation_id: i64,
    /// Forecast receiving the allocation
    pub forecast_id: i64,
    /// Allocated amount (GNF)
    pub amount: Decimal,
    /// User who made the allocation
    pub created_by: Option<i64>,
    /// When the imputation was created
    pub created_at: DateTimeUtc,
    /// When the imputation was last modified
    pub updated_at: DateTimeUtc,
}

/// Imputations disappear with either side
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Allocated operation
    #[sea_orm(
        belongs_to = "super::operation::Entity",
        from = "Column::OperationId",
        to = "super::operation::Column::Id",
        on_delete = "Cascade"
    )]
    Operation,
    /// Receiving forecast
    #[sea_orm(
        belongs_to = "super::forecast::Entity",
        from = "Column::ForecastId",
        to = "super::forecast::Column::Id",
        on_delete = "Cascade"
    )]
    Forecast,
}

impl Related<super::operation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operation.def()
    }
}

impl Related<super::forecast::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Forecast.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
