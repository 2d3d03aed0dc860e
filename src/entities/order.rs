//! Order entity - A user's canteen order for one day.
//!
//! The four amounts are recomputed from the lines whenever the order is
//! priced; `net = gross - subsidy` always holds for stored rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Submitted, awaiting validation
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Accepted; an operation was recorded
    #[sea_orm(string_value = "validated")]
    Validated,
    /// Withdrawn
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Served (terminal)
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

impl OrderState {
    /// States whose lines consume menu stock
    pub const fn holds_stock(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Order database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Ordering user
    pub user_id: i64,
    /// Day the meal is for
    pub order_date: Date,
    /// Current state
    pub state: OrderState,
    /// Sum of line amounts at capped prices
    pub gross_amount: Decimal,
    /// Subsidy granted by the active rule
    pub subsidy_amount: Decimal,
    /// `gross_amount - subsidy_amount`
    pub net_amount: Decimal,
    /// Price excess above the ceiling, paid separately
    pub supplement_amount: Decimal,
    /// Expense recorded when the order was validated
    pub operation_id: Option<i64>,
    /// When the order was created
    pub created_at: DateTimeUtc,
    /// When the order was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Ordering user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    /// Linked expense
    #[sea_orm(
        belongs_to = "super::operation::Entity",
        from = "Column::OperationId",
        to = "super::operation::Column::Id",
        on_delete = "SetNull"
    )]
    Operation,
    /// Ordered lines
    #[sea_orm(has_many = "super::order_line::Entity")]
    OrderLine,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::operation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operation.def()
    }
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
