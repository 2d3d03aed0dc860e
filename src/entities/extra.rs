//! Extra entity - Meals served outside the ordering flow (visitors, interns,
//! activities). Each extra owns the canteen operation that books its cost.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Who the extra meal was served to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ExtraKind {
    /// External visitor
    #[sea_orm(string_value = "visitor")]
    Visitor,
    /// Intern without an account
    #[sea_orm(string_value = "intern")]
    Intern,
    /// Meal served for an activity or event
    #[sea_orm(string_value = "activity")]
    Activity,
}

impl ExtraKind {
    /// Label used in the description of the booked operation
    pub fn label(self) -> &'static str {
        match self {
            Self::Visitor => "Visitor",
            Self::Intern => "Intern",
            Self::Activity => "Activity",
        }
    }
}

/// Extra database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "extras")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Kind of guest
    pub kind: ExtraKind,
    /// Name of the person or activity
    pub person_name: String,
    /// Day the meal was served
    pub operation_date: Date,
    /// Dish served
    pub dish_name: String,
    /// Number of portions
    pub quantity: Decimal,
    /// Price per portion (GNF)
    pub unit_price: Decimal,
    /// `quantity * unit_price`
    pub total_amount: Decimal,
    /// Free-form notes
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Booked operation; cleared if the operation is removed elsewhere
    pub operation_id: Option<i64>,
    /// User who recorded the extra
    pub created_by: Option<i64>,
    /// When the extra was created
    pub created_at: DateTimeUtc,
    /// When the extra was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Booked operation
    #[sea_orm(
        belongs_to = "super::operation::Entity",
        from = "Column::OperationId",
        to = "super::operation::Column::Id",
        on_delete = "SetNull"
    )]
    Operation,
}

impl Related<super::operation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
