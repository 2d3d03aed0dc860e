//! OrderWindow entity - Same-day ordering cutoff per meal category.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::dish::MealCategory;

/// OrderWindow database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_windows")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Meal category the window governs
    #[sea_orm(unique)]
    pub meal_category: MealCategory,
    /// Latest time of day for same-day orders
    pub cutoff: Time,
    /// Inactive windows fall back to the default cutoff
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
