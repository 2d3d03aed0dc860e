//! Dish entity - Catalog of meals the canteen can put on a menu.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Meal a dish belongs to; also keys the order windows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum MealCategory {
    /// Morning meal
    #[sea_orm(string_value = "breakfast")]
    Breakfast,
    /// Midday meal
    #[sea_orm(string_value = "lunch")]
    Lunch,
    /// Evening meal
    #[sea_orm(string_value = "dinner")]
    Dinner,
    /// Anything in between
    #[sea_orm(string_value = "snack")]
    Snack,
}

/// Dish database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dishes")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Free-form description
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Meal category
    pub meal_category: MealCategory,
    /// Default price when added to a menu (GNF)
    pub standard_price: Decimal,
    /// Inactive dishes are not added to new menus
    pub active: bool,
    /// When the dish was created
    pub created_at: DateTimeUtc,
    /// When the dish was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
