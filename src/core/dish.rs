//! Dish catalog business logic.

use crate::{
    core::money::check_bounded,
    entities::{Dish, MealCategory, MenuDish, dish, menu_dish},
    errors::{Error, Result},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;

/// Dish payload
#[derive(Debug, Clone, Deserialize)]
pub struct DishInput {
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Meal category
    pub meal_category: MealCategory,
    /// Default menu price, strictly positive
    pub standard_price: Decimal,
    /// Defaults to active
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Filters for [`list_dishes`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DishFilter {
    /// Only active or inactive dishes
    pub active: Option<bool>,
    /// Only this meal category
    pub meal_category: Option<MealCategory>,
}

fn validate(input: &DishInput) -> Result<String> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("Dish name is required"));
    }
    if input.standard_price <= Decimal::ZERO {
        return Err(Error::InvalidAmount {
            amount: input.standard_price,
        });
    }
    check_bounded(input.standard_price)?;
    Ok(name)
}

/// Lists dishes by name.
pub async fn list_dishes(db: &DatabaseConnection, filter: &DishFilter) -> Result<Vec<dish::Model>> {
    let mut query = Dish::find();
    if let Some(active) = filter.active {
        query = query.filter(dish::Column::Active.eq(active));
    }
    if let Some(meal_category) = filter.meal_category {
        query = query.filter(dish::Column::MealCategory.eq(meal_category));
    }
    query
        .order_by_asc(dish::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches a dish.
pub async fn get_dish<C: ConnectionTrait>(db: &C, id: i64) -> Result<dish::Model> {
    Dish::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Dish", id))
}

/// Adds a dish to the catalog.
pub async fn create_dish<C: ConnectionTrait>(db: &C, input: DishInput) -> Result<dish::Model> {
    let name = validate(&input)?;
    let now = Utc::now();
    dish::ActiveModel {
        name: Set(name),
        description: Set(input.description),
        meal_category: Set(input.meal_category),
        standard_price: Set(input.standard_price),
        active: Set(input.active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Replaces a dish's fields. Menus keep the day price they were given.
pub async fn update_dish(db: &DatabaseConnection, id: i64, input: DishInput) -> Result<dish::Model> {
    let existing = get_dish(db, id).await?;
    let name = validate(&input)?;

    let mut active: dish::ActiveModel = existing.into();
    active.name = Set(name);
    active.description = Set(input.description);
    active.meal_category = Set(input.meal_category);
    active.standard_price = Set(input.standard_price);
    active.active = Set(input.active);
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

/// Deletes a dish that no menu uses; deactivate it otherwise.
pub async fn delete_dish(db: &DatabaseConnection, id: i64) -> Result<()> {
    let dish = get_dish(db, id).await?;
    let used = MenuDish::find()
        .filter(menu_dish::Column::DishId.eq(id))
        .count(db)
        .await?;
    if used > 0 {
        return Err(Error::conflict(format!(
            "{} is on {used} menu(s); deactivate it instead",
            dish.name
        )));
    }
    Dish::delete_by_id(id).exec(db).await?;
    Ok(())
}
