//! Menu business logic.
//!
//! A menu is created for one day with every active dish at its standard
//! price; the canteen then adjusts prices, caps and positions per dish and
//! publishes it. Publication hands out the token of the public ordering page.

use crate::{
    core::{
        audit::{self, AuditEntry},
        money::check_bounded,
    },
    entities::{
        AuditAction, Dish, MealCategory, Menu, MenuDish, Order, OrderLine, dish, menu, menu_dish,
        order_line,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// Token accepted by the public endpoints in place of a real token
pub const TODAY_TOKEN: &str = "today";

/// A menu entry with what a reader needs to order it
#[derive(Debug, Clone, Serialize)]
pub struct MenuDishView {
    /// Stored entry
    #[serde(flatten)]
    pub menu_dish: menu_dish::Model,
    /// Dish name
    pub dish_name: String,
    /// Dish description
    pub dish_description: String,
    /// Meal category of the dish
    pub meal_category: MealCategory,
    /// Portions left, `None` when uncapped
    pub remaining_stock: Option<i32>,
}

/// A menu with its entries
#[derive(Debug, Clone, Serialize)]
pub struct MenuDetail {
    /// Stored menu
    #[serde(flatten)]
    pub menu: menu::Model,
    /// Entries by position
    pub dishes: Vec<MenuDishView>,
}

/// Payload for adding a dish to a menu
#[derive(Debug, Clone, Deserialize)]
pub struct MenuDishInput {
    /// Dish to offer
    pub dish_id: i64,
    /// Price of the day; the dish's standard price when absent
    #[serde(default)]
    pub day_price: Option<Decimal>,
    /// Portion cap
    #[serde(default)]
    pub stock_cap: Option<i32>,
    /// Display position; appended when absent
    #[serde(default)]
    pub position: Option<i32>,
}

/// Payload for changing a menu entry
#[derive(Debug, Clone, Deserialize)]
pub struct MenuDishUpdate {
    /// Price of the day
    pub day_price: Decimal,
    /// Portion cap
    #[serde(default)]
    pub stock_cap: Option<i32>,
    /// Display position
    pub position: i32,
}

fn check_entry(day_price: Decimal, stock_cap: Option<i32>) -> Result<()> {
    if day_price <= Decimal::ZERO {
        return Err(Error::InvalidAmount { amount: day_price });
    }
    check_bounded(day_price)?;
    if stock_cap.is_some_and(|cap| cap < 0) {
        return Err(Error::validation("Stock cap cannot be negative"));
    }
    Ok(())
}

/// Portions of `entry` still available.
///
/// Lines of cancelled orders give their portions back. `excluding_order`
/// leaves out the lines of an order about to be replaced.
pub async fn remaining_stock<C: ConnectionTrait>(
    db: &C,
    entry: &menu_dish::Model,
    excluding_order: Option<i64>,
) -> Result<Option<i32>> {
    let Some(cap) = entry.stock_cap else {
        return Ok(None);
    };
    let lines = OrderLine::find()
        .filter(order_line::Column::MenuDishId.eq(entry.id))
        .find_also_related(Order)
        .all(db)
        .await?;
    let taken: i32 = lines
        .iter()
        .filter_map(|(line, order)| order.as_ref().map(|order| (line, order)))
        .filter(|(_, order)| order.state.holds_stock() && Some(order.id) != excluding_order)
        .map(|(line, _)| line.quantity)
        .sum();
    Ok(Some((cap - taken).max(0)))
}

async fn view_entry<C: ConnectionTrait>(
    db: &C,
    entry: menu_dish::Model,
    dish: dish::Model,
) -> Result<MenuDishView> {
    let remaining_stock = remaining_stock(db, &entry, None).await?;
    Ok(MenuDishView {
        menu_dish: entry,
        dish_name: dish.name,
        dish_description: dish.description,
        meal_category: dish.meal_category,
        remaining_stock,
    })
}

/// Loads the entries of a menu by position.
pub async fn menu_detail<C: ConnectionTrait>(db: &C, menu: menu::Model) -> Result<MenuDetail> {
    let entries = MenuDish::find()
        .filter(menu_dish::Column::MenuId.eq(menu.id))
        .find_also_related(Dish)
        .order_by_asc(menu_dish::Column::Position)
        .order_by_asc(menu_dish::Column::Id)
        .all(db)
        .await?;

    let mut dishes = Vec::with_capacity(entries.len());
    for (entry, dish) in entries {
        let dish = dish.ok_or_else(|| Error::not_found("Dish", entry.dish_id))?;
        dishes.push(view_entry(db, entry, dish).await?);
    }
    Ok(MenuDetail { menu, dishes })
}

/// Fetches a menu.
pub async fn get_menu<C: ConnectionTrait>(db: &C, id: i64) -> Result<menu::Model> {
    Menu::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Menu", id))
}

/// Fetches a menu with its entries.
pub async fn get_menu_detail(db: &DatabaseConnection, id: i64) -> Result<MenuDetail> {
    let menu = get_menu(db, id).await?;
    menu_detail(db, menu).await
}

/// The menu of `date`, if one exists.
pub async fn menu_for_date<C: ConnectionTrait>(
    db: &C,
    date: NaiveDate,
) -> Result<Option<menu::Model>> {
    Menu::find()
        .filter(menu::Column::MenuDate.eq(date))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Menus between two days (inclusive, both optional), by date.
pub async fn menus_in_range(
    db: &DatabaseConnection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<menu::Model>> {
    let mut query = Menu::find();
    if let Some(from) = from {
        query = query.filter(menu::Column::MenuDate.gte(from));
    }
    if let Some(to) = to {
        query = query.filter(menu::Column::MenuDate.lte(to));
    }
    query
        .order_by_asc(menu::Column::MenuDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates the menu of `menu_date` with every active dish.
pub async fn create_menu(
    db: &DatabaseConnection,
    menu_date: NaiveDate,
    actor: Option<i64>,
) -> Result<MenuDetail> {
    let txn = db.begin().await?;
    if menu_for_date(&txn, menu_date).await?.is_some() {
        return Err(Error::conflict(format!("A menu already exists for {menu_date}")));
    }

    let now = Utc::now();
    let menu = menu::ActiveModel {
        menu_date: Set(menu_date),
        published_at: Set(None),
        public_token: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let dishes = Dish::find()
        .filter(dish::Column::Active.eq(true))
        .order_by_asc(dish::Column::Id)
        .all(&txn)
        .await?;
    for (position, dish) in (0_i32..).zip(dishes) {
        menu_dish::ActiveModel {
            menu_id: Set(menu.id),
            dish_id: Set(dish.id),
            day_price: Set(dish.standard_price),
            stock_cap: Set(None),
            position: Set(position),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Create,
            "Menu",
            menu.id,
            format!("Menu du {menu_date}"),
        )
        .by(actor),
    )
    .await?;

    let detail = menu_detail(&txn, menu).await?;
    txn.commit().await?;
    info!("Created menu for {menu_date} with {} dish(es)", detail.dishes.len());
    Ok(detail)
}

/// Publishes a menu, generating its public token on first publication.
pub async fn publish_menu(
    db: &DatabaseConnection,
    id: i64,
    actor: Option<i64>,
) -> Result<MenuDetail> {
    let txn = db.begin().await?;
    let existing = get_menu(&txn, id).await?;
    let token = existing
        .public_token
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let mut active: menu::ActiveModel = existing.into();
    let now = Utc::now();
    active.published_at = Set(Some(now));
    active.public_token = Set(Some(token));
    active.updated_at = Set(now);
    let published = active.update(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Update,
            "Menu",
            id,
            format!("Menu du {}", published.menu_date),
        )
        .by(actor)
        .metadata(json!({ "action": "publish" })),
    )
    .await?;

    let detail = menu_detail(&txn, published).await?;
    txn.commit().await?;
    Ok(detail)
}

async fn ensure_not_ordered<C: ConnectionTrait>(db: &C, menu_dish_ids: Vec<i64>) -> Result<()> {
    if menu_dish_ids.is_empty() {
        return Ok(());
    }
    let ordered = OrderLine::find()
        .filter(order_line::Column::MenuDishId.is_in(menu_dish_ids))
        .count(db)
        .await?;
    if ordered > 0 {
        return Err(Error::conflict("Dishes of this menu have already been ordered"));
    }
    Ok(())
}

/// Deletes a menu nobody ordered from.
pub async fn delete_menu(db: &DatabaseConnection, id: i64, actor: Option<i64>) -> Result<()> {
    let txn = db.begin().await?;
    let existing = get_menu(&txn, id).await?;
    let entry_ids: Vec<i64> = MenuDish::find()
        .filter(menu_dish::Column::MenuId.eq(id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    ensure_not_ordered(&txn, entry_ids).await?;

    MenuDish::delete_many()
        .filter(menu_dish::Column::MenuId.eq(id))
        .exec(&txn)
        .await?;
    Menu::delete_by_id(id).exec(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Delete,
            "Menu",
            id,
            format!("Menu du {}", existing.menu_date),
        )
        .by(actor),
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

/// Adds a dish to a menu, or updates its entry when already there.
pub async fn add_dish_to_menu(
    db: &DatabaseConnection,
    menu_id: i64,
    input: MenuDishInput,
) -> Result<menu_dish::Model> {
    let txn = db.begin().await?;
    get_menu(&txn, menu_id).await?;
    let dish = crate::core::dish::get_dish(&txn, input.dish_id).await?;
    if !dish.active {
        return Err(Error::validation(format!("{} is not active", dish.name)));
    }
    let day_price = input.day_price.unwrap_or(dish.standard_price);
    check_entry(day_price, input.stock_cap)?;

    let existing = MenuDish::find()
        .filter(menu_dish::Column::MenuId.eq(menu_id))
        .filter(menu_dish::Column::DishId.eq(dish.id))
        .one(&txn)
        .await?;

    let saved = if let Some(existing) = existing {
        let position = input.position.unwrap_or(existing.position);
        let mut active: menu_dish::ActiveModel = existing.into();
        active.day_price = Set(day_price);
        active.stock_cap = Set(input.stock_cap);
        active.position = Set(position);
        active.update(&txn).await?
    } else {
        let position = match input.position {
            Some(position) => position,
            None => {
                let count = MenuDish::find()
                    .filter(menu_dish::Column::MenuId.eq(menu_id))
                    .count(&txn)
                    .await?;
                i32::try_from(count).unwrap_or(i32::MAX)
            }
        };
        menu_dish::ActiveModel {
            menu_id: Set(menu_id),
            dish_id: Set(dish.id),
            day_price: Set(day_price),
            stock_cap: Set(input.stock_cap),
            position: Set(position),
            ..Default::default()
        }
        .insert(&txn)
        .await?
    };

    txn.commit().await?;
    Ok(saved)
}

/// Removes an entry from a menu; refused once ordered.
pub async fn remove_dish_from_menu(
    db: &DatabaseConnection,
    menu_id: i64,
    menu_dish_id: i64,
) -> Result<()> {
    let entry = get_menu_dish(db, menu_dish_id).await?;
    if entry.menu_id != menu_id {
        return Err(Error::not_found("MenuDish", menu_dish_id));
    }
    delete_menu_dish(db, menu_dish_id).await
}

/// Lists menu entries, optionally of one menu.
pub async fn list_menu_dishes(
    db: &DatabaseConnection,
    menu_id: Option<i64>,
) -> Result<Vec<MenuDishView>> {
    let mut query = MenuDish::find();
    if let Some(menu_id) = menu_id {
        query = query.filter(menu_dish::Column::MenuId.eq(menu_id));
    }
    let entries = query
        .find_also_related(Dish)
        .order_by_asc(menu_dish::Column::MenuId)
        .order_by_asc(menu_dish::Column::Position)
        .all(db)
        .await?;

    let mut views = Vec::with_capacity(entries.len());
    for (entry, dish) in entries {
        let dish = dish.ok_or_else(|| Error::not_found("Dish", entry.dish_id))?;
        views.push(view_entry(db, entry, dish).await?);
    }
    Ok(views)
}

/// Fetches a menu entry.
pub async fn get_menu_dish<C: ConnectionTrait>(db: &C, id: i64) -> Result<menu_dish::Model> {
    MenuDish::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("MenuDish", id))
}

/// Fetches a menu entry with its dish and stock.
pub async fn get_menu_dish_view(db: &DatabaseConnection, id: i64) -> Result<MenuDishView> {
    let entry = get_menu_dish(db, id).await?;
    let dish = crate::core::dish::get_dish(db, entry.dish_id).await?;
    view_entry(db, entry, dish).await
}

/// Changes price, cap and position of an entry.
pub async fn update_menu_dish(
    db: &DatabaseConnection,
    id: i64,
    update: MenuDishUpdate,
) -> Result<menu_dish::Model> {
    let existing = get_menu_dish(db, id).await?;
    check_entry(update.day_price, update.stock_cap)?;

    let mut active: menu_dish::ActiveModel = existing.into();
    active.day_price = Set(update.day_price);
    active.stock_cap = Set(update.stock_cap);
    active.position = Set(update.position);
    active.update(db).await.map_err(Into::into)
}

/// Deletes an entry nobody ordered.
pub async fn delete_menu_dish(db: &DatabaseConnection, id: i64) -> Result<()> {
    get_menu_dish(db, id).await?;
    ensure_not_ordered(db, vec![id]).await?;
    MenuDish::delete_by_id(id).exec(db).await?;
    Ok(())
}

/// Resolves the menu behind a public token.
///
/// [`TODAY_TOKEN`] designates the menu of `today`. Unpublished menus are
/// reported as missing.
pub async fn published_menu_for_token<C: ConnectionTrait>(
    db: &C,
    token: &str,
    today: NaiveDate,
) -> Result<menu::Model> {
    let menu = if token == TODAY_TOKEN {
        menu_for_date(db, today).await?
    } else {
        Menu::find()
            .filter(menu::Column::PublicToken.eq(token))
            .one(db)
            .await?
    };

    menu.filter(|menu| menu.published_at.is_some())
        .ok_or_else(|| Error::not_found("Menu", token))
}
