//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    config::Settings,
    core::{
        auth::{self, NewUser},
        category::{self, CategoryInput},
        dish::{self, DishInput},
        forecast::{self, ForecastInput},
        menu::menu_for_date,
        operation::{self, OperationInput},
        subsidy::{self, SubsidyRuleInput},
    },
    entities::{self, MealCategory, OrderState, SubsidyKind},
    errors::Result,
};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::path::Path;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Parses a `YYYY-MM-DD` literal; panics on typos in tests.
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| panic!("bad test date {s}"))
}

/// Whole amount as a `Decimal`.
pub fn dec(amount: i64) -> Decimal {
    Decimal::from(amount)
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Settings with a fixed secret, 13:00 member cutoff, 12:30 public cutoff
/// and a 30 000 price ceiling. Invoice documents go under `invoice_dir`.
pub fn test_settings_in(invoice_dir: &Path) -> Settings {
    Settings {
        database_url: "sqlite::memory:".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        token_secret: "test-secret".to_string(),
        access_token_ttl: Duration::minutes(60),
        refresh_token_ttl: Duration::hours(24),
        cors_allowed_origins: Vec::new(),
        invoice_dir: invoice_dir.to_path_buf(),
        mail_from: "cantine@example.com".to_string(),
        default_order_cutoff: time(13, 0),
        public_order_cutoff: time(12, 30),
        subsidy_price_ceiling: dec(30_000),
        seed_config: "config.toml".into(),
        admin_username: None,
        admin_password: None,
    }
}

/// [`test_settings_in`] for tests that never render documents.
pub fn test_settings() -> Settings {
    test_settings_in(Path::new("target/test-invoices"))
}

/// Creates a user whose password is `"password"` and email `<name>@example.com`.
pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
    is_staff: bool,
) -> Result<entities::user::Model> {
    auth::create_user(
        db,
        NewUser {
            username: username.to_string(),
            password: Some("password".to_string()),
            email: Some(format!("{username}@example.com")),
            first_name: username.to_string(),
            is_staff,
            is_superuser: false,
        },
    )
    .await
}

/// Creates a category named after its code.
pub async fn create_test_category(
    db: &DatabaseConnection,
    code: &str,
) -> Result<entities::category::Model> {
    category::create_category(
        db,
        CategoryInput {
            name: format!("Category {code}"),
            code: code.to_string(),
            description: String::new(),
        },
    )
    .await
}

/// Creates a draft forecast without subcategory.
///
/// # Arguments
/// * `month` - any day of the month, `YYYY-MM-DD`
/// * `planned` - planned amount
pub async fn create_test_forecast(
    db: &DatabaseConnection,
    category_id: i64,
    month: &str,
    planned: i64,
) -> Result<entities::forecast::Model> {
    forecast::create_forecast(
        db,
        ForecastInput {
            month: date(month),
            category_id,
            subcategory_id: None,
            planned_amount: dec(planned),
            status: None,
        },
        None,
    )
    .await
}

/// Records an operation without subcategory; it auto-imputes as usual.
pub async fn create_test_operation(
    db: &DatabaseConnection,
    category_id: i64,
    day: &str,
    units: i64,
    unit_price: i64,
) -> Result<entities::operation::Model> {
    operation::create_operation(
        db,
        OperationInput {
            operation_date: date(day),
            category_id,
            subcategory_id: None,
            units: dec(units),
            unit_price: dec(unit_price),
            description: "Test operation".to_string(),
        },
        None,
    )
    .await
}

/// Creates an active lunch dish.
pub async fn create_test_dish(
    db: &DatabaseConnection,
    name: &str,
    standard_price: i64,
) -> Result<entities::dish::Model> {
    dish::create_dish(
        db,
        DishInput {
            name: name.to_string(),
            description: String::new(),
            meal_category: MealCategory::Lunch,
            standard_price: dec(standard_price),
            active: true,
        },
    )
    .await
}

/// Creates an active, open-ended subsidy rule.
pub async fn create_test_subsidy_rule(
    db: &DatabaseConnection,
    kind: SubsidyKind,
    value: i64,
    daily_cap: Option<i32>,
) -> Result<entities::subsidy_rule::Model> {
    subsidy::create_subsidy_rule(
        db,
        SubsidyRuleInput {
            name: format!("{kind:?} {value}"),
            kind,
            value: Some(dec(value)),
            daily_cap,
            active: true,
            valid_from: None,
            valid_to: None,
        },
    )
    .await
}

/// Inserts an order with the given amounts, bypassing pricing and windows.
///
/// Creates the user, a dish priced at `gross` (named after the user) on the
/// menu of `day`, and one line for it.
pub async fn insert_priced_order(
    db: &DatabaseConnection,
    username: &str,
    day: NaiveDate,
    state: OrderState,
    gross: i64,
    subsidy: i64,
    supplement: i64,
) -> Result<entities::order::Model> {
    let user = create_test_user(db, username, false).await?;
    let dish = create_test_dish(db, &format!("Plat de {username}"), gross + supplement).await?;
    let now = Utc::now();

    let menu = match menu_for_date(db, day).await? {
        Some(menu) => menu,
        None => {
            entities::menu::ActiveModel {
                menu_date: Set(day),
                published_at: Set(None),
                public_token: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };
    let entry = entities::menu_dish::ActiveModel {
        menu_id: Set(menu.id),
        dish_id: Set(dish.id),
        day_price: Set(dish.standard_price),
        stock_cap: Set(None),
        position: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let order = entities::order::ActiveModel {
        user_id: Set(user.id),
        order_date: Set(day),
        state: Set(state),
        gross_amount: Set(dec(gross)),
        subsidy_amount: Set(dec(subsidy)),
        net_amount: Set(dec(gross - subsidy)),
        supplement_amount: Set(dec(supplement)),
        operation_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    entities::order_line::ActiveModel {
        order_id: Set(order.id),
        menu_dish_id: Set(entry.id),
        quantity: Set(1),
        unit_price: Set(dish.standard_price),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(order)
}
