//! Seed data loading from config.toml
//!
//! The seed file lists the budget categories (with their subcategories) and
//! the order windows the service should start with. Seeding only inserts what
//! is missing, so editing a seeded record through the API is never undone by
//! a restart.

use crate::{
    core::auth,
    entities::{
        Category, MealCategory, OrderWindow, Subcategory, User, category, order_window,
        subcategory, user,
    },
    errors::{Error, Result},
};
use chrono::{NaiveTime, Utc};
use sea_orm::{Set, prelude::*};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Structure of the whole seed file
#[derive(Debug, Default, Deserialize)]
pub struct SeedConfig {
    /// Budget categories to create
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    /// Order windows to create
    #[serde(default)]
    pub order_windows: Vec<OrderWindowSeed>,
}

/// One category and its subcategories
#[derive(Debug, Deserialize, Clone)]
pub struct CategorySeed {
    /// Unique short code, e.g. `RESTAURATION`
    pub code: String,
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    /// Subcategory names
    #[serde(default)]
    pub subcategories: Vec<String>,
}

/// Cutoff for one meal category
#[derive(Debug, Deserialize, Clone)]
pub struct OrderWindowSeed {
    /// Meal category governed by the window
    pub meal_category: MealCategory,
    /// `HH:MM` cutoff
    pub cutoff: String,
}

/// Loads the seed file at `path`.
///
/// A missing file yields an empty configuration; unreadable or malformed
/// files are errors.
pub fn load_seed_config<P: AsRef<Path>>(path: P) -> Result<SeedConfig> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Seed file {} not found, nothing to seed", path.display());
        return Ok(SeedConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read seed file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

/// Inserts the categories, subcategories and order windows that do not exist yet.
pub async fn seed_reference_data(db: &DatabaseConnection, seed: &SeedConfig) -> Result<()> {
    let now = Utc::now();

    for entry in &seed.categories {
        let existing = Category::find()
            .filter(category::Column::Code.eq(entry.code.as_str()))
            .one(db)
            .await?;
        let category = match existing {
            Some(category) => category,
            None => {
                info!("Seeding category {}", entry.code);
                category::ActiveModel {
                    name: Set(entry.name.clone()),
                    code: Set(entry.code.clone()),
                    description: Set(entry.description.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?
            }
        };

        for name in &entry.subcategories {
            let exists = Subcategory::find()
                .filter(subcategory::Column::CategoryId.eq(category.id))
                .filter(subcategory::Column::Name.eq(name.as_str()))
                .one(db)
                .await?
                .is_some();
            if !exists {
                subcategory::ActiveModel {
                    category_id: Set(category.id),
                    name: Set(name.clone()),
                    description: Set(String::new()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
    }

    for window in &seed.order_windows {
        let cutoff: NaiveTime =
            super::settings::parse_time(&window.cutoff).ok_or_else(|| Error::Config {
                message: format!("Invalid cutoff {:?} in seed file", window.cutoff),
            })?;
        let exists = OrderWindow::find()
            .filter(order_window::Column::MealCategory.eq(window.meal_category))
            .one(db)
            .await?
            .is_some();
        if !exists {
            info!("Seeding order window {:?} at {cutoff}", window.meal_category);
            order_window::ActiveModel {
                meal_category: Set(window.meal_category),
                cutoff: Set(cutoff),
                active: Set(true),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }

    Ok(())
}

/// Creates the bootstrap superuser if both credentials are given and the
/// username is free.
pub async fn seed_admin(
    db: &DatabaseConnection,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<Option<user::Model>> {
    let (Some(username), Some(password)) = (username, password) else {
        return Ok(None);
    };

    let exists = User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Ok(None);
    }

    info!("Creating bootstrap superuser {username}");
    let admin = auth::create_user(
        db,
        auth::NewUser {
            username: username.to_string(),
            password: Some(password.to_string()),
            email: None,
            first_name: String::new(),
            is_staff: true,
            is_superuser: true,
        },
    )
    .await?;
    Ok(Some(admin))
}
