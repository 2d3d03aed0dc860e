//! Database configuration module.
//!
//! Handles the sea-orm connection and schema creation. Tables are generated
//! from the entity definitions with `Schema::create_table_from_entity`; the
//! composite unique constraints that entities cannot express are added as
//! separate indexes afterwards. Every statement is idempotent so startup can
//! run it against an existing database.

use crate::entities::{
    AuditLog, Category, Dish, Extra, Forecast, Imputation, Invoice, Menu, MenuDish, Operation,
    Order, OrderLine, OrderWindow, Subcategory, SubsidyRule, User, UserPermission, imputation,
    menu_dish, order, subcategory, user_permission,
};
use crate::errors::Result;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
    sea_query::{Index, IndexCreateStatement},
};
use std::path::Path;
use tracing::{debug, info};

/// Establishes a connection to the database at `database_url`.
///
/// For file-backed `SQLite` URLs the parent directory is created first so a
/// fresh checkout can start without manual setup.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(path) = sqlite_file_path(database_url) {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    info!("Connecting to database");
    Database::connect(database_url).await.map_err(Into::into)
}

fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next()?;
    (!path.is_empty() && path != ":memory:").then_some(path)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

async fn create_index<C: ConnectionTrait>(db: &C, statement: &IndexCreateStatement) -> Result<()> {
    let builder = db.get_database_backend();
    db.execute(builder.build(statement)).await?;
    Ok(())
}

/// Creates all tables and composite unique indexes.
///
/// Parents are created before children so foreign keys resolve.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, UserPermission).await?;
    create_table(db, &schema, Category).await?;
    create_table(db, &schema, Subcategory).await?;
    create_table(db, &schema, Forecast).await?;
    create_table(db, &schema, Operation).await?;
    create_table(db, &schema, Imputation).await?;
    create_table(db, &schema, Dish).await?;
    create_table(db, &schema, Menu).await?;
    create_table(db, &schema, MenuDish).await?;
    create_table(db, &schema, Order).await?;
    create_table(db, &schema, OrderLine).await?;
    create_table(db, &schema, SubsidyRule).await?;
    create_table(db, &schema, OrderWindow).await?;
    create_table(db, &schema, Invoice).await?;
    create_table(db, &schema, Extra).await?;
    create_table(db, &schema, AuditLog).await?;

    // Forecast uniqueness involves a nullable column, which SQL unique
    // indexes do not cover; core::forecast enforces it instead.
    create_index(
        db,
        Index::create()
            .name("idx_subcategories_category_name")
            .table(Subcategory)
            .col(subcategory::Column::CategoryId)
            .col(subcategory::Column::Name)
            .unique()
            .if_not_exists(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("idx_imputations_operation_forecast")
            .table(Imputation)
            .col(imputation::Column::OperationId)
            .col(imputation::Column::ForecastId)
            .unique()
            .if_not_exists(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("idx_menu_dishes_menu_dish")
            .table(MenuDish)
            .col(menu_dish::Column::MenuId)
            .col(menu_dish::Column::DishId)
            .unique()
            .if_not_exists(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("idx_orders_user_date")
            .table(Order)
            .col(order::Column::UserId)
            .col(order::Column::OrderDate)
            .unique()
            .if_not_exists(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("idx_user_permissions_user_feature")
            .table(UserPermission)
            .col(user_permission::Column::UserId)
            .col(user_permission::Column::Feature)
            .unique()
            .if_not_exists(),
    )
    .await?;

    debug!("Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{forecast, invoice, order, user};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<user::Model> = User::find().limit(1).all(&db).await?;
        let _: Vec<forecast::Model> = Forecast::find().limit(1).all(&db).await?;
        let _: Vec<order::Model> = Order::find().limit(1).all(&db).await?;
        let _: Vec<invoice::Model> = Invoice::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite://data/app.sqlite?mode=rwc"),
            Some("data/app.sqlite")
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
    }
}
