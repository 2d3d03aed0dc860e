//! Category and subcategory business logic.
//!
//! Categories are the top of the spending classification; each owns any
//! number of subcategories. A category that operations still reference cannot
//! be deleted.

use crate::{
    entities::{Category, Operation, Subcategory, category, operation, subcategory},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;

/// Category payload
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    /// Display name, unique
    pub name: String,
    /// Short code, unique
    pub code: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
}

/// Subcategory payload
#[derive(Debug, Clone, Deserialize)]
pub struct SubcategoryInput {
    /// Parent category
    pub category_id: i64,
    /// Name, unique within the category
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
}

/// Lists all categories by name.
pub async fn list_categories(db: &DatabaseConnection) -> Result<Vec<category::Model>> {
    Category::find()
        .order_by_asc(category::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches a category by id.
pub async fn get_category<C: ConnectionTrait>(db: &C, id: i64) -> Result<category::Model> {
    Category::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Category", id))
}

/// Finds a category by its code.
pub async fn get_category_by_code<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> Result<Option<category::Model>> {
    Category::find()
        .filter(category::Column::Code.eq(code))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn ensure_unique_category<C: ConnectionTrait>(
    db: &C,
    name: &str,
    code: &str,
    except: Option<i64>,
) -> Result<()> {
    let mut query = Category::find().filter(
        category::Column::Name
            .eq(name)
            .or(category::Column::Code.eq(code)),
    );
    if let Some(id) = except {
        query = query.filter(category::Column::Id.ne(id));
    }
    if let Some(clash) = query.one(db).await? {
        return Err(Error::conflict(format!(
            "Category {} ({}) already exists",
            clash.name, clash.code
        )));
    }
    Ok(())
}

fn validate_category(input: &CategoryInput) -> Result<(String, String)> {
    let name = input.name.trim().to_string();
    let code = input.code.trim().to_uppercase();
    if name.is_empty() || code.is_empty() {
        return Err(Error::validation("Category name and code are required"));
    }
    Ok((name, code))
}

/// Creates a category; name and code must both be free.
pub async fn create_category<C: ConnectionTrait>(
    db: &C,
    input: CategoryInput,
) -> Result<category::Model> {
    let (name, code) = validate_category(&input)?;
    ensure_unique_category(db, &name, &code, None).await?;

    let now = Utc::now();
    category::ActiveModel {
        name: Set(name),
        code: Set(code),
        description: Set(input.description),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Replaces a category's fields.
pub async fn update_category(
    db: &DatabaseConnection,
    id: i64,
    input: CategoryInput,
) -> Result<category::Model> {
    let existing = get_category(db, id).await?;
    let (name, code) = validate_category(&input)?;
    ensure_unique_category(db, &name, &code, Some(id)).await?;

    let mut active: category::ActiveModel = existing.into();
    active.name = Set(name);
    active.code = Set(code);
    active.description = Set(input.description);
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

/// Deletes a category, its subcategories and forecasts.
///
/// Refused with a conflict while operations are recorded against it.
pub async fn delete_category(db: &DatabaseConnection, id: i64) -> Result<()> {
    let category = get_category(db, id).await?;
    let used = Operation::find()
        .filter(operation::Column::CategoryId.eq(id))
        .count(db)
        .await?;
    if used > 0 {
        return Err(Error::conflict(format!(
            "Category {} is used by {used} operation(s)",
            category.code
        )));
    }
    Category::delete_by_id(id).exec(db).await?;
    Ok(())
}

/// Returns the category with `code`, creating it when missing.
pub async fn ensure_category<C: ConnectionTrait>(
    db: &C,
    code: &str,
    name: &str,
) -> Result<category::Model> {
    if let Some(existing) = get_category_by_code(db, code).await? {
        return Ok(existing);
    }
    create_category(
        db,
        CategoryInput {
            name: name.to_string(),
            code: code.to_string(),
            description: String::new(),
        },
    )
    .await
}

/// Lists subcategories, optionally of one category.
pub async fn list_subcategories(
    db: &DatabaseConnection,
    category_id: Option<i64>,
) -> Result<Vec<subcategory::Model>> {
    let mut query = Subcategory::find();
    if let Some(category_id) = category_id {
        query = query.filter(subcategory::Column::CategoryId.eq(category_id));
    }
    query
        .order_by_asc(subcategory::Column::CategoryId)
        .order_by_asc(subcategory::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches a subcategory by id.
pub async fn get_subcategory<C: ConnectionTrait>(db: &C, id: i64) -> Result<subcategory::Model> {
    Subcategory::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Subcategory", id))
}

/// Checks that `subcategory_id`, when given, belongs to `category_id`.
pub async fn check_classification<C: ConnectionTrait>(
    db: &C,
    category_id: i64,
    subcategory_id: Option<i64>,
) -> Result<()> {
    get_category(db, category_id).await?;
    if let Some(subcategory_id) = subcategory_id {
        let subcategory = get_subcategory(db, subcategory_id).await?;
        if subcategory.category_id != category_id {
            return Err(Error::validation(format!(
                "Subcategory {} does not belong to category {category_id}",
                subcategory.name
            )));
        }
    }
    Ok(())
}

async fn ensure_unique_subcategory(
    db: &DatabaseConnection,
    category_id: i64,
    name: &str,
    except: Option<i64>,
) -> Result<()> {
    let mut query = Subcategory::find()
        .filter(subcategory::Column::CategoryId.eq(category_id))
        .filter(subcategory::Column::Name.eq(name));
    if let Some(id) = except {
        query = query.filter(subcategory::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(Error::conflict(format!(
            "Subcategory {name} already exists in this category"
        )));
    }
    Ok(())
}

/// Creates a subcategory.
pub async fn create_subcategory(
    db: &DatabaseConnection,
    input: SubcategoryInput,
) -> Result<subcategory::Model> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("Subcategory name is required"));
    }
    get_category(db, input.category_id).await?;
    ensure_unique_subcategory(db, input.category_id, &name, None).await?;

    let now = Utc::now();
    subcategory::ActiveModel {
        category_id: Set(input.category_id),
        name: Set(name),
        description: Set(input.description),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Replaces a subcategory's fields.
pub async fn update_subcategory(
    db: &DatabaseConnection,
    id: i64,
    input: SubcategoryInput,
) -> Result<subcategory::Model> {
    let existing = get_subcategory(db, id).await?;
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("Subcategory name is required"));
    }
    get_category(db, input.category_id).await?;
    ensure_unique_subcategory(db, input.category_id, &name, Some(id)).await?;

    let mut active: subcategory::ActiveModel = existing.into();
    active.category_id = Set(input.category_id);
    active.name = Set(name);
    active.description = Set(input.description);
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

/// Deletes a subcategory; refused while operations reference it.
pub async fn delete_subcategory(db: &DatabaseConnection, id: i64) -> Result<()> {
    let subcategory = get_subcategory(db, id).await?;
    let used = Operation::find()
        .filter(operation::Column::SubcategoryId.eq(id))
        .count(db)
        .await?;
    if used > 0 {
        return Err(Error::conflict(format!(
            "Subcategory {} is used by {used} operation(s)",
            subcategory.name
        )));
    }
    Subcategory::delete_by_id(id).exec(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{create_test_category, create_test_operation, setup_test_db};

    #[tokio::test]
    async fn test_create_category_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_category(
            &db,
            CategoryInput {
                name: "  ".to_string(),
                code: "FOOD".to_string(),
                description: String::new(),
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_codes_are_uppercased_and_unique() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_category(
            &db,
            CategoryInput {
                name: "Alimentation".to_string(),
                code: "food".to_string(),
                description: String::new(),
            },
        )
        .await?;
        assert_eq!(food.code, "FOOD");

        let clash = create_category(
            &db,
            CategoryInput {
                name: "Autre".to_string(),
                code: "FOOD".to_string(),
                description: String::new(),
            },
        )
        .await;
        assert!(matches!(clash, Err(Error::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_subcategory_unique_within_category() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let transport = create_test_category(&db, "TRANSPORT").await?;

        let input = |category_id| SubcategoryInput {
            category_id,
            name: "Divers".to_string(),
            description: String::new(),
        };
        create_subcategory(&db, input(food.id)).await?;
        create_subcategory(&db, input(transport.id)).await?;
        assert!(matches!(
            create_subcategory(&db, input(food.id)).await,
            Err(Error::Conflict { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_classification_rejects_foreign_subcategory() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let transport = create_test_category(&db, "TRANSPORT").await?;
        let taxi = create_subcategory(
            &db,
            SubcategoryInput {
                category_id: transport.id,
                name: "Taxi".to_string(),
                description: String::new(),
            },
        )
        .await?;

        assert!(check_classification(&db, transport.id, Some(taxi.id)).await.is_ok());
        assert!(matches!(
            check_classification(&db, food.id, Some(taxi.id)).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            check_classification(&db, 999, None).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_category_in_use_conflicts() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let unused = create_test_category(&db, "UNUSED").await?;
        create_test_operation(&db, food.id, "2026-01-05", 1, 1_000).await?;

        assert!(matches!(
            delete_category(&db, food.id).await,
            Err(Error::Conflict { .. })
        ));
        delete_category(&db, unused.id).await?;
        assert!(matches!(
            get_category(&db, unused.id).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_category_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let first = ensure_category(&db, "RESTAURATION", "Restauration").await?;
        let second = ensure_category(&db, "RESTAURATION", "Restauration").await?;
        assert_eq!(first.id, second.id);
        Ok(())
    }
}
