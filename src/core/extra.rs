//! Canteen extras - meals served to visitors, interns or activities.
//!
//! An extra books its cost as a canteen operation in the same transaction, so
//! it reconciles against the canteen forecast like a validated order. Editing
//! the extra rewrites that operation; deleting it removes the operation too.

use crate::{
    core::{
        audit::{self, AuditEntry},
        category::ensure_category,
        money::{check_bounded, checked_product},
        operation::{
            OperationInput, get_operation, insert_operation, modify_operation, remove_operation,
        },
        order::CANTEEN_CATEGORY_CODE,
    },
    entities::{AuditAction, Extra, ExtraKind, extra},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

/// Extra payload
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraInput {
    /// Kind of guest
    pub kind: ExtraKind,
    /// Name of the person or activity
    pub person_name: String,
    /// Day the meal was served
    pub operation_date: NaiveDate,
    /// Dish served
    pub dish_name: String,
    /// Number of portions, defaults to one
    #[serde(default = "one")]
    pub quantity: Decimal,
    /// Price per portion, strictly positive
    pub unit_price: Decimal,
    /// Free-form notes
    #[serde(default)]
    pub description: String,
}

fn one() -> Decimal {
    Decimal::ONE
}

impl ExtraInput {
    fn validate(&self) -> Result<()> {
        if self.person_name.trim().is_empty() {
            return Err(Error::validation("Person name is required"));
        }
        if self.dish_name.trim().is_empty() {
            return Err(Error::validation("Dish name is required"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "Quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.unit_price <= Decimal::ZERO {
            return Err(Error::InvalidAmount {
                amount: self.unit_price,
            });
        }
        check_bounded(self.quantity)?;
        check_bounded(self.unit_price)
    }

    fn operation(&self, category_id: i64) -> OperationInput {
        OperationInput {
            operation_date: self.operation_date,
            category_id,
            subcategory_id: None,
            units: self.quantity,
            unit_price: self.unit_price,
            description: format!(
                "{} - {}: {}",
                self.kind.label(),
                self.person_name.trim(),
                self.dish_name.trim()
            ),
        }
    }
}

/// Filters for [`list_extras`]; date bounds are inclusive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtraFilter {
    /// Only this kind of guest
    pub kind: Option<ExtraKind>,
    /// From this day
    pub date_from: Option<NaiveDate>,
    /// Up to this day
    pub date_to: Option<NaiveDate>,
}

/// Fetches an extra.
pub async fn get_extra<C: ConnectionTrait>(db: &C, id: i64) -> Result<extra::Model> {
    Extra::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Extra", id))
}

/// Lists extras matching `filter`, most recent first.
pub async fn list_extras(
    db: &DatabaseConnection,
    filter: &ExtraFilter,
) -> Result<Vec<extra::Model>> {
    let mut query = Extra::find();
    if let Some(kind) = filter.kind {
        query = query.filter(extra::Column::Kind.eq(kind));
    }
    if let Some(from) = filter.date_from {
        query = query.filter(extra::Column::OperationDate.gte(from));
    }
    if let Some(to) = filter.date_to {
        query = query.filter(extra::Column::OperationDate.lte(to));
    }
    query
        .order_by_desc(extra::Column::OperationDate)
        .order_by_desc(extra::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Records an extra and books its canteen operation.
#[instrument(skip(db, input), fields(date = %input.operation_date, kind = ?input.kind))]
pub async fn create_extra(
    db: &DatabaseConnection,
    input: ExtraInput,
    actor: Option<i64>,
) -> Result<extra::Model> {
    input.validate()?;
    let total_amount = checked_product(input.quantity, input.unit_price)?;

    let txn = db.begin().await?;
    let category = ensure_category(&txn, CANTEEN_CATEGORY_CODE, "Restauration").await?;
    let op = insert_operation(&txn, input.operation(category.id), actor).await?;

    let now = Utc::now();
    let created = extra::ActiveModel {
        kind: Set(input.kind),
        person_name: Set(input.person_name.trim().to_string()),
        operation_date: Set(input.operation_date),
        dish_name: Set(input.dish_name.trim().to_string()),
        quantity: Set(input.quantity),
        unit_price: Set(input.unit_price),
        total_amount: Set(total_amount),
        description: Set(input.description),
        operation_id: Set(Some(op.id)),
        created_by: Set(actor),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Create, "Extra", created.id, describe(&created))
            .by(actor)
            .changes(json!({ "after": created })),
    )
    .await?;
    txn.commit().await?;

    info!("Recorded extra {} booked as operation {}", created.id, op.id);
    Ok(created)
}

/// Replaces an extra's fields and rewrites its operation.
///
/// An extra whose operation was deleted elsewhere gets a new one.
pub async fn update_extra(
    db: &DatabaseConnection,
    id: i64,
    input: ExtraInput,
    actor: Option<i64>,
) -> Result<extra::Model> {
    input.validate()?;
    let total_amount = checked_product(input.quantity, input.unit_price)?;

    let txn = db.begin().await?;
    let existing = get_extra(&txn, id).await?;
    let category = ensure_category(&txn, CANTEEN_CATEGORY_CODE, "Restauration").await?;
    let op = match existing.operation_id {
        Some(operation_id) => {
            let mut booked = input.operation(category.id);
            // Keep whatever classification the operation was moved to
            let current = get_operation(&txn, operation_id).await?;
            booked.category_id = current.category_id;
            booked.subcategory_id = current.subcategory_id;
            modify_operation(&txn, operation_id, booked, actor).await?
        }
        None => insert_operation(&txn, input.operation(category.id), actor).await?,
    };

    let mut active: extra::ActiveModel = existing.clone().into();
    active.kind = Set(input.kind);
    active.person_name = Set(input.person_name.trim().to_string());
    active.operation_date = Set(input.operation_date);
    active.dish_name = Set(input.dish_name.trim().to_string());
    active.quantity = Set(input.quantity);
    active.unit_price = Set(input.unit_price);
    active.total_amount = Set(total_amount);
    active.description = Set(input.description);
    active.operation_id = Set(Some(op.id));
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Update, "Extra", id, describe(&updated))
            .by(actor)
            .changes(json!({ "before": existing, "after": updated })),
    )
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Deletes an extra together with its operation and imputations.
pub async fn delete_extra(db: &DatabaseConnection, id: i64, actor: Option<i64>) -> Result<()> {
    let txn = db.begin().await?;
    let existing = get_extra(&txn, id).await?;
    Extra::delete_by_id(id).exec(&txn).await?;
    if let Some(operation_id) = existing.operation_id {
        remove_operation(&txn, operation_id, actor).await?;
    }

    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Delete, "Extra", id, describe(&existing))
            .by(actor)
            .changes(json!({ "before": existing })),
    )
    .await?;
    txn.commit().await?;
    info!("Deleted extra {id}");
    Ok(())
}

fn describe(extra: &extra::Model) -> String {
    format!(
        "{} {} on {} ({})",
        extra.kind.label(),
        extra.person_name,
        extra.operation_date,
        extra.total_amount
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{
            category::get_category_by_code, forecast::forecast_balance,
            imputation::imputed_for_operation,
        },
        entities::Operation,
        test_utils::{create_test_forecast, date, dec, setup_test_db},
    };

    fn visitor(quantity: i64, unit_price: i64) -> ExtraInput {
        ExtraInput {
            kind: ExtraKind::Visitor,
            person_name: "  Mme Camara ".to_string(),
            operation_date: date("2026-01-07"),
            dish_name: "Riz sauce arachide".to_string(),
            quantity: dec(quantity),
            unit_price: dec(unit_price),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_extra_books_canteen_operation() -> Result<()> {
        let db = setup_test_db().await?;
        let restauration = ensure_category(&db, CANTEEN_CATEGORY_CODE, "Restauration").await?;
        let forecast = create_test_forecast(&db, restauration.id, "2026-01-01", 100_000).await?;

        let created = create_extra(&db, visitor(2, 15_000), Some(1)).await?;
        assert_eq!(created.person_name, "Mme Camara");
        assert_eq!(created.total_amount, dec(30_000));

        let op = get_operation(&db, created.operation_id.unwrap()).await?;
        assert_eq!(op.category_id, restauration.id);
        assert_eq!(op.amount, dec(30_000));
        assert_eq!(op.description, "Visitor - Mme Camara: Riz sauce arachide");
        assert_eq!(imputed_for_operation(&db, op.id, None).await?, dec(30_000));
        assert_eq!(
            forecast_balance(&db, forecast.id).await?.remaining_balance,
            dec(70_000)
        );

        // Editing the extra rewrites the operation and its imputation
        let updated = update_extra(&db, created.id, visitor(1, 15_000), Some(1)).await?;
        assert_eq!(updated.operation_id, Some(op.id));
        assert_eq!(get_operation(&db, op.id).await?.amount, dec(15_000));
        assert_eq!(
            forecast_balance(&db, forecast.id).await?.remaining_balance,
            dec(85_000)
        );

        delete_extra(&db, created.id, Some(1)).await?;
        assert!(Operation::find_by_id(op.id).one(&db).await?.is_none());
        assert_eq!(
            forecast_balance(&db, forecast.id).await?.remaining_balance,
            dec(100_000)
        );
        assert!(matches!(
            delete_extra(&db, created.id, Some(1)).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_extra_creates_canteen_category() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_extra(&db, visitor(1, 12_000), None).await?;
        let op = get_operation(&db, created.operation_id.unwrap()).await?;
        let category = get_category_by_code(&db, CANTEEN_CATEGORY_CODE)
            .await?
            .unwrap();
        assert_eq!(op.category_id, category.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_extra_validation() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            create_extra(&db, visitor(0, 15_000), None).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            create_extra(&db, visitor(1, 0), None).await,
            Err(Error::InvalidAmount { .. })
        ));
        let mut nameless = visitor(1, 15_000);
        nameless.person_name = " ".to_string();
        assert!(matches!(
            create_extra(&db, nameless, None).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            create_extra(&db, visitor(1, 100_000_000), None).await,
            Err(Error::InvalidAmount { .. })
        ));
        // Nothing was booked
        assert_eq!(Operation::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_extras_filters() -> Result<()> {
        let db = setup_test_db().await?;
        create_extra(&db, visitor(1, 10_000), None).await?;
        let mut intern = visitor(1, 8_000);
        intern.kind = ExtraKind::Intern;
        intern.operation_date = date("2026-01-09");
        create_extra(&db, intern, None).await?;

        let all = list_extras(&db, &ExtraFilter::default()).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, ExtraKind::Intern);

        let interns = list_extras(
            &db,
            &ExtraFilter {
                kind: Some(ExtraKind::Intern),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(interns.len(), 1);

        let early = list_extras(
            &db,
            &ExtraFilter {
                date_to: Some(date("2026-01-08")),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].kind, ExtraKind::Visitor);
        Ok(())
    }
}
