//! Operation business logic - recording expenses.
//!
//! Every write recomputes the derived columns (`amount`, `day_of_month`,
//! `iso_week`) and re-runs automatic imputation against the forecast of the
//! operation's month and classification.

use crate::{
    core::{
        audit::{self, AuditEntry},
        category::check_classification,
        forecast::{find_matching_forecast, month_start},
        imputation::{auto_impute, imputed_for_operation},
        money::{check_bounded, checked_product},
    },
    entities::{AuditAction, Imputation, Operation, imputation, operation},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

/// Operation payload
#[derive(Debug, Clone, Deserialize)]
pub struct OperationInput {
    /// Date of the expense
    pub operation_date: NaiveDate,
    /// Spending category
    pub category_id: i64,
    /// Spending subcategory
    #[serde(default)]
    pub subcategory_id: Option<i64>,
    /// Units bought, strictly positive
    pub units: Decimal,
    /// Price per unit, not negative
    pub unit_price: Decimal,
    /// Free-form description
    #[serde(default)]
    pub description: String,
}

impl OperationInput {
    fn validate(&self) -> Result<()> {
        if self.units <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "Units must be positive, got {}",
                self.units
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(Error::InvalidAmount {
                amount: self.unit_price,
            });
        }
        check_bounded(self.units)?;
        check_bounded(self.unit_price)
    }

    /// `units * unit_price`
    pub fn amount(&self) -> Result<Decimal> {
        checked_product(self.units, self.unit_price)
    }
}

/// Filters for [`list_operations`]; date bounds are inclusive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationFilter {
    /// From this day
    pub date_from: Option<NaiveDate>,
    /// Up to this day
    pub date_to: Option<NaiveDate>,
    /// Only this category
    pub category_id: Option<i64>,
    /// Only this subcategory
    pub subcategory_id: Option<i64>,
}

/// Operation with its reconciliation state
#[derive(Debug, Clone, Serialize)]
pub struct OperationView {
    /// Stored operation
    #[serde(flatten)]
    pub operation: operation::Model,
    /// Sum of the operation's imputations
    pub imputed_amount: Decimal,
    /// `amount - planned` of the matching forecast, if there is one
    pub variance: Option<Decimal>,
}

/// Fetches an operation.
pub async fn get_operation<C: ConnectionTrait>(db: &C, id: i64) -> Result<operation::Model> {
    Operation::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Operation", id))
}

/// Wraps an operation with its derived amounts.
pub async fn view<C: ConnectionTrait>(db: &C, op: operation::Model) -> Result<OperationView> {
    let imputed_amount = imputed_for_operation(db, op.id, None).await?;
    let variance =
        find_matching_forecast(db, op.operation_date, op.category_id, op.subcategory_id)
            .await?
            .map(|forecast| op.amount - forecast.planned_amount);
    Ok(OperationView {
        operation: op,
        imputed_amount,
        variance,
    })
}

/// Fetches an operation with its derived amounts.
pub async fn get_operation_view(db: &DatabaseConnection, id: i64) -> Result<OperationView> {
    let op = get_operation(db, id).await?;
    view(db, op).await
}

/// Lists operations matching `filter`, by date.
pub async fn list_operations(
    db: &DatabaseConnection,
    filter: &OperationFilter,
) -> Result<Vec<operation::Model>> {
    let mut query = Operation::find();
    if let Some(from) = filter.date_from {
        query = query.filter(operation::Column::OperationDate.gte(from));
    }
    if let Some(to) = filter.date_to {
        query = query.filter(operation::Column::OperationDate.lte(to));
    }
    if let Some(category_id) = filter.category_id {
        query = query.filter(operation::Column::CategoryId.eq(category_id));
    }
    if let Some(subcategory_id) = filter.subcategory_id {
        query = query.filter(operation::Column::SubcategoryId.eq(subcategory_id));
    }
    query
        .order_by_asc(operation::Column::OperationDate)
        .order_by_asc(operation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists operations matching `filter` with their derived amounts.
pub async fn list_operation_views(
    db: &DatabaseConnection,
    filter: &OperationFilter,
) -> Result<Vec<OperationView>> {
    let operations = list_operations(db, filter).await?;
    let mut views = Vec::with_capacity(operations.len());
    for op in operations {
        views.push(view(db, op).await?);
    }
    Ok(views)
}

/// Inserts an operation and auto-imputes it, on the caller's connection.
///
/// Used directly by order validation, which needs the operation inside its
/// own transaction; everyone else goes through [`create_operation`].
pub async fn insert_operation<C: ConnectionTrait>(
    db: &C,
    input: OperationInput,
    actor: Option<i64>,
) -> Result<operation::Model> {
    input.validate()?;
    check_classification(db, input.category_id, input.subcategory_id).await?;

    let now = Utc::now();
    let created = operation::ActiveModel {
        operation_date: Set(input.operation_date),
        day_of_month: Set(day_of_month(input.operation_date)),
        iso_week: Set(iso_week(input.operation_date)),
        category_id: Set(input.category_id),
        subcategory_id: Set(input.subcategory_id),
        units: Set(input.units),
        unit_price: Set(input.unit_price),
        amount: Set(input.amount()?),
        description: Set(input.description),
        created_by: Set(actor),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    audit::record(
        db,
        AuditEntry::new(
            AuditAction::Create,
            "Operation",
            created.id,
            describe(&created),
        )
        .by(actor)
        .changes(json!({ "after": created })),
    )
    .await?;

    auto_impute(db, &created, actor).await?;
    Ok(created)
}

/// Records an expense.
#[instrument(skip(db, input), fields(date = %input.operation_date, category = input.category_id))]
pub async fn create_operation(
    db: &DatabaseConnection,
    input: OperationInput,
    actor: Option<i64>,
) -> Result<operation::Model> {
    input.validate()?;
    let txn = db.begin().await?;
    let created = insert_operation(&txn, input, actor).await?;
    txn.commit().await?;

    info!("Recorded operation {} for {}", created.id, created.amount);
    Ok(created)
}

/// Replaces an operation's fields and reconciles it again.
///
/// When the month or classification changes, the imputation on the previous
/// matching forecast is dropped. Imputations on other forecasts are kept, and
/// the new amount must still cover them.
pub async fn update_operation(
    db: &DatabaseConnection,
    id: i64,
    input: OperationInput,
    actor: Option<i64>,
) -> Result<operation::Model> {
    input.validate()?;
    let txn = db.begin().await?;
    let updated = modify_operation(&txn, id, input, actor).await?;
    txn.commit().await?;
    Ok(updated)
}

/// [`update_operation`] on the caller's connection.
pub async fn modify_operation<C: ConnectionTrait>(
    txn: &C,
    id: i64,
    input: OperationInput,
    actor: Option<i64>,
) -> Result<operation::Model> {
    input.validate()?;
    let existing = get_operation(txn, id).await?;
    check_classification(txn, input.category_id, input.subcategory_id).await?;

    let previous_target = find_matching_forecast(
        txn,
        existing.operation_date,
        existing.category_id,
        existing.subcategory_id,
    )
    .await?;
    let key_changed = month_start(existing.operation_date) != month_start(input.operation_date)
        || existing.category_id != input.category_id
        || existing.subcategory_id != input.subcategory_id;
    if key_changed {
        if let Some(previous) = &previous_target {
            Imputation::delete_many()
                .filter(imputation::Column::OperationId.eq(id))
                .filter(imputation::Column::ForecastId.eq(previous.id))
                .exec(txn)
                .await?;
        }
    }

    let amount = input.amount()?;
    let new_target = find_matching_forecast(
        txn,
        input.operation_date,
        input.category_id,
        input.subcategory_id,
    )
    .await?;
    let kept: Decimal = Imputation::find()
        .filter(imputation::Column::OperationId.eq(id))
        .all(txn)
        .await?
        .iter()
        .filter(|row| new_target.as_ref().is_none_or(|t| t.id != row.forecast_id))
        .map(|row| row.amount)
        .sum();
    if kept > amount {
        return Err(Error::OverAllocation {
            requested: kept,
            available: amount,
        });
    }

    let mut active: operation::ActiveModel = existing.clone().into();
    active.operation_date = Set(input.operation_date);
    active.day_of_month = Set(day_of_month(input.operation_date));
    active.iso_week = Set(iso_week(input.operation_date));
    active.category_id = Set(input.category_id);
    active.subcategory_id = Set(input.subcategory_id);
    active.units = Set(input.units);
    active.unit_price = Set(input.unit_price);
    active.amount = Set(amount);
    active.description = Set(input.description);
    active.updated_at = Set(Utc::now());
    let updated = active.update(txn).await?;

    audit::record(
        txn,
        AuditEntry::new(AuditAction::Update, "Operation", id, describe(&updated))
            .by(actor)
            .changes(json!({ "before": existing, "after": updated })),
    )
    .await?;

    auto_impute(txn, &updated, actor).await?;
    Ok(updated)
}

/// Deletes an operation, on the caller's connection.
pub async fn remove_operation<C: ConnectionTrait>(
    db: &C,
    id: i64,
    actor: Option<i64>,
) -> Result<()> {
    let existing = get_operation(db, id).await?;
    Imputation::delete_many()
        .filter(imputation::Column::OperationId.eq(id))
        .exec(db)
        .await?;
    Operation::delete_by_id(id).exec(db).await?;

    audit::record(
        db,
        AuditEntry::new(AuditAction::Delete, "Operation", id, describe(&existing))
            .by(actor)
            .changes(json!({ "before": existing })),
    )
    .await?;
    Ok(())
}

/// Deletes an operation and its imputations.
pub async fn delete_operation(db: &DatabaseConnection, id: i64, actor: Option<i64>) -> Result<()> {
    let txn = db.begin().await?;
    remove_operation(&txn, id, actor).await?;
    txn.commit().await?;
    Ok(())
}

fn describe(op: &operation::Model) -> String {
    format!("Operation #{} du {} ({})", op.id, op.operation_date, op.amount)
}

#[allow(clippy::cast_possible_wrap)]
fn day_of_month(date: NaiveDate) -> i32 {
    date.day() as i32
}

#[allow(clippy::cast_possible_wrap)]
fn iso_week(date: NaiveDate) -> i32 {
    date.iso_week().week() as i32
}
