//! Forecast business logic.
//!
//! A forecast plans spending for one month of a category, optionally narrowed
//! to a subcategory. Imputations draw on it; the planned amount can grow or
//! shrink but never below what is already imputed.

use crate::{
    core::{
        audit::{self, AuditEntry},
        category::check_classification,
        imputation::imputed_for_forecast,
        money::check_bounded,
    },
    entities::{AuditAction, Forecast, ForecastStatus, forecast},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Forecast payload
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastInput {
    /// Any day of the planned month
    pub month: NaiveDate,
    /// Planned category
    pub category_id: i64,
    /// Planned subcategory
    #[serde(default)]
    pub subcategory_id: Option<i64>,
    /// Planned amount, strictly positive
    pub planned_amount: Decimal,
    /// Defaults to draft
    #[serde(default)]
    pub status: Option<ForecastStatus>,
}

/// Filters for [`list_forecasts`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastFilter {
    /// Any day of the month to list
    pub month: Option<NaiveDate>,
    /// Only this category
    pub category_id: Option<i64>,
    /// Only this status
    pub status: Option<ForecastStatus>,
}

/// Planned, imputed and remaining amounts of a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForecastBalance {
    /// Forecast id
    pub forecast_id: i64,
    /// Planned amount
    pub planned_amount: Decimal,
    /// Sum of imputations
    pub imputed_amount: Decimal,
    /// `planned_amount - imputed_amount`
    pub remaining_balance: Decimal,
}

/// Forecast with its derived amounts
#[derive(Debug, Clone, Serialize)]
pub struct ForecastView {
    /// Stored forecast
    #[serde(flatten)]
    pub forecast: forecast::Model,
    /// Sum of imputations
    pub imputed_amount: Decimal,
    /// What is left to impute
    pub remaining_balance: Decimal,
}

/// Finds the forecast of `month` for exactly this category/subcategory pair.
///
/// A `None` subcategory only matches forecasts without a subcategory.
pub async fn find_matching_forecast<C: ConnectionTrait>(
    db: &C,
    month: NaiveDate,
    category_id: i64,
    subcategory_id: Option<i64>,
) -> Result<Option<forecast::Model>> {
    let query = Forecast::find()
        .filter(forecast::Column::Month.eq(month_start(month)))
        .filter(forecast::Column::CategoryId.eq(category_id));
    let query = match subcategory_id {
        Some(id) => query.filter(forecast::Column::SubcategoryId.eq(id)),
        None => query.filter(forecast::Column::SubcategoryId.is_null()),
    };
    query.one(db).await.map_err(Into::into)
}

/// Fetches a forecast by id.
pub async fn get_forecast<C: ConnectionTrait>(db: &C, id: i64) -> Result<forecast::Model> {
    Forecast::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Forecast", id))
}

/// Computes the balance of a forecast, ignoring the imputation `excluding`.
pub async fn balance_of<C: ConnectionTrait>(
    db: &C,
    forecast: &forecast::Model,
    excluding: Option<i64>,
) -> Result<ForecastBalance> {
    let imputed = imputed_for_forecast(db, forecast.id, excluding).await?;
    Ok(ForecastBalance {
        forecast_id: forecast.id,
        planned_amount: forecast.planned_amount,
        imputed_amount: imputed,
        remaining_balance: forecast.planned_amount - imputed,
    })
}

/// Balance of forecast `id`.
pub async fn forecast_balance(db: &DatabaseConnection, id: i64) -> Result<ForecastBalance> {
    let forecast = get_forecast(db, id).await?;
    balance_of(db, &forecast, None).await
}

/// Wraps a forecast with its balance.
pub async fn view<C: ConnectionTrait>(db: &C, forecast: forecast::Model) -> Result<ForecastView> {
    let balance = balance_of(db, &forecast, None).await?;
    Ok(ForecastView {
        forecast,
        imputed_amount: balance.imputed_amount,
        remaining_balance: balance.remaining_balance,
    })
}

/// Lists forecasts matching `filter`, newest month first.
pub async fn list_forecasts(
    db: &DatabaseConnection,
    filter: &ForecastFilter,
) -> Result<Vec<ForecastView>> {
    let mut query = Forecast::find();
    if let Some(month) = filter.month {
        query = query.filter(forecast::Column::Month.eq(month_start(month)));
    }
    if let Some(category_id) = filter.category_id {
        query = query.filter(forecast::Column::CategoryId.eq(category_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(forecast::Column::Status.eq(status));
    }

    let forecasts = query
        .order_by_desc(forecast::Column::Month)
        .order_by_asc(forecast::Column::CategoryId)
        .order_by_asc(forecast::Column::Id)
        .all(db)
        .await?;

    let mut views = Vec::with_capacity(forecasts.len());
    for forecast in forecasts {
        views.push(view(db, forecast).await?);
    }
    Ok(views)
}

/// All forecasts of the month containing `month`.
pub async fn forecasts_by_month(
    db: &DatabaseConnection,
    month: NaiveDate,
) -> Result<Vec<ForecastView>> {
    list_forecasts(
        db,
        &ForecastFilter {
            month: Some(month),
            ..Default::default()
        },
    )
    .await
}

async fn ensure_unique<C: ConnectionTrait>(
    db: &C,
    input: &ForecastInput,
    except: Option<i64>,
) -> Result<()> {
    let existing =
        find_matching_forecast(db, input.month, input.category_id, input.subcategory_id).await?;
    match existing {
        Some(found) if Some(found.id) != except => Err(Error::conflict(format!(
            "A forecast already exists for {} in this category",
            month_start(input.month).format("%Y-%m")
        ))),
        _ => Ok(()),
    }
}

/// Creates a forecast.
#[instrument(skip(db, input), fields(month = %input.month, category = input.category_id))]
pub async fn create_forecast(
    db: &DatabaseConnection,
    input: ForecastInput,
    actor: Option<i64>,
) -> Result<forecast::Model> {
    if input.planned_amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount {
            amount: input.planned_amount,
        });
    }
    check_bounded(input.planned_amount)?;

    let txn = db.begin().await?;
    check_classification(&txn, input.category_id, input.subcategory_id).await?;
    ensure_unique(&txn, &input, None).await?;

    let now = Utc::now();
    let created = forecast::ActiveModel {
        month: Set(month_start(input.month)),
        category_id: Set(input.category_id),
        subcategory_id: Set(input.subcategory_id),
        planned_amount: Set(input.planned_amount),
        status: Set(input.status.unwrap_or(ForecastStatus::Draft)),
        created_by: Set(actor),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Create,
            "Forecast",
            created.id,
            format!("Forecast {} #{}", created.month.format("%Y-%m"), created.id),
        )
        .by(actor)
        .changes(json!({ "after": created })),
    )
    .await?;
    txn.commit().await?;

    info!("Created forecast {}", created.id);
    Ok(created)
}

/// Replaces a forecast's fields.
///
/// The planned amount may not drop below what is already imputed.
pub async fn update_forecast(
    db: &DatabaseConnection,
    id: i64,
    input: ForecastInput,
    actor: Option<i64>,
) -> Result<forecast::Model> {
    if input.planned_amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount {
            amount: input.planned_amount,
        });
    }
    check_bounded(input.planned_amount)?;

    let txn = db.begin().await?;
    let existing = get_forecast(&txn, id).await?;
    check_classification(&txn, input.category_id, input.subcategory_id).await?;
    ensure_unique(&txn, &input, Some(id)).await?;

    let imputed = imputed_for_forecast(&txn, id, None).await?;
    if input.planned_amount < imputed {
        return Err(Error::validation(format!(
            "Planned amount {} is below the {imputed} already imputed",
            input.planned_amount
        )));
    }

    let mut active: forecast::ActiveModel = existing.clone().into();
    active.month = Set(month_start(input.month));
    active.category_id = Set(input.category_id);
    active.subcategory_id = Set(input.subcategory_id);
    active.planned_amount = Set(input.planned_amount);
    if let Some(status) = input.status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Update,
            "Forecast",
            id,
            format!("Forecast {} #{id}", updated.month.format("%Y-%m")),
        )
        .by(actor)
        .changes(json!({ "before": existing, "after": updated })),
    )
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Deletes a forecast together with its imputations.
pub async fn delete_forecast(db: &DatabaseConnection, id: i64, actor: Option<i64>) -> Result<()> {
    let txn = db.begin().await?;
    let existing = get_forecast(&txn, id).await?;

    crate::entities::Imputation::delete_many()
        .filter(crate::entities::imputation::Column::ForecastId.eq(id))
        .exec(&txn)
        .await?;
    Forecast::delete_by_id(id).exec(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Delete,
            "Forecast",
            id,
            format!("Forecast {} #{id}", existing.month.format("%Y-%m")),
        )
        .by(actor)
        .changes(json!({ "before": existing })),
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::operation;
    use crate::test_utils::{
        create_test_category, create_test_forecast, create_test_operation, date, dec,
        setup_test_db,
    };

    #[test]
    fn test_month_start() {
        assert_eq!(month_start(date("2026-01-31")), date("2026-01-01"));
        assert_eq!(month_start(date("2026-02-01")), date("2026-02-01"));
    }

    #[tokio::test]
    async fn test_create_forecast_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_forecast(
            &db,
            ForecastInput {
                month: date("2026-01-01"),
                category_id: 1,
                subcategory_id: None,
                planned_amount: Decimal::ZERO,
                status: None,
            },
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_month_is_normalized_and_unique() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;

        let forecast = create_test_forecast(&db, food.id, "2026-01-17", 1_000_000).await?;
        assert_eq!(forecast.month, date("2026-01-01"));
        assert_eq!(forecast.status, ForecastStatus::Draft);

        // Same month, same category, no subcategory: the NULL case is still unique
        let duplicate = create_test_forecast(&db, food.id, "2026-01-03", 500).await;
        assert!(matches!(duplicate, Err(Error::Conflict { .. })));

        create_test_forecast(&db, food.id, "2026-02-03", 500).await?;
        assert_eq!(forecasts_by_month(&db, date("2026-01-20")).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_planned_amount_cannot_drop_below_imputed() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let forecast = create_test_forecast(&db, food.id, "2026-01-01", 1_000_000).await?;
        create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;

        let lowered = update_forecast(
            &db,
            forecast.id,
            ForecastInput {
                month: forecast.month,
                category_id: food.id,
                subcategory_id: None,
                planned_amount: dec(40_000),
                status: None,
            },
            None,
        )
        .await;
        assert!(matches!(lowered, Err(Error::Validation { .. })));

        let updated = update_forecast(
            &db,
            forecast.id,
            ForecastInput {
                month: forecast.month,
                category_id: food.id,
                subcategory_id: None,
                planned_amount: dec(50_000),
                status: Some(ForecastStatus::Validated),
            },
            None,
        )
        .await?;
        assert_eq!(updated.status, ForecastStatus::Validated);

        let balance = forecast_balance(&db, forecast.id).await?;
        assert_eq!(balance.remaining_balance, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_forecast_removes_imputations() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let forecast = create_test_forecast(&db, food.id, "2026-01-01", 1_000_000).await?;
        let op = create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;

        delete_forecast(&db, forecast.id, None).await?;
        let view = operation::get_operation_view(&db, op.id).await?;
        assert_eq!(view.imputed_amount, Decimal::ZERO);
        assert!(view.variance.is_none());
        Ok(())
    }
}
