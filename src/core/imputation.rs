//! Imputation business logic - reconciling operations against forecasts.
//!
//! Two invariants hold after every commit:
//! * the imputations of a forecast never exceed its planned amount;
//! * the imputations of an operation never exceed its amount.
//!
//! Automatic imputation (see [`auto_impute`]) clamps silently to what is
//! available. Explicit imputations and multi-imputations reject anything that
//! does not fit.

use crate::{
    core::{
        audit::{self, AuditEntry},
        forecast::{self, find_matching_forecast},
        money::check_bounded,
        operation::get_operation,
    },
    entities::{AuditAction, Imputation, forecast as forecast_entity, imputation, operation},
    errors::{Error, Result},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

async fn sum_amounts<C: ConnectionTrait>(
    db: &C,
    column: imputation::Column,
    id: i64,
    excluding: Option<i64>,
) -> Result<Decimal> {
    let mut query = Imputation::find().filter(column.eq(id));
    if let Some(excluded) = excluding {
        query = query.filter(imputation::Column::Id.ne(excluded));
    }
    let rows = query.all(db).await?;
    Ok(rows.iter().map(|row| row.amount).sum())
}

/// Sum of the imputations of a forecast, ignoring imputation `excluding`.
pub async fn imputed_for_forecast<C: ConnectionTrait>(
    db: &C,
    forecast_id: i64,
    excluding: Option<i64>,
) -> Result<Decimal> {
    sum_amounts(db, imputation::Column::ForecastId, forecast_id, excluding).await
}

/// Sum of the imputations of an operation, ignoring imputation `excluding`.
pub async fn imputed_for_operation<C: ConnectionTrait>(
    db: &C,
    operation_id: i64,
    excluding: Option<i64>,
) -> Result<Decimal> {
    sum_amounts(db, imputation::Column::OperationId, operation_id, excluding).await
}

async fn find_pair<C: ConnectionTrait>(
    db: &C,
    operation_id: i64,
    forecast_id: i64,
) -> Result<Option<imputation::Model>> {
    Imputation::find()
        .filter(imputation::Column::OperationId.eq(operation_id))
        .filter(imputation::Column::ForecastId.eq(forecast_id))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn upsert<C: ConnectionTrait>(
    db: &C,
    existing: Option<imputation::Model>,
    operation_id: i64,
    forecast_id: i64,
    amount: Decimal,
    actor: Option<i64>,
) -> Result<imputation::Model> {
    let now = Utc::now();
    let (saved, action) = match existing {
        Some(existing) => {
            let mut active: imputation::ActiveModel = existing.into();
            active.amount = Set(amount);
            active.updated_at = Set(now);
            (active.update(db).await?, AuditAction::Update)
        }
        None => {
            let created = imputation::ActiveModel {
                operation_id: Set(operation_id),
                forecast_id: Set(forecast_id),
                amount: Set(amount),
                created_by: Set(actor),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
            (created, AuditAction::Create)
        }
    };

    audit::record(
        db,
        AuditEntry::new(
            action,
            "Imputation",
            saved.id,
            format!("Operation #{operation_id} -> Forecast #{forecast_id}"),
        )
        .by(actor)
        .changes(json!({ "amount": saved.amount })),
    )
    .await?;
    Ok(saved)
}

/// Imputes an operation against the forecast of its month and classification.
///
/// The allocation is `min(what the operation has left, what the forecast has
/// left)`, an existing imputation on that forecast being left out of both
/// sides. Nothing is allocated without a matching forecast; a zero
/// allocation removes a previous imputation.
pub async fn auto_impute<C: ConnectionTrait>(
    db: &C,
    op: &operation::Model,
    actor: Option<i64>,
) -> Result<Option<imputation::Model>> {
    let Some(target) =
        find_matching_forecast(db, op.operation_date, op.category_id, op.subcategory_id).await?
    else {
        debug!("No forecast matches operation {}", op.id);
        return Ok(None);
    };

    let existing = find_pair(db, op.id, target.id).await?;
    let existing_id = existing.as_ref().map(|row| row.id);

    let balance = forecast::balance_of(db, &target, existing_id).await?;
    let operation_left = op.amount - imputed_for_operation(db, op.id, existing_id).await?;
    let allocation = operation_left
        .min(balance.remaining_balance)
        .max(Decimal::ZERO);

    if allocation.is_zero() {
        if let Some(existing) = existing {
            Imputation::delete_by_id(existing.id).exec(db).await?;
        }
        return Ok(None);
    }

    let saved = upsert(db, existing, op.id, target.id, allocation, actor).await?;
    debug!(
        "Imputed {} of operation {} on forecast {}",
        saved.amount, op.id, target.id
    );
    Ok(Some(saved))
}

/// Checks that `amount` fits both the operation and the forecast.
///
/// `replacing` is the imputation the new amount supersedes, if any.
async fn check_allocation<C: ConnectionTrait>(
    db: &C,
    op: &operation::Model,
    target: &forecast_entity::Model,
    amount: Decimal,
    replacing: Option<i64>,
) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount { amount });
    }
    check_bounded(amount)?;

    let balance = forecast::balance_of(db, target, replacing).await?;
    if amount > balance.remaining_balance {
        return Err(Error::OverAllocation {
            requested: amount,
            available: balance.remaining_balance,
        });
    }

    let operation_left = op.amount - imputed_for_operation(db, op.id, replacing).await?;
    if amount > operation_left {
        return Err(Error::OverAllocation {
            requested: amount,
            available: operation_left,
        });
    }
    Ok(())
}

/// Imputation payload
#[derive(Debug, Clone, Deserialize)]
pub struct ImputationInput {
    /// Operation to allocate
    pub operation_id: i64,
    /// Receiving forecast
    pub forecast_id: i64,
    /// Amount, strictly positive
    pub amount: Decimal,
}

/// Filters for [`list_imputations`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImputationFilter {
    /// Only imputations of this operation
    pub operation_id: Option<i64>,
    /// Only imputations on this forecast
    pub forecast_id: Option<i64>,
}

/// Lists imputations.
pub async fn list_imputations(
    db: &DatabaseConnection,
    filter: &ImputationFilter,
) -> Result<Vec<imputation::Model>> {
    let mut query = Imputation::find();
    if let Some(operation_id) = filter.operation_id {
        query = query.filter(imputation::Column::OperationId.eq(operation_id));
    }
    if let Some(forecast_id) = filter.forecast_id {
        query = query.filter(imputation::Column::ForecastId.eq(forecast_id));
    }
    query
        .order_by_asc(imputation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches an imputation.
pub async fn get_imputation<C: ConnectionTrait>(db: &C, id: i64) -> Result<imputation::Model> {
    Imputation::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Imputation", id))
}

/// Creates an explicit imputation.
pub async fn create_imputation(
    db: &DatabaseConnection,
    input: ImputationInput,
    actor: Option<i64>,
) -> Result<imputation::Model> {
    let txn = db.begin().await?;
    let op = get_operation(&txn, input.operation_id).await?;
    let target = forecast::get_forecast(&txn, input.forecast_id).await?;

    if find_pair(&txn, op.id, target.id).await?.is_some() {
        return Err(Error::conflict(format!(
            "Operation {} is already imputed on forecast {}",
            op.id, target.id
        )));
    }
    check_allocation(&txn, &op, &target, input.amount, None).await?;

    let saved = upsert(&txn, None, op.id, target.id, input.amount, actor).await?;
    txn.commit().await?;
    Ok(saved)
}

/// Changes the amount of an imputation.
pub async fn update_imputation(
    db: &DatabaseConnection,
    id: i64,
    amount: Decimal,
    actor: Option<i64>,
) -> Result<imputation::Model> {
    let txn = db.begin().await?;
    let existing = get_imputation(&txn, id).await?;
    let op = get_operation(&txn, existing.operation_id).await?;
    let target = forecast::get_forecast(&txn, existing.forecast_id).await?;
    check_allocation(&txn, &op, &target, amount, Some(id)).await?;

    let saved = upsert(&txn, Some(existing), op.id, target.id, amount, actor).await?;
    txn.commit().await?;
    Ok(saved)
}

/// Removes an imputation.
pub async fn delete_imputation(db: &DatabaseConnection, id: i64, actor: Option<i64>) -> Result<()> {
    let txn = db.begin().await?;
    let existing = get_imputation(&txn, id).await?;
    Imputation::delete_by_id(id).exec(&txn).await?;
    audit::record(
        &txn,
        AuditEntry::new(
            AuditAction::Delete,
            "Imputation",
            id,
            format!(
                "Operation #{} -> Forecast #{}",
                existing.operation_id, existing.forecast_id
            ),
        )
        .by(actor)
        .changes(json!({ "before": existing })),
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

/// One share of a multi-imputation
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Allocation {
    /// Receiving forecast
    pub forecast_id: i64,
    /// Amount, strictly positive
    pub amount: Decimal,
}

/// Splits one operation across several forecasts.
///
/// All-or-nothing: every allocation is checked before anything is written and
/// the writes share one transaction. An allocation on a forecast the
/// operation is already imputed on replaces that imputation.
#[instrument(skip(db, allocations), fields(count = allocations.len()))]
pub async fn multi_impute(
    db: &DatabaseConnection,
    operation_id: i64,
    allocations: Vec<Allocation>,
    actor: Option<i64>,
) -> Result<Vec<imputation::Model>> {
    if allocations.is_empty() {
        return Err(Error::validation("At least one allocation is required"));
    }
    let mut seen = HashSet::new();
    for allocation in &allocations {
        if allocation.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount {
                amount: allocation.amount,
            });
        }
        check_bounded(allocation.amount)?;
        if !seen.insert(allocation.forecast_id) {
            return Err(Error::validation(format!(
                "Forecast {} appears more than once",
                allocation.forecast_id
            )));
        }
    }

    let txn = db.begin().await?;
    let op = get_operation(&txn, operation_id).await?;

    // Imputations on forecasts outside the request keep their share
    let untouched: Decimal = Imputation::find()
        .filter(imputation::Column::OperationId.eq(op.id))
        .all(&txn)
        .await?
        .iter()
        .filter(|row| !seen.contains(&row.forecast_id))
        .map(|row| row.amount)
        .sum();
    let requested: Decimal = allocations.iter().map(|a| a.amount).sum();
    if requested + untouched > op.amount {
        return Err(Error::OverAllocation {
            requested,
            available: op.amount - untouched,
        });
    }

    let mut plan = Vec::with_capacity(allocations.len());
    for allocation in &allocations {
        let target = forecast::get_forecast(&txn, allocation.forecast_id).await?;
        let existing = find_pair(&txn, op.id, target.id).await?;
        let balance =
            forecast::balance_of(&txn, &target, existing.as_ref().map(|row| row.id)).await?;
        if allocation.amount > balance.remaining_balance {
            return Err(Error::OverAllocation {
                requested: allocation.amount,
                available: balance.remaining_balance,
            });
        }
        plan.push((target.id, existing, allocation.amount));
    }

    let mut saved = Vec::with_capacity(plan.len());
    for (forecast_id, existing, amount) in plan {
        saved.push(upsert(&txn, existing, op.id, forecast_id, amount, actor).await?);
    }
    txn.commit().await?;

    info!(
        "Split operation {} across {} forecast(s)",
        op.id,
        saved.len()
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::forecast::forecast_balance;
    use crate::test_utils::{
        create_test_category, create_test_forecast, create_test_operation, dec, setup_test_db,
    };

    #[tokio::test]
    async fn test_auto_imputation_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let forecast = create_test_forecast(&db, food.id, "2026-01-01", 1_000_000).await?;

        let op = create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;
        assert_eq!(op.amount, dec(50_000));

        let rows = list_imputations(
            &db,
            &ImputationFilter {
                operation_id: Some(op.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec(50_000));

        let balance = forecast_balance(&db, forecast.id).await?;
        assert_eq!(balance.imputed_amount, dec(50_000));
        assert_eq!(balance.remaining_balance, dec(950_000));
        Ok(())
    }

    #[tokio::test]
    async fn test_auto_imputation_clamps_to_remaining() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let forecast = create_test_forecast(&db, food.id, "2026-01-01", 60_000).await?;

        create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;
        let second = create_test_operation(&db, food.id, "2026-01-06", 4, 5_000).await?;
        let third = create_test_operation(&db, food.id, "2026-01-07", 1, 5_000).await?;

        let second_rows = list_imputations(
            &db,
            &ImputationFilter {
                operation_id: Some(second.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(second_rows[0].amount, dec(10_000));

        // Forecast exhausted: nothing is allocated
        let third_rows = list_imputations(
            &db,
            &ImputationFilter {
                operation_id: Some(third.id),
                ..Default::default()
            },
        )
        .await?;
        assert!(third_rows.is_empty());

        let balance = forecast_balance(&db, forecast.id).await?;
        assert_eq!(balance.remaining_balance, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_imputation_rejects_over_allocation() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let other = create_test_category(&db, "OTHER").await?;
        let forecast = create_test_forecast(&db, other.id, "2026-01-01", 20_000).await?;
        let op = create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;

        let too_much = create_imputation(
            &db,
            ImputationInput {
                operation_id: op.id,
                forecast_id: forecast.id,
                amount: dec(25_000),
            },
            None,
        )
        .await;
        assert!(matches!(too_much, Err(Error::OverAllocation { .. })));

        let created = create_imputation(
            &db,
            ImputationInput {
                operation_id: op.id,
                forecast_id: forecast.id,
                amount: dec(20_000),
            },
            None,
        )
        .await?;

        let duplicate = create_imputation(
            &db,
            ImputationInput {
                operation_id: op.id,
                forecast_id: forecast.id,
                amount: dec(1),
            },
            None,
        )
        .await;
        assert!(matches!(duplicate, Err(Error::Conflict { .. })));

        // Updating excludes the row itself from the remaining balance
        let updated = update_imputation(&db, created.id, dec(15_000), None).await?;
        assert_eq!(updated.amount, dec(15_000));
        assert!(matches!(
            update_imputation(&db, created.id, dec(0), None).await,
            Err(Error::InvalidAmount { .. })
        ));

        delete_imputation(&db, created.id, None).await?;
        assert_eq!(imputed_for_forecast(&db, forecast.id, None).await?, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_multi_impute_splits_operation() -> Result<()> {
        let db = setup_test_db().await?;
        let misc = create_test_category(&db, "MISC").await?;
        let a = create_test_category(&db, "A").await?;
        let b = create_test_category(&db, "B").await?;
        let fa = create_test_forecast(&db, a.id, "2026-01-01", 30_000).await?;
        let fb = create_test_forecast(&db, b.id, "2026-01-01", 30_000).await?;
        let op = create_test_operation(&db, misc.id, "2026-01-05", 10, 5_000).await?;

        let saved = multi_impute(
            &db,
            op.id,
            vec![
                Allocation {
                    forecast_id: fa.id,
                    amount: dec(30_000),
                },
                Allocation {
                    forecast_id: fb.id,
                    amount: dec(20_000),
                },
            ],
            None,
        )
        .await?;
        assert_eq!(saved.len(), 2);
        assert_eq!(imputed_for_operation(&db, op.id, None).await?, dec(50_000));

        // Re-running replaces the existing rows instead of adding to them
        let saved = multi_impute(
            &db,
            op.id,
            vec![Allocation {
                forecast_id: fa.id,
                amount: dec(25_000),
            }],
            None,
        )
        .await?;
        assert_eq!(saved[0].amount, dec(25_000));
        assert_eq!(imputed_for_operation(&db, op.id, None).await?, dec(45_000));
        Ok(())
    }

    #[tokio::test]
    async fn test_multi_impute_is_all_or_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let misc = create_test_category(&db, "MISC").await?;
        let a = create_test_category(&db, "A").await?;
        let b = create_test_category(&db, "B").await?;
        let fa = create_test_forecast(&db, a.id, "2026-01-01", 100_000).await?;
        let fb = create_test_forecast(&db, b.id, "2026-01-01", 10_000).await?;
        let op = create_test_operation(&db, misc.id, "2026-01-05", 10, 5_000).await?;

        // Second allocation exceeds its forecast: the first must not be written
        let result = multi_impute(
            &db,
            op.id,
            vec![
                Allocation {
                    forecast_id: fa.id,
                    amount: dec(30_000),
                },
                Allocation {
                    forecast_id: fb.id,
                    amount: dec(20_000),
                },
            ],
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::OverAllocation { .. })));
        assert_eq!(imputed_for_operation(&db, op.id, None).await?, Decimal::ZERO);

        // Sum above the operation amount
        let result = multi_impute(
            &db,
            op.id,
            vec![Allocation {
                forecast_id: fa.id,
                amount: dec(60_000),
            }],
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::OverAllocation { .. })));

        assert!(matches!(
            multi_impute(&db, op.id, vec![], None).await,
            Err(Error::Validation { .. })
        ));
        let duplicate = vec![
            Allocation {
                forecast_id: fa.id,
                amount: dec(1),
            },
            Allocation {
                forecast_id: fa.id,
                amount: dec(1),
            },
        ];
        assert!(matches!(
            multi_impute(&db, op.id, duplicate, None).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            multi_impute(
                &db,
                op.id,
                vec![Allocation {
                    forecast_id: 9_999,
                    amount: dec(1)
                }],
                None
            )
            .await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            multi_impute(
                &db,
                9_999,
                vec![Allocation {
                    forecast_id: fa.id,
                    amount: dec(1)
                }],
                None
            )
            .await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }
}
