//! Report generation business logic.
//!
//! Budget reports aggregate operations against forecasts; the canteen report
//! aggregates invoiced orders. Everything is computed in memory from plain
//! queries and returned as serializable structs for the API layer.

use crate::{
    core::{forecast::month_start, invoice::INVOICED_STATES},
    entities::{
        Category, Dish, Forecast, MenuDish, Operation, Order, OrderLine, forecast, operation, order,
        order_line,
    },
    errors::{Error, Result},
};
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Spending of one category over the month
#[derive(Debug, Clone, Serialize)]
pub struct CategoryTotal {
    /// Category id
    pub category_id: i64,
    /// Category code
    pub code: String,
    /// Category name
    pub name: String,
    /// Σ operation amounts
    pub total: Decimal,
    /// Number of operations
    pub operation_count: usize,
    /// Σ planned amounts of the category's forecasts
    pub planned: Decimal,
    /// `total - planned`, zero when nothing was planned
    pub variance: Decimal,
}

/// Budget report of one month
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    /// First day of the month
    pub month: NaiveDate,
    /// Last day of the month
    pub month_end: NaiveDate,
    /// Σ operation amounts
    pub total_spent: Decimal,
    /// Σ forecast planned amounts
    pub total_planned: Decimal,
    /// Calendar days in the month
    pub days_in_month: u32,
    /// Number of operations
    pub operation_count: usize,
    /// `total_spent` over the days that had operations
    pub daily_average: Decimal,
    /// Categories with operations, by code
    pub categories: Vec<CategoryTotal>,
    /// `total_spent - total_planned`
    pub global_variance: Decimal,
}

/// Spending of one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    /// Day
    pub date: NaiveDate,
    /// Σ operation amounts
    pub total: Decimal,
    /// Number of operations
    pub count: usize,
}

/// Spending of one ISO week
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyTotal {
    /// ISO year the week belongs to
    pub iso_year: i32,
    /// ISO week number
    pub iso_week: u32,
    /// Σ operation amounts
    pub total: Decimal,
    /// Number of operations
    pub count: usize,
}

/// Portions served of one dish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DishRanking {
    /// Dish id
    pub dish_id: i64,
    /// Dish name
    pub name: String,
    /// Portions ordered
    pub quantity: i64,
}

/// Canteen activity of one month
#[derive(Debug, Clone, Serialize)]
pub struct CanteenReport {
    /// First day of the month
    pub month: NaiveDate,
    /// Invoiced orders
    pub order_count: usize,
    /// Portions in those orders
    pub dish_count: i64,
    /// Σ gross amounts
    pub total_gross: Decimal,
    /// Σ subsidies
    pub total_subsidy: Decimal,
    /// Σ net amounts
    pub total_net: Decimal,
    /// `total_net` over the calendar days of the month
    pub daily_average: Decimal,
    /// Ten most ordered dishes
    pub top_dishes: Vec<DishRanking>,
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let start = month_start(date);
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| Error::validation(format!("Month out of range: {date}")))?;
    Ok((start, end))
}

async fn operations_between(
    db: &DatabaseConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<operation::Model>> {
    if from > to {
        return Err(Error::validation("date_from is after date_to"));
    }
    Operation::find()
        .filter(operation::Column::OperationDate.gte(from))
        .filter(operation::Column::OperationDate.lte(to))
        .order_by_asc(operation::Column::OperationDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Builds the budget report of the month containing `month`.
pub async fn monthly_report(db: &DatabaseConnection, month: NaiveDate) -> Result<MonthlyReport> {
    let (start, end) = month_bounds(month)?;
    let operations = operations_between(db, start, end).await?;
    let forecasts = Forecast::find()
        .filter(forecast::Column::Month.eq(start))
        .all(db)
        .await?;

    let total_spent: Decimal = operations.iter().map(|op| op.amount).sum();
    let total_planned: Decimal = forecasts.iter().map(|f| f.planned_amount).sum();

    let active_days: BTreeSet<NaiveDate> = operations.iter().map(|op| op.operation_date).collect();
    let daily_average = if active_days.is_empty() {
        Decimal::ZERO
    } else {
        (total_spent / Decimal::from(active_days.len())).round_dp(2)
    };

    let mut per_category: BTreeMap<i64, (Decimal, usize)> = BTreeMap::new();
    for op in &operations {
        let entry = per_category.entry(op.category_id).or_default();
        entry.0 += op.amount;
        entry.1 += 1;
    }

    let mut planned: HashMap<i64, Decimal> = HashMap::new();
    for f in &forecasts {
        *planned.entry(f.category_id).or_default() += f.planned_amount;
    }

    let mut categories = Vec::with_capacity(per_category.len());
    for (category_id, (total, operation_count)) in per_category {
        let category = Category::find_by_id(category_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("Category", category_id))?;
        let (planned, variance) = match planned.get(&category_id) {
            Some(planned) => (*planned, total - *planned),
            None => (Decimal::ZERO, Decimal::ZERO),
        };
        categories.push(CategoryTotal {
            category_id,
            code: category.code,
            name: category.name,
            total,
            operation_count,
            planned,
            variance,
        });
    }
    categories.sort_by(|a, b| a.code.cmp(&b.code));

    Ok(MonthlyReport {
        month: start,
        month_end: end,
        total_spent,
        total_planned,
        days_in_month: end.day(),
        operation_count: operations.len(),
        daily_average,
        categories,
        global_variance: total_spent - total_planned,
    })
}

/// Totals per day with operations, in date order.
pub async fn daily_totals(
    db: &DatabaseConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailyTotal>> {
    let mut days: BTreeMap<NaiveDate, DailyTotal> = BTreeMap::new();
    for op in operations_between(db, from, to).await? {
        let day = days.entry(op.operation_date).or_insert(DailyTotal {
            date: op.operation_date,
            total: Decimal::ZERO,
            count: 0,
        });
        day.total += op.amount;
        day.count += 1;
    }
    Ok(days.into_values().collect())
}

/// Totals per ISO week with operations, in week order.
pub async fn weekly_totals(
    db: &DatabaseConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<WeeklyTotal>> {
    let mut weeks: BTreeMap<(i32, u32), WeeklyTotal> = BTreeMap::new();
    for op in operations_between(db, from, to).await? {
        let iso = op.operation_date.iso_week();
        let week = weeks
            .entry((iso.year(), iso.week()))
            .or_insert(WeeklyTotal {
                iso_year: iso.year(),
                iso_week: iso.week(),
                total: Decimal::ZERO,
                count: 0,
            });
        week.total += op.amount;
        week.count += 1;
    }
    Ok(weeks.into_values().collect())
}

/// Builds the canteen report of the month containing `month`.
pub async fn canteen_report(db: &DatabaseConnection, month: NaiveDate) -> Result<CanteenReport> {
    let (start, end) = month_bounds(month)?;
    let orders = Order::find()
        .filter(order::Column::OrderDate.gte(start))
        .filter(order::Column::OrderDate.lte(end))
        .filter(order::Column::State.is_in(INVOICED_STATES))
        .all(db)
        .await?;

    let total_gross: Decimal = orders.iter().map(|o| o.gross_amount).sum();
    let total_subsidy: Decimal = orders.iter().map(|o| o.subsidy_amount).sum();
    let total_net: Decimal = orders.iter().map(|o| o.net_amount).sum();

    let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    let lines = if order_ids.is_empty() {
        Vec::new()
    } else {
        OrderLine::find()
            .filter(order_line::Column::OrderId.is_in(order_ids))
            .find_also_related(MenuDish)
            .all(db)
            .await?
    };

    let mut dish_count = 0_i64;
    let mut per_dish: HashMap<i64, i64> = HashMap::new();
    for (line, entry) in &lines {
        dish_count += i64::from(line.quantity);
        if let Some(entry) = entry {
            *per_dish.entry(entry.dish_id).or_default() += i64::from(line.quantity);
        }
    }

    let mut ranked: Vec<(i64, i64)> = per_dish.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut top_dishes = Vec::new();
    for (dish_id, quantity) in ranked.into_iter().take(10) {
        let name = Dish::find_by_id(dish_id)
            .one(db)
            .await?
            .map(|dish| dish.name)
            .unwrap_or_default();
        top_dishes.push(DishRanking {
            dish_id,
            name,
            quantity,
        });
    }

    Ok(CanteenReport {
        month: start,
        order_count: orders.len(),
        dish_count,
        total_gross,
        total_subsidy,
        total_net,
        daily_average: (total_net / Decimal::from(end.day())).round_dp(2),
        top_dishes,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::OrderState;
    use crate::test_utils::{
        create_test_category, create_test_forecast, create_test_operation, date, dec,
        insert_priced_order, setup_test_db,
    };

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds(date("2024-02-17")).unwrap(),
            (date("2024-02-01"), date("2024-02-29"))
        );
        assert_eq!(
            month_bounds(date("2026-12-31")).unwrap(),
            (date("2026-12-01"), date("2026-12-31"))
        );
    }

    #[tokio::test]
    async fn test_monthly_report() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let fuel = create_test_category(&db, "FUEL").await?;
        create_test_forecast(&db, food.id, "2026-01-01", 1_000_000).await?;

        create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;
        create_test_operation(&db, food.id, "2026-01-05", 1, 20_000).await?;
        create_test_operation(&db, fuel.id, "2026-01-12", 2, 15_000).await?;
        // Outside the month
        create_test_operation(&db, fuel.id, "2026-02-01", 1, 99_000).await?;

        let report = monthly_report(&db, date("2026-01-20")).await?;
        assert_eq!(report.month, date("2026-01-01"));
        assert_eq!(report.days_in_month, 31);
        assert_eq!(report.operation_count, 3);
        assert_eq!(report.total_spent, dec(100_000));
        assert_eq!(report.total_planned, dec(1_000_000));
        // Two days with operations
        assert_eq!(report.daily_average, dec(50_000));
        assert_eq!(report.global_variance, dec(-900_000));

        assert_eq!(report.categories.len(), 2);
        let food_total = &report.categories[0];
        assert_eq!(food_total.code, "FOOD");
        assert_eq!(food_total.total, dec(70_000));
        assert_eq!(food_total.operation_count, 2);
        assert_eq!(food_total.variance, dec(-930_000));
        let fuel_total = &report.categories[1];
        assert_eq!(fuel_total.planned, Decimal::ZERO);
        assert_eq!(fuel_total.variance, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_month() -> Result<()> {
        let db = setup_test_db().await?;
        let report = monthly_report(&db, date("2026-03-01")).await?;
        assert_eq!(report.total_spent, Decimal::ZERO);
        assert_eq!(report.daily_average, Decimal::ZERO);
        assert!(report.categories.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_and_weekly_totals() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        create_test_operation(&db, food.id, "2026-01-05", 1, 1_000).await?;
        create_test_operation(&db, food.id, "2026-01-05", 1, 2_000).await?;
        create_test_operation(&db, food.id, "2026-01-11", 1, 4_000).await?;
        create_test_operation(&db, food.id, "2026-01-12", 1, 8_000).await?;

        let daily = daily_totals(&db, date("2026-01-01"), date("2026-01-31")).await?;
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].date, date("2026-01-05"));
        assert_eq!(daily[0].total, dec(3_000));
        assert_eq!(daily[0].count, 2);

        // 2026-01-05..11 is ISO week 2, 2026-01-12 opens week 3
        let weekly = weekly_totals(&db, date("2026-01-01"), date("2026-01-31")).await?;
        assert_eq!(weekly.len(), 2);
        assert_eq!((weekly[0].iso_year, weekly[0].iso_week), (2026, 2));
        assert_eq!(weekly[0].total, dec(7_000));
        assert_eq!(weekly[1].iso_week, 3);

        assert!(matches!(
            daily_totals(&db, date("2026-02-01"), date("2026-01-01")).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_canteen_report_counts_invoiced_orders() -> Result<()> {
        let db = setup_test_db().await?;
        let (monday, tuesday) = (date("2026-01-05"), date("2026-01-06"));
        insert_priced_order(&db, "awa", monday, OrderState::Validated, 30_000, 20_000, 0).await?;
        insert_priced_order(&db, "binta", tuesday, OrderState::Delivered, 25_000, 20_000, 0).await?;
        insert_priced_order(&db, "chef", tuesday, OrderState::Draft, 30_000, 0, 0).await?;

        let report = canteen_report(&db, date("2026-01-15")).await?;
        assert_eq!(report.order_count, 2);
        assert_eq!(report.total_gross, dec(55_000));
        assert_eq!(report.total_subsidy, dec(40_000));
        assert_eq!(report.total_net, dec(15_000));
        assert_eq!(report.dish_count, 2);
        assert_eq!(report.top_dishes.len(), 2);
        assert!(report.top_dishes.iter().all(|d| d.quantity == 1));
        Ok(())
    }
}
