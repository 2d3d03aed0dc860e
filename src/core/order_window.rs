//! Order windows - when a meal may still be ordered.
//!
//! Orders for a future day are always accepted and orders for a past day
//! never are. For the current day, unprivileged callers must order before the
//! cutoff of the dish's meal category; privileged callers (staff, superusers,
//! holders of the validation permission) may order until the end of the day.

use crate::{
    entities::{MealCategory, OrderWindow, order_window},
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;

/// True when an order for `order_date` may be placed at `now`.
pub fn ordering_allowed(
    now: NaiveDateTime,
    order_date: NaiveDate,
    cutoff: NaiveTime,
    privileged: bool,
) -> bool {
    let today = now.date();
    if order_date < today {
        return false;
    }
    if order_date > today {
        return true;
    }
    privileged || now.time() <= cutoff
}

/// Like [`ordering_allowed`] but explains the refusal.
pub fn check_ordering(
    now: NaiveDateTime,
    order_date: NaiveDate,
    cutoff: NaiveTime,
    privileged: bool,
) -> Result<()> {
    if order_date < now.date() {
        return Err(Error::validation(format!(
            "Cannot order for a past date ({order_date})"
        )));
    }
    if ordering_allowed(now, order_date, cutoff, privileged) {
        Ok(())
    } else {
        Err(Error::OrderWindowClosed { cutoff })
    }
}

/// Cutoff for a meal category: its active window, else `default`.
pub async fn resolve_cutoff<C: ConnectionTrait>(
    db: &C,
    meal_category: MealCategory,
    default: NaiveTime,
) -> Result<NaiveTime> {
    let window = OrderWindow::find()
        .filter(order_window::Column::MealCategory.eq(meal_category))
        .filter(order_window::Column::Active.eq(true))
        .one(db)
        .await?;
    Ok(window.map_or(default, |w| w.cutoff))
}

/// Payload for creating or replacing a window
#[derive(Debug, Clone, Deserialize)]
pub struct OrderWindowInput {
    /// Governed meal category
    pub meal_category: MealCategory,
    /// Same-day cutoff
    pub cutoff: NaiveTime,
    /// Defaults to active
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Lists all windows by meal category.
pub async fn list_order_windows(db: &DatabaseConnection) -> Result<Vec<order_window::Model>> {
    OrderWindow::find()
        .order_by_asc(order_window::Column::MealCategory)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches one window.
pub async fn get_order_window(db: &DatabaseConnection, id: i64) -> Result<order_window::Model> {
    OrderWindow::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("OrderWindow", id))
}

async fn ensure_category_free(
    db: &DatabaseConnection,
    meal_category: MealCategory,
    except: Option<i64>,
) -> Result<()> {
    let mut query =
        OrderWindow::find().filter(order_window::Column::MealCategory.eq(meal_category));
    if let Some(id) = except {
        query = query.filter(order_window::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(Error::conflict(format!(
            "An order window already exists for {meal_category:?}"
        )));
    }
    Ok(())
}

/// Creates a window; one per meal category.
pub async fn create_order_window(
    db: &DatabaseConnection,
    input: OrderWindowInput,
) -> Result<order_window::Model> {
    ensure_category_free(db, input.meal_category, None).await?;
    order_window::ActiveModel {
        meal_category: Set(input.meal_category),
        cutoff: Set(input.cutoff),
        active: Set(input.active),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Replaces a window.
pub async fn update_order_window(
    db: &DatabaseConnection,
    id: i64,
    input: OrderWindowInput,
) -> Result<order_window::Model> {
    let existing = get_order_window(db, id).await?;
    ensure_category_free(db, input.meal_category, Some(id)).await?;

    let mut active: order_window::ActiveModel = existing.into();
    active.meal_category = Set(input.meal_category);
    active.cutoff = Set(input.cutoff);
    active.active = Set(input.active);
    active.update(db).await.map_err(Into::into)
}

/// Deletes a window; its category falls back to the default cutoff.
pub async fn delete_order_window(db: &DatabaseConnection, id: i64) -> Result<()> {
    let result = OrderWindow::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("OrderWindow", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn cutoff() -> NaiveTime {
        NaiveTime::from_hms_opt(13, 0, 0).unwrap()
    }

    #[test]
    fn test_same_day_before_and_after_cutoff() {
        assert!(ordering_allowed(at(5, 12, 59), day(5), cutoff(), false));
        assert!(ordering_allowed(at(5, 13, 0), day(5), cutoff(), false));
        assert!(!ordering_allowed(at(5, 13, 1), day(5), cutoff(), false));
        assert!(ordering_allowed(at(5, 23, 0), day(5), cutoff(), true));
    }

    #[test]
    fn test_future_and_past_dates() {
        assert!(ordering_allowed(at(5, 23, 0), day(6), cutoff(), false));
        assert!(!ordering_allowed(at(5, 8, 0), day(4), cutoff(), false));
        assert!(!ordering_allowed(at(5, 8, 0), day(4), cutoff(), true));
    }

    #[test]
    fn test_check_ordering_errors() {
        assert!(matches!(
            check_ordering(at(5, 14, 0), day(5), cutoff(), false),
            Err(Error::OrderWindowClosed { .. })
        ));
        assert!(matches!(
            check_ordering(at(5, 8, 0), day(4), cutoff(), true),
            Err(Error::Validation { .. })
        ));
        assert!(check_ordering(at(5, 14, 0), day(5), cutoff(), true).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_cutoff_uses_active_window() -> Result<()> {
        let db = setup_test_db().await?;
        let default = cutoff();
        assert_eq!(
            resolve_cutoff(&db, MealCategory::Lunch, default).await?,
            default
        );

        let window = create_order_window(
            &db,
            OrderWindowInput {
                meal_category: MealCategory::Lunch,
                cutoff: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                active: true,
            },
        )
        .await?;
        assert_eq!(
            resolve_cutoff(&db, MealCategory::Lunch, default).await?,
            NaiveTime::from_hms_opt(11, 0, 0).unwrap()
        );
        assert_eq!(
            resolve_cutoff(&db, MealCategory::Dinner, default).await?,
            default
        );

        update_order_window(
            &db,
            window.id,
            OrderWindowInput {
                meal_category: MealCategory::Lunch,
                cutoff: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                active: false,
            },
        )
        .await?;
        assert_eq!(
            resolve_cutoff(&db, MealCategory::Lunch, default).await?,
            default
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_one_window_per_category() -> Result<()> {
        let db = setup_test_db().await?;
        let input = OrderWindowInput {
            meal_category: MealCategory::Breakfast,
            cutoff: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            active: true,
        };
        create_order_window(&db, input.clone()).await?;
        assert!(matches!(
            create_order_window(&db, input).await,
            Err(Error::Conflict { .. })
        ));
        Ok(())
    }
}
