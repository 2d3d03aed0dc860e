//! Subsidy rule management.
//!
//! Several rules may be stored; [`active_rule`] picks the one that applies on
//! a given day (see [`crate::core::pricing::select_rule`]).

use crate::{
    core::{money::check_bounded, pricing::select_rule},
    entities::{SubsidyKind, SubsidyRule, subsidy_rule},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;

/// Subsidy rule payload
#[derive(Debug, Clone, Deserialize)]
pub struct SubsidyRuleInput {
    /// Display name
    pub name: String,
    /// Kind of subsidy
    pub kind: SubsidyKind,
    /// Amount per dish (fixed) or percentage (percent)
    #[serde(default)]
    pub value: Option<Decimal>,
    /// Maximum subsidized dishes per order
    #[serde(default)]
    pub daily_cap: Option<i32>,
    /// Defaults to active
    #[serde(default = "default_active")]
    pub active: bool,
    /// First valid day
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    /// Last valid day
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
}

const fn default_active() -> bool {
    true
}

fn validate(input: &SubsidyRuleInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(Error::validation("Rule name is required"));
    }
    match (input.kind, input.value) {
        (SubsidyKind::None, _) => {}
        (_, None) => {
            return Err(Error::validation(
                "Fixed and percent rules need a value",
            ));
        }
        (_, Some(value)) if value < Decimal::ZERO => {
            return Err(Error::InvalidAmount { amount: value });
        }
        (SubsidyKind::Percent, Some(value)) if value > Decimal::ONE_HUNDRED => {
            return Err(Error::validation("A percentage cannot exceed 100"));
        }
        _ => {}
    }
    if let Some(value) = input.value {
        check_bounded(value)?;
    }
    if input.daily_cap.is_some_and(|cap| cap < 0) {
        return Err(Error::validation("Daily cap cannot be negative"));
    }
    if let (Some(from), Some(to)) = (input.valid_from, input.valid_to) {
        if from > to {
            return Err(Error::validation("valid_from is after valid_to"));
        }
    }
    Ok(())
}

/// Lists every rule, newest first.
pub async fn list_subsidy_rules(db: &DatabaseConnection) -> Result<Vec<subsidy_rule::Model>> {
    SubsidyRule::find()
        .order_by_desc(subsidy_rule::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches a rule.
pub async fn get_subsidy_rule(db: &DatabaseConnection, id: i64) -> Result<subsidy_rule::Model> {
    SubsidyRule::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("SubsidyRule", id))
}

/// The rule applying on `date`, if any.
pub async fn active_rule<C: ConnectionTrait>(
    db: &C,
    date: NaiveDate,
) -> Result<Option<subsidy_rule::Model>> {
    let rules = SubsidyRule::find()
        .filter(subsidy_rule::Column::Active.eq(true))
        .all(db)
        .await?;
    Ok(select_rule(&rules, date).cloned())
}

/// Stores a rule.
pub async fn create_subsidy_rule<C: ConnectionTrait>(
    db: &C,
    input: SubsidyRuleInput,
) -> Result<subsidy_rule::Model> {
    validate(&input)?;
    let now = Utc::now();
    subsidy_rule::ActiveModel {
        name: Set(input.name.trim().to_string()),
        kind: Set(input.kind),
        value: Set(input.value),
        daily_cap: Set(input.daily_cap),
        active: Set(input.active),
        valid_from: Set(input.valid_from),
        valid_to: Set(input.valid_to),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Replaces a rule. Already priced orders keep their amounts.
pub async fn update_subsidy_rule(
    db: &DatabaseConnection,
    id: i64,
    input: SubsidyRuleInput,
) -> Result<subsidy_rule::Model> {
    let existing = get_subsidy_rule(db, id).await?;
    validate(&input)?;

    let mut active: subsidy_rule::ActiveModel = existing.into();
    active.name = Set(input.name.trim().to_string());
    active.kind = Set(input.kind);
    active.value = Set(input.value);
    active.daily_cap = Set(input.daily_cap);
    active.active = Set(input.active);
    active.valid_from = Set(input.valid_from);
    active.valid_to = Set(input.valid_to);
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

/// Deletes a rule.
pub async fn delete_subsidy_rule(db: &DatabaseConnection, id: i64) -> Result<()> {
    let result = SubsidyRule::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("SubsidyRule", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{date, dec, setup_test_db};

    fn input(kind: SubsidyKind, value: Option<i64>) -> SubsidyRuleInput {
        SubsidyRuleInput {
            name: "Subvention".to_string(),
            kind,
            value: value.map(dec),
            daily_cap: Some(1),
            active: true,
            valid_from: None,
            valid_to: None,
        }
    }

    #[test]
    fn test_validation() {
        assert!(validate(&input(SubsidyKind::None, None)).is_ok());
        assert!(validate(&input(SubsidyKind::Fixed, None)).is_err());
        assert!(validate(&input(SubsidyKind::Percent, Some(120))).is_err());
        assert!(matches!(
            validate(&input(SubsidyKind::Fixed, Some(-1))),
            Err(Error::InvalidAmount { .. })
        ));

        let mut reversed = input(SubsidyKind::Fixed, Some(30_000));
        reversed.valid_from = Some(date("2026-02-01"));
        reversed.valid_to = Some(date("2026-01-01"));
        assert!(validate(&reversed).is_err());
    }

    #[tokio::test]
    async fn test_active_rule_follows_validity() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(active_rule(&db, date("2026-01-05")).await?.is_none());

        let base = create_subsidy_rule(&db, input(SubsidyKind::Fixed, Some(30_000))).await?;
        let mut january = input(SubsidyKind::Fixed, Some(35_000));
        january.valid_from = Some(date("2026-01-01"));
        january.valid_to = Some(date("2026-01-31"));
        let january = create_subsidy_rule(&db, january).await?;

        assert_eq!(active_rule(&db, date("2026-01-05")).await?.unwrap().id, january.id);
        assert_eq!(active_rule(&db, date("2026-02-05")).await?.unwrap().id, base.id);

        let mut disabled = input(SubsidyKind::Fixed, Some(30_000));
        disabled.active = false;
        update_subsidy_rule(&db, base.id, disabled).await?;
        assert!(active_rule(&db, date("2026-02-05")).await?.is_none());
        Ok(())
    }
}
