//! SubsidyRule entity - How much of an order the employer pays.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of subsidy granted
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SubsidyKind {
    /// No subsidy
    #[sea_orm(string_value = "none")]
    None,
    /// Fixed amount per dish, up to the daily cap
    #[sea_orm(string_value = "fixed")]
    Fixed,
    /// Percentage of the gross amount
    #[sea_orm(string_value = "percent")]
    Percent,
}

/// SubsidyRule database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subsidy_rules")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Kind of subsidy
    pub kind: SubsidyKind,
    /// Amount (fixed) or percentage (percent)
    pub value: Option<Decimal>,
    /// Maximum number of subsidized dishes per day
    pub daily_cap: Option<i32>,
    /// Whether the rule may apply at all
    pub active: bool,
    /// First day of validity, `None` for no lower bound
    pub valid_from: Option<Date>,
    /// Last day of validity, `None` for no upper bound
    pub valid_to: Option<Date>,
    /// When the rule was created
    pub created_at: DateTimeUtc,
    /// When the rule was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// True when the rule applies on `date`
    pub fn is_valid_on(&self, date: Date) -> bool {
        self.active
            && self.valid_from.is_none_or(|from| from <= date)
            && self.valid_to.is_none_or(|to| date <= to)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
