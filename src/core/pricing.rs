//! Canteen pricing rules.
//!
//! Pure functions: no database access, so the subsidy arithmetic can be
//! checked in isolation. Dish prices are capped at the price ceiling; what
//! lies above it is a supplement paid by the eater and never enters the
//! subsidized amounts.

use crate::entities::{SubsidyKind, subsidy_rule};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Quantity and uncapped unit price of one order line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    /// Number of portions
    pub quantity: i32,
    /// Day price of the dish
    pub unit_price: Decimal,
}

/// Amounts of a priced order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OrderAmounts {
    /// Sum of line amounts at capped prices
    pub gross: Decimal,
    /// Employer contribution
    pub subsidy: Decimal,
    /// `gross - subsidy`
    pub net: Decimal,
    /// Price excess above the ceiling
    pub supplement: Decimal,
    /// Number of dishes ordered
    pub dish_count: i32,
}

/// Unit price counted towards the order amount.
pub fn effective_price(unit_price: Decimal, ceiling: Decimal) -> Decimal {
    unit_price.min(ceiling)
}

/// `quantity * effective_price`
pub fn line_amount(line: PricedLine, ceiling: Decimal) -> Decimal {
    Decimal::from(line.quantity) * effective_price(line.unit_price, ceiling)
}

/// Excess of the line above the ceiling, zero when the price is under it.
pub fn line_supplement(line: PricedLine, ceiling: Decimal) -> Decimal {
    if line.unit_price > ceiling {
        (line.unit_price - ceiling) * Decimal::from(line.quantity)
    } else {
        Decimal::ZERO
    }
}

/// Subsidy granted by `rule` for an order of `dish_count` dishes worth `gross`.
pub fn compute_subsidy(
    rule: Option<&subsidy_rule::Model>,
    gross: Decimal,
    dish_count: i32,
) -> Decimal {
    let Some(rule) = rule else {
        return Decimal::ZERO;
    };
    let value = rule.value.unwrap_or(Decimal::ZERO);

    match rule.kind {
        SubsidyKind::None => Decimal::ZERO,
        SubsidyKind::Fixed => {
            let subsidized = rule
                .daily_cap
                .map_or(dish_count, |cap| dish_count.min(cap))
                .max(0);
            value * Decimal::from(subsidized)
        }
        SubsidyKind::Percent => (gross * value / Decimal::ONE_HUNDRED).round_dp(2),
    }
}

/// Prices a whole order.
pub fn price_order(
    lines: &[PricedLine],
    rule: Option<&subsidy_rule::Model>,
    ceiling: Decimal,
) -> OrderAmounts {
    let gross: Decimal = lines.iter().map(|line| line_amount(*line, ceiling)).sum();
    let supplement: Decimal = lines
        .iter()
        .map(|line| line_supplement(*line, ceiling))
        .sum();
    let dish_count: i32 = lines.iter().map(|line| line.quantity).sum();
    let subsidy = compute_subsidy(rule, gross, dish_count);

    OrderAmounts {
        gross,
        subsidy,
        net: gross - subsidy,
        supplement,
        dish_count,
    }
}

/// Picks the rule that applies on `date`.
///
/// Among the valid rules the one with the latest `valid_from` wins (an open
/// lower bound counts as the oldest), ties going to the most recent id.
pub fn select_rule(
    rules: &[subsidy_rule::Model],
    date: NaiveDate,
) -> Option<&subsidy_rule::Model> {
    rules
        .iter()
        .filter(|rule| rule.is_valid_on(date))
        .max_by_key(|rule| (rule.valid_from, rule.id))
}

/// Unit price of the operation recorded for a validated order.
///
/// The net amount is spread evenly over the dishes; a negative net (subsidy
/// above gross) is booked as zero.
pub fn operation_unit_price(amounts: &OrderAmounts) -> Decimal {
    if amounts.dish_count <= 0 {
        return Decimal::ZERO;
    }
    (amounts.net.max(Decimal::ZERO) / Decimal::from(amounts.dish_count)).round_dp(2)
}
