//! Bounds on monetary inputs.
//!
//! Amounts are stored with at most ten digits, two of them decimals, so the
//! largest accepted value is 99 999 999.99. Products of bounded values stay
//! far inside `Decimal`'s range; they are still computed with checked
//! arithmetic.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;

/// Largest amount, quantity or price accepted from clients
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Rejects amounts above [`MAX_AMOUNT`] (or below `-MAX_AMOUNT`).
pub fn check_bounded(amount: Decimal) -> Result<()> {
    if amount.abs() > MAX_AMOUNT {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// `a * b`, with overflow reported as an invalid amount.
pub fn checked_product(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or(Error::InvalidAmount { amount: a.max(b) })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_max_amount() {
        assert_eq!(MAX_AMOUNT, "99999999.99".parse::<Decimal>().unwrap());
        assert!(check_bounded(MAX_AMOUNT).is_ok());
        assert!(check_bounded(-MAX_AMOUNT).is_ok());
        assert!(matches!(
            check_bounded(MAX_AMOUNT + Decimal::new(1, 2)),
            Err(Error::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_checked_product_overflow() {
        assert_eq!(
            checked_product(Decimal::TEN, Decimal::from(5_000)).unwrap(),
            Decimal::from(50_000)
        );
        assert!(matches!(
            checked_product(Decimal::MAX, Decimal::TWO),
            Err(Error::InvalidAmount { .. })
        ));
    }
}
