//! Money constants and rounding helpers.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Every amount in the ledger is a `rust_decimal::Decimal` stored with two
//! fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits carried by every ledger amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Tolerance used when checking that a balance has been driven to zero.
///
/// Equal to one hundredth of a currency unit (0.01).
pub const BALANCE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, CURRENCY_SCALE);

/// Largest amount a line or an entry total may carry.
///
/// Matches the `NUMERIC(20, 2)` money columns: 999,999,999,999,999,999.99.
pub const MAX_AMOUNT: Decimal =
    Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, CURRENCY_SCALE);

/// Rounds an amount to the ledger scale using Banker's Rounding.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Returns true if the amount is strictly within [`BALANCE_EPSILON`] of zero.
#[must_use]
pub fn is_effectively_zero(amount: Decimal) -> bool {
    amount.abs() < BALANCE_EPSILON
}
