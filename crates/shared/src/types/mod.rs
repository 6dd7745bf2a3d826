//! Common types used across the application.

pub mod id;
pub mod money;

pub use id::*;
pub use money::{
    BALANCE_EPSILON, CURRENCY_SCALE, MAX_AMOUNT, is_effectively_zero, round_currency,
};
