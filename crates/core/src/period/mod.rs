//! Accounting periods.
//!
//! - `types` - Period records and the Open → Closed → Locked state machine
//! - `window` - Posting date sanity window and monthly period ranges
//! - `registry` - Posting gate and period lifecycle service

pub mod registry;
pub mod types;
pub mod window;

pub use registry::{
    PeriodCloseOutcome, PeriodRegistry, Postable, closed_period_for, ensure_postable,
};
pub use types::{AccountingPeriod, ClosingSnapshot, PeriodStatus, validate_status_transition};
pub use window::{PostingWindow, month_bounds, month_description, monthly_range_for};
