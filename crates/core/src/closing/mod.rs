//! Period closing.
//!
//! - `plan` computes the closing of a range without side effects
//! - `engine` previews and executes closings against a store

pub mod engine;
pub mod plan;

#[cfg(test)]
mod props;
#[cfg(test)]
mod tests;

pub use engine::{ClosingEngine, ClosingPreview, ClosingResult, LastClosingInfo};
pub use plan::{ClosingLine, ClosingLines, ClosingPlan, ClosingRange, compute_closing_lines};
