//! Defect checkers over the explorer's per-node states.

pub mod domain;
pub mod infrastructure;

pub use domain::{DefectKind, DefectReport};
pub use infrastructure::run_all_checkers;
