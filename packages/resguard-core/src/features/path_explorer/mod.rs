//! Worklist-based abstract-state exploration of one function's CFG, with
//! bounded interprocedural inlining.

pub mod domain;
pub mod infrastructure;

pub use domain::{AnalysisStatus, Exploration};
pub use infrastructure::explorer::{ExplorerConfig, PathExplorer};
