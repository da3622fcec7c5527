//! Pipeline orchestration.

pub mod engine;

pub use engine::{AnalysisConfig, AnalysisEngine, FunctionAnalysis};
