//! Program slicing and trace extraction for a target call site.

pub mod domain;
pub mod infrastructure;

pub use domain::{SliceResult, SliceTarget, TraceEvent};
pub use infrastructure::slicer::Slicer;
