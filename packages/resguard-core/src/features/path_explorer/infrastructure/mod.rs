//! The worklist explorer.

pub mod explorer;

pub use explorer::{ExplorerConfig, PathExplorer};
