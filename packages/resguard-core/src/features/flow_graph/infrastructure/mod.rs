//! CFG construction from the statement tree.

pub mod builder;

pub use builder::build_cfg;
