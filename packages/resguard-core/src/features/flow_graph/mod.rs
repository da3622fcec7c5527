//! Control-flow graph construction.

pub mod domain;
pub mod infrastructure;

pub use domain::{Cfg, CfgEdgeKind, CfgNode, Effect, NodeId, NodeKind};
pub use infrastructure::build_cfg;
