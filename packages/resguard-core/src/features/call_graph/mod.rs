//! Call-graph resolution over the built CFGs.

pub mod domain;
pub mod infrastructure;

pub use domain::{CallGraph, CallSite, CallTarget};
pub use infrastructure::resolve_call_graph;
