//! Slice and trace results.

use crate::features::flow_graph::NodeId;
use serde::{Deserialize, Serialize};

/// A designated call site: the caller and the CFG node holding the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceTarget {
    pub function: String,
    pub node: NodeId,
}

/// One observable side-effecting event along the witnessing path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub node: u32,
    pub callee: String,
    pub description: String,
}

/// The minimal relevant program slice for a target call site, plus a linear
/// trace of side-effecting events along one path forced through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceResult {
    pub target: SliceTarget,
    /// Functions touched, caller first, then in program order of their first
    /// relevant call site.
    pub functions: Vec<String>,
    /// Caller CFG nodes causally connected to the target.
    pub nodes: Vec<NodeId>,
    /// Events in program order; the target call appears exactly once, last
    /// among the events leading to it.
    pub trace: Vec<TraceEvent>,
}
