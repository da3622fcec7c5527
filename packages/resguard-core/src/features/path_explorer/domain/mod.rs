//! Exploration results.

use crate::features::abstract_state::AbstractState;
use crate::features::flow_graph::NodeId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Outcome of exploring one function. Incomplete is a status, never a defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Complete,
    Incomplete { reason: String },
}

impl AnalysisStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, AnalysisStatus::Complete)
    }
}

/// Reachable abstract states per program point after the fixed point.
#[derive(Debug, Clone)]
pub struct Exploration {
    pub function: String,
    pub status: AnalysisStatus,
    /// Accumulated state on entry to each reached node.
    pub node_states: FxHashMap<NodeId, AbstractState>,
    /// Non-fatal states at Exit nodes, in exit order.
    pub exit_states: Vec<(NodeId, AbstractState)>,
    /// Predecessor each node first received state from; backbone of the
    /// lexicographically-earliest witness paths.
    pub first_reach: FxHashMap<NodeId, NodeId>,
    pub iterations: usize,
}

impl Exploration {
    pub fn state_at(&self, node: NodeId) -> Option<&AbstractState> {
        self.node_states.get(&node)
    }

    /// The earliest-discovered path from entry to `node`.
    pub fn witness_path(&self, node: NodeId) -> Vec<NodeId> {
        let mut path = vec![node];
        let mut current = node;
        while let Some(pred) = self.first_reach.get(&current) {
            path.push(*pred);
            current = *pred;
        }
        path.reverse();
        path
    }
}
