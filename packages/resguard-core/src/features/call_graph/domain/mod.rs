//! Call graph: function vertices plus call-site edges connecting caller and
//! callee.

use crate::features::flow_graph::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Resolution of one call site's callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    /// Exact-name match against a function with a body in the program.
    Defined(String),
    /// Declared external; no body to analyze.
    External(String),
    /// Function pointer or undeclared name. The explorer treats its effect as
    /// Unknown for every location passed by pointer.
    Unknown(String),
}

impl CallTarget {
    pub fn name(&self) -> &str {
        match self {
            CallTarget::Defined(n) | CallTarget::External(n) | CallTarget::Unknown(n) => n,
        }
    }
}

/// One resolved call site: caller, the CFG node holding the call, and the
/// callee identity. Argument expressions stay on the CFG node itself; the
/// correspondence is positional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub caller: String,
    pub node: NodeId,
    pub callee: CallTarget,
}

/// Program-wide call graph over defined functions.
pub struct CallGraph {
    graph: DiGraph<String, CallSite>,
    index: FxHashMap<String, NodeIndex>,
    recursive: FxHashSet<String>,
    sites: FxHashMap<String, Vec<CallSite>>,
}

impl CallGraph {
    pub fn new(
        graph: DiGraph<String, CallSite>,
        index: FxHashMap<String, NodeIndex>,
        recursive: FxHashSet<String>,
        sites: FxHashMap<String, Vec<CallSite>>,
    ) -> Self {
        Self {
            graph,
            index,
            recursive,
            sites,
        }
    }

    /// All call sites appearing in `caller`, including unresolved ones.
    pub fn call_sites(&self, caller: &str) -> &[CallSite] {
        self.sites.get(caller).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `function` participates in a recursion cycle (including
    /// self-recursion), per strongly-connected-component analysis.
    pub fn is_recursive(&self, function: &str) -> bool {
        self.recursive.contains(function)
    }

    pub fn callees_of(&self, caller: &str) -> Vec<String> {
        self.neighbors(caller, Direction::Outgoing)
    }

    pub fn callers_of(&self, callee: &str) -> Vec<String> {
        self.neighbors(callee, Direction::Incoming)
    }

    fn neighbors(&self, function: &str, dir: Direction) -> Vec<String> {
        match self.index.get(function) {
            Some(id) => {
                let mut names: Vec<String> = self
                    .graph
                    .neighbors_directed(*id, dir)
                    .map(|n| self.graph[n].clone())
                    .collect();
                names.sort();
                names.dedup();
                names
            }
            None => Vec::new(),
        }
    }

    pub fn function_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
