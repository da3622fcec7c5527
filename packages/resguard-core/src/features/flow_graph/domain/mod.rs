//! Control Flow Graph nodes, edges and the per-function graph.

use crate::shared::models::{CallExpr, CaseLabel, Expr};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier inside one function's CFG.
pub type NodeId = NodeIndex;

/// CFG Node Kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Entry,
    Statement,
    Branch,
    LoopHeader,
    Call,
    Return,
    Exit,
    /// A statement the builder had no lowering rule for. Transfer widens
    /// every tracked location to Unknown at this point.
    UnknownEffect,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Entry => "ENTRY",
            NodeKind::Statement => "STATEMENT",
            NodeKind::Branch => "BRANCH",
            NodeKind::LoopHeader => "LOOP_HEADER",
            NodeKind::Call => "CALL",
            NodeKind::Return => "RETURN",
            NodeKind::Exit => "EXIT",
            NodeKind::UnknownEffect => "UNKNOWN_EFFECT",
        }
    }
}

/// CFG Edge Kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfgEdgeKind {
    Sequential,
    TrueBranch,
    FalseBranch,
    /// One arm of a lowered switch; carries the matched label.
    CaseBranch(CaseLabel),
    /// Case body without a terminal break into the next arm.
    Fallthrough,
    LoopBack,
    LoopExit,
}

impl fmt::Display for CfgEdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfgEdgeKind::Sequential => write!(f, "seq"),
            CfgEdgeKind::TrueBranch => write!(f, "true"),
            CfgEdgeKind::FalseBranch => write!(f, "false"),
            CfgEdgeKind::CaseBranch(CaseLabel::Values(vs)) => write!(f, "case {:?}", vs),
            CfgEdgeKind::CaseBranch(CaseLabel::Range(lo, hi)) => {
                write!(f, "case {} ... {}", lo, hi)
            }
            CfgEdgeKind::CaseBranch(CaseLabel::Default) => write!(f, "default"),
            CfgEdgeKind::Fallthrough => write!(f, "fallthrough"),
            CfgEdgeKind::LoopBack => write!(f, "loop_back"),
            CfgEdgeKind::LoopExit => write!(f, "loop_exit"),
        }
    }
}

/// One primitive effect inside a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    Assign { lhs: Expr, rhs: Expr },
    Call(CallExpr),
    /// Branch or loop condition; the decision itself happens on the edges.
    Branch(Expr),
    Return(Option<Expr>),
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Assign { lhs, rhs } => write!(f, "{} = {}", lhs, rhs),
            Effect::Call(call) => write!(f, "{}", Expr::Call(call.clone())),
            Effect::Branch(cond) => write!(f, "branch {}", cond),
            Effect::Return(Some(e)) => write!(f, "return {}", e),
            Effect::Return(None) => write!(f, "return"),
        }
    }
}

/// A basic block: ordered primitive effects plus a kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgNode {
    pub kind: NodeKind,
    pub effects: Vec<Effect>,
}

impl CfgNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(kind: NodeKind, effect: Effect) -> Self {
        Self {
            kind,
            effects: vec![effect],
        }
    }

    /// The branch condition, for Branch and LoopHeader nodes.
    pub fn branch_cond(&self) -> Option<&Expr> {
        self.effects.iter().find_map(|e| match e {
            Effect::Branch(cond) => Some(cond),
            _ => None,
        })
    }

    /// The call expression, for Call nodes and call-assignments.
    pub fn call_expr(&self) -> Option<&CallExpr> {
        self.effects.iter().find_map(|e| match e {
            Effect::Call(call) => Some(call),
            Effect::Assign {
                rhs: Expr::Call(call),
                ..
            } => Some(call),
            _ => None,
        })
    }

    pub fn label(&self) -> String {
        if self.effects.is_empty() {
            self.kind.as_str().to_string()
        } else {
            self.effects
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

/// One function's control-flow graph.
///
/// Built once, immutable afterwards. One Entry node; one Exit node per
/// `return` statement plus one for falling off the end.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub function: String,
    pub graph: DiGraph<CfgNode, CfgEdgeKind>,
    pub entry: NodeId,
    pub exits: Vec<NodeId>,
}

impl Cfg {
    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.graph[id]
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Outgoing)
    }

    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Incoming)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Node ids in creation order, which follows program order.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_indices()
    }

    /// Graphviz rendering for debugging.
    pub fn to_dot(&self) -> String {
        let mut out = format!("digraph \"{}\" {{\n", self.function);
        for id in self.graph.node_indices() {
            let node = &self.graph[id];
            out.push_str(&format!(
                "  n{} [label=\"{}: {}\"];\n",
                id.index(),
                node.kind.as_str(),
                node.label().replace('"', "'")
            ));
        }
        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                out.push_str(&format!(
                    "  n{} -> n{} [label=\"{}\"];\n",
                    a.index(),
                    b.index(),
                    self.graph[edge]
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}
