/*
 * CFG Builder
 *
 * Lowers one function's statement tree into a directed graph of nodes with
 * explicit branch, fallthrough and loop-back edges.
 *
 * Guarantees:
 * - Every statement appears in exactly one node.
 * - Loops produce a LoopHeader with a body edge, a LoopExit edge, and a
 *   back-edge from the last body node.
 * - Switch lowers to an n-way branch; a case without a terminal break gets a
 *   Fallthrough edge into the next arm.
 * - Each `return` terminates at its own Exit node; falling off the end of the
 *   body reaches a shared final Exit.
 * - A statement kind with no lowering rule becomes an UnknownEffect node.
 */

use crate::features::flow_graph::domain::{Cfg, CfgEdgeKind, CfgNode, Effect, NodeId, NodeKind};
use crate::shared::models::{CaseLabel, Expr, Function, Stmt};
use petgraph::graph::DiGraph;

/// A dangling edge waiting for its target node.
type Tail = (NodeId, CfgEdgeKind);

struct CfgBuilder {
    graph: DiGraph<CfgNode, CfgEdgeKind>,
    exits: Vec<NodeId>,
}

/// Build the CFG for one function.
pub fn build_cfg(function: &Function) -> Cfg {
    let mut builder = CfgBuilder {
        graph: DiGraph::new(),
        exits: Vec::new(),
    };

    let entry = builder.graph.add_node(CfgNode::new(NodeKind::Entry));
    let tails = builder.lower_block(&function.body, vec![(entry, CfgEdgeKind::Sequential)]);

    // Falling off the end of the body is an implicit void return.
    if !tails.is_empty() {
        let exit = builder.graph.add_node(CfgNode::new(NodeKind::Exit));
        builder.connect(&tails, exit);
        builder.exits.push(exit);
    }

    Cfg {
        function: function.name.clone(),
        graph: builder.graph,
        entry,
        exits: builder.exits,
    }
}

impl CfgBuilder {
    fn connect(&mut self, tails: &[Tail], target: NodeId) {
        for (source, kind) in tails {
            self.graph.add_edge(*source, target, kind.clone());
        }
    }

    /// Lower a statement sequence. `preds` are the dangling edges entering the
    /// sequence; the return value is the dangling edges leaving it. An empty
    /// return means all paths through the sequence ended in `return`.
    /// Statements after a `return` are still lowered (every statement owns a
    /// node); they just keep no predecessors.
    fn lower_block(&mut self, stmts: &[Stmt], mut preds: Vec<Tail>) -> Vec<Tail> {
        for stmt in stmts {
            preds = self.lower_stmt(stmt, preds);
        }
        preds
    }

    fn lower_stmt(&mut self, stmt: &Stmt, preds: Vec<Tail>) -> Vec<Tail> {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                let kind = if matches!(rhs, Expr::Call(_)) {
                    NodeKind::Call
                } else {
                    NodeKind::Statement
                };
                let node = self.graph.add_node(CfgNode::with_effect(
                    kind,
                    Effect::Assign {
                        lhs: lhs.clone(),
                        rhs: rhs.clone(),
                    },
                ));
                self.connect(&preds, node);
                vec![(node, CfgEdgeKind::Sequential)]
            }

            Stmt::Call(call) => {
                let node = self
                    .graph
                    .add_node(CfgNode::with_effect(NodeKind::Call, Effect::Call(call.clone())));
                self.connect(&preds, node);
                vec![(node, CfgEdgeKind::Sequential)]
            }

            Stmt::Return(expr) => {
                let node = self.graph.add_node(CfgNode::with_effect(
                    NodeKind::Return,
                    Effect::Return(expr.clone()),
                ));
                self.connect(&preds, node);
                let exit = self.graph.add_node(CfgNode::new(NodeKind::Exit));
                self.graph.add_edge(node, exit, CfgEdgeKind::Sequential);
                self.exits.push(exit);
                Vec::new()
            }

            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = self.graph.add_node(CfgNode::with_effect(
                    NodeKind::Branch,
                    Effect::Branch(cond.clone()),
                ));
                self.connect(&preds, branch);

                let mut tails =
                    self.lower_block(then_body, vec![(branch, CfgEdgeKind::TrueBranch)]);
                if else_body.is_empty() {
                    tails.push((branch, CfgEdgeKind::FalseBranch));
                } else {
                    tails.extend(
                        self.lower_block(else_body, vec![(branch, CfgEdgeKind::FalseBranch)]),
                    );
                }
                tails
            }

            Stmt::Loop { cond, body } => {
                let header = self.graph.add_node(CfgNode::with_effect(
                    NodeKind::LoopHeader,
                    Effect::Branch(cond.clone()),
                ));
                self.connect(&preds, header);

                let body_tails =
                    self.lower_block(body, vec![(header, CfgEdgeKind::TrueBranch)]);
                for (source, _) in &body_tails {
                    self.graph.add_edge(*source, header, CfgEdgeKind::LoopBack);
                }
                vec![(header, CfgEdgeKind::LoopExit)]
            }

            Stmt::Switch { scrutinee, cases } => {
                let branch = self.graph.add_node(CfgNode::with_effect(
                    NodeKind::Branch,
                    Effect::Branch(scrutinee.clone()),
                ));
                self.connect(&preds, branch);

                let mut tails: Vec<Tail> = Vec::new();
                let mut pending: Vec<Tail> = Vec::new();
                let mut has_default = false;

                for case in cases {
                    if matches!(case.label, CaseLabel::Default) {
                        has_default = true;
                    }
                    let mut entries =
                        vec![(branch, CfgEdgeKind::CaseBranch(case.label.clone()))];
                    entries.extend(
                        pending
                            .drain(..)
                            .map(|(n, _)| (n, CfgEdgeKind::Fallthrough)),
                    );
                    let case_tails = self.lower_block(&case.body, entries);
                    if case.falls_through {
                        pending = case_tails;
                    } else {
                        tails.extend(case_tails);
                    }
                }

                // A trailing fallthrough leaves the switch.
                tails.extend(pending);

                if !has_default {
                    tails.push((branch, CfgEdgeKind::CaseBranch(CaseLabel::Default)));
                }
                tails
            }

            Stmt::Unknown => {
                let node = self.graph.add_node(CfgNode::new(NodeKind::UnknownEffect));
                self.connect(&preds, node);
                vec![(node, CfgEdgeKind::Sequential)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{CmpOp, SwitchCase};
    use petgraph::visit::EdgeRef;

    fn count_kind(cfg: &Cfg, kind: NodeKind) -> usize {
        cfg.graph
            .node_indices()
            .filter(|id| cfg.graph[*id].kind == kind)
            .count()
    }

    #[test]
    fn test_sequential_statements() {
        let f = Function::new(
            "f",
            vec![],
            vec![
                Stmt::assign(Expr::var("a"), Expr::Int(1)),
                Stmt::assign(Expr::var("b"), Expr::Int(2)),
            ],
        );
        let cfg = build_cfg(&f);

        // entry + 2 statements + fall-off exit
        assert_eq!(cfg.node_count(), 4);
        assert_eq!(cfg.exits.len(), 1);
        assert_eq!(count_kind(&cfg, NodeKind::Statement), 2);
    }

    #[test]
    fn test_branch_edges() {
        let f = Function::new(
            "f",
            vec!["p"],
            vec![Stmt::if_else(
                Expr::var("p"),
                vec![Stmt::call("use", vec![Expr::var("p")])],
                vec![Stmt::call("other", vec![])],
            )],
        );
        let cfg = build_cfg(&f);

        let branch = cfg
            .graph
            .node_indices()
            .find(|id| cfg.graph[*id].kind == NodeKind::Branch)
            .unwrap();
        let out: Vec<_> = cfg
            .graph
            .edges(branch)
            .map(|e| e.weight().clone())
            .collect();
        assert!(out.contains(&CfgEdgeKind::TrueBranch));
        assert!(out.contains(&CfgEdgeKind::FalseBranch));
    }

    #[test]
    fn test_loop_back_edge() {
        let f = Function::new(
            "f",
            vec![],
            vec![Stmt::loop_while(
                Expr::cmp(CmpOp::Lt, Expr::var("i"), Expr::Int(10)),
                vec![Stmt::assign(Expr::var("i"), Expr::Int(0))],
            )],
        );
        let cfg = build_cfg(&f);

        let header = cfg
            .graph
            .node_indices()
            .find(|id| cfg.graph[*id].kind == NodeKind::LoopHeader)
            .unwrap();
        let back_edges = cfg
            .graph
            .edge_indices()
            .filter(|e| {
                cfg.graph[*e] == CfgEdgeKind::LoopBack
                    && cfg.graph.edge_endpoints(*e).unwrap().1 == header
            })
            .count();
        assert_eq!(back_edges, 1);
        assert!(cfg
            .graph
            .edges(header)
            .any(|e| *e.weight() == CfgEdgeKind::LoopExit));
    }

    #[test]
    fn test_each_return_gets_own_exit() {
        let f = Function::new(
            "f",
            vec!["p"],
            vec![
                Stmt::if_then(Expr::not(Expr::var("p")), vec![Stmt::ret(Expr::Int(0))]),
                Stmt::ret(Expr::var("p")),
            ],
        );
        let cfg = build_cfg(&f);
        assert_eq!(cfg.exits.len(), 2);
        assert_eq!(count_kind(&cfg, NodeKind::Return), 2);
    }

    #[test]
    fn test_switch_with_range_and_fallthrough() {
        let f = Function::new(
            "f",
            vec![],
            vec![Stmt::Switch {
                scrutinee: Expr::var("i"),
                cases: vec![
                    SwitchCase {
                        label: CaseLabel::Range(0x70000000, 0x7fffffff),
                        body: vec![Stmt::assign(Expr::var("i"), Expr::Int(10))],
                        falls_through: true,
                    },
                    SwitchCase {
                        label: CaseLabel::Default,
                        body: vec![Stmt::ret(Expr::Int(1))],
                        falls_through: false,
                    },
                ],
            }],
        );
        let cfg = build_cfg(&f);

        let fallthrough = cfg
            .graph
            .edge_indices()
            .filter(|e| cfg.graph[*e] == CfgEdgeKind::Fallthrough)
            .count();
        assert_eq!(fallthrough, 1);

        let case_edges = cfg
            .graph
            .edge_indices()
            .filter(|e| matches!(cfg.graph[*e], CfgEdgeKind::CaseBranch(_)))
            .count();
        assert_eq!(case_edges, 2);
    }

    #[test]
    fn test_unknown_statement_lowering() {
        let f = Function::new("f", vec![], vec![Stmt::Unknown, Stmt::ret_void()]);
        let cfg = build_cfg(&f);
        assert_eq!(count_kind(&cfg, NodeKind::UnknownEffect), 1);
    }
}
