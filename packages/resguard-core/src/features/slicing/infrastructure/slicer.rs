/*
 * Slicer / Tracer
 *
 * Given a target call site, computes the backward-reachable nodes in the
 * caller (what can influence reaching the target) and the forward-reachable
 * nodes (what it can reach before the function returns); their union,
 * extended through resolvable callees, is the slice. The trace walks one
 * concrete entry-to-exit path forced through the target and lists the
 * side-effecting events (calls) in program order, the target included
 * exactly once.
 */

use crate::errors::{ResguardError, Result};
use crate::features::call_graph::{CallGraph, CallTarget};
use crate::features::flow_graph::{Cfg, NodeId};
use crate::features::slicing::domain::{SliceResult, SliceTarget, TraceEvent};
use crate::shared::models::Program;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Bound on transitive callee expansion, mirroring the exploration's inlining
/// depth.
const CALLEE_DEPTH: usize = 4;

pub struct Slicer<'a> {
    program: &'a Program,
    cfgs: &'a FxHashMap<String, Cfg>,
    call_graph: &'a CallGraph,
}

impl<'a> Slicer<'a> {
    pub fn new(
        program: &'a Program,
        cfgs: &'a FxHashMap<String, Cfg>,
        call_graph: &'a CallGraph,
    ) -> Self {
        Self {
            program,
            cfgs,
            call_graph,
        }
    }

    pub fn slice(&self, target: SliceTarget) -> Result<SliceResult> {
        let cfg = self.cfgs.get(&target.function).ok_or_else(|| {
            ResguardError::UnknownFunction(target.function.clone())
        })?;
        if cfg.node(target.node).call_expr().is_none() {
            return Err(ResguardError::InvalidTarget(format!(
                "node {} in {} is not a call site",
                target.node.index(),
                target.function
            )));
        }

        let backward = reachable(cfg, target.node, Direction::Incoming);
        let forward = reachable(cfg, target.node, Direction::Outgoing);

        let mut nodes: Vec<NodeId> = backward.union(&forward).copied().collect();
        nodes.sort_by_key(|n| n.index());

        let functions = self.touched_functions(&target, &nodes);
        let trace = self.trace_through(cfg, target.node);

        Ok(SliceResult {
            target,
            functions,
            nodes,
            trace,
        })
    }

    /// Caller first, then callees of sliced call nodes in program order,
    /// expanded transitively through resolvable callees.
    fn touched_functions(&self, target: &SliceTarget, nodes: &[NodeId]) -> Vec<String> {
        let mut functions = vec![target.function.clone()];
        let mut seen: FxHashSet<String> = functions.iter().cloned().collect();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        let sliced: FxHashSet<NodeId> = nodes.iter().copied().collect();
        for site in self.call_graph.call_sites(&target.function) {
            if !sliced.contains(&site.node) {
                continue;
            }
            if let CallTarget::Defined(name) = &site.callee {
                if seen.insert(name.clone()) {
                    functions.push(name.clone());
                    queue.push_back((name.clone(), 1));
                }
            }
        }

        while let Some((function, depth)) = queue.pop_front() {
            if depth >= CALLEE_DEPTH {
                continue;
            }
            for callee in self.call_graph.callees_of(&function) {
                if self.program.has_function(&callee) && seen.insert(callee.clone()) {
                    functions.push(callee.clone());
                    queue.push_back((callee, depth + 1));
                }
            }
        }
        functions
    }

    /// One concrete path entry → target → exit; events are the call nodes on
    /// it, in path order.
    fn trace_through(&self, cfg: &Cfg, target: NodeId) -> Vec<TraceEvent> {
        let into_target = shortest_path(cfg, cfg.entry, target, Direction::Outgoing);
        let mut path = match into_target {
            Some(p) => p,
            None => return Vec::new(),
        };

        // Continue from the target to the nearest exit, skipping the target
        // itself so it appears once.
        if let Some(exit_path) = cfg
            .exits
            .iter()
            .filter_map(|exit| shortest_path(cfg, target, *exit, Direction::Outgoing))
            .min_by_key(|p| p.len())
        {
            path.extend(exit_path.into_iter().skip(1));
        }

        path.into_iter()
            .filter_map(|node| {
                cfg.node(node).call_expr().map(|call| TraceEvent {
                    node: node.index() as u32,
                    callee: call.callee.clone(),
                    description: cfg.node(node).label(),
                })
            })
            .collect()
    }
}

fn reachable(cfg: &Cfg, from: NodeId, direction: Direction) -> FxHashSet<NodeId> {
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    let mut queue = VecDeque::from([from]);
    seen.insert(from);
    while let Some(node) = queue.pop_front() {
        for next in cfg.graph.neighbors_directed(node, direction) {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

/// BFS shortest path, deterministic via sorted neighbor order.
fn shortest_path(
    cfg: &Cfg,
    from: NodeId,
    to: NodeId,
    direction: Direction,
) -> Option<Vec<NodeId>> {
    if from == to {
        return Some(vec![from]);
    }
    let mut parent: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut queue = VecDeque::from([from]);
    while let Some(node) = queue.pop_front() {
        let mut next_nodes: Vec<NodeId> = cfg
            .graph
            .edges_directed(node, direction)
            .map(|e| if direction == Direction::Outgoing { e.target() } else { e.source() })
            .collect();
        next_nodes.sort_by_key(|n| n.index());
        for next in next_nodes {
            if next != from && !parent.contains_key(&next) {
                parent.insert(next, node);
                if next == to {
                    let mut path = vec![to];
                    let mut current = to;
                    while let Some(p) = parent.get(&current) {
                        path.push(*p);
                        current = *p;
                        if current == from {
                            break;
                        }
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
    }
    None
}
