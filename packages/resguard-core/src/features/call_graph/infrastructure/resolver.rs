/*
 * Call Graph Resolver
 *
 * Maps every call site to a callee identity by exact name match against the
 * program: a name with a body resolves to Defined, a declared external to
 * External, anything else (function pointers, undeclared names) to Unknown.
 *
 * Recursion is detected up front via Tarjan SCC so the explorer can skip
 * self-inlining cheaply; the authoritative termination guard remains the
 * inlining stack's no-reentry rule.
 */

use crate::features::call_graph::domain::{CallGraph, CallSite, CallTarget};
use crate::features::flow_graph::Cfg;
use crate::shared::models::Program;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Build the call graph for all functions whose CFGs were built.
pub fn resolve_call_graph(program: &Program, cfgs: &FxHashMap<String, Cfg>) -> CallGraph {
    let mut graph: DiGraph<String, CallSite> = DiGraph::new();
    let mut index: FxHashMap<String, NodeIndex> = FxHashMap::default();
    let mut sites: FxHashMap<String, Vec<CallSite>> = FxHashMap::default();

    for function in &program.functions {
        index
            .entry(function.name.clone())
            .or_insert_with(|| graph.add_node(function.name.clone()));
    }

    let mut names: Vec<&String> = cfgs.keys().collect();
    names.sort();

    for caller in names {
        let cfg = &cfgs[caller];
        let caller_id = match index.get(caller) {
            Some(id) => *id,
            None => continue,
        };
        let mut caller_sites = Vec::new();

        for node_id in cfg.nodes_in_order() {
            let Some(call) = cfg.node(node_id).call_expr() else {
                continue;
            };
            let callee = resolve_target(program, &call.callee);
            let site = CallSite {
                caller: caller.clone(),
                node: node_id,
                callee: callee.clone(),
            };
            if let CallTarget::Defined(name) = &callee {
                let callee_id = *index
                    .entry(name.clone())
                    .or_insert_with(|| graph.add_node(name.clone()));
                graph.add_edge(caller_id, callee_id, site.clone());
            }
            caller_sites.push(site);
        }
        sites.insert(caller.clone(), caller_sites);
    }

    let recursive = recursive_functions(&graph);
    debug!(
        functions = graph.node_count(),
        call_edges = graph.edge_count(),
        recursive = recursive.len(),
        "call graph resolved"
    );

    CallGraph::new(graph, index, recursive, sites)
}

/// Exact-name resolution against the program and symbol table.
pub fn resolve_target(program: &Program, name: &str) -> CallTarget {
    if program.has_function(name) {
        CallTarget::Defined(name.to_string())
    } else if program.symbols.is_external(name) {
        CallTarget::External(name.to_string())
    } else {
        CallTarget::Unknown(name.to_string())
    }
}

fn recursive_functions(graph: &DiGraph<String, CallSite>) -> FxHashSet<String> {
    let mut recursive = FxHashSet::default();
    for component in tarjan_scc(graph) {
        if component.len() > 1 {
            for id in component {
                recursive.insert(graph[id].clone());
            }
        } else if let Some(id) = component.first() {
            // Self-recursion shows up as a singleton SCC with a self-edge.
            if graph.find_edge(*id, *id).is_some() {
                recursive.insert(graph[*id].clone());
            }
        }
    }
    recursive
}
