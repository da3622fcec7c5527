/*
 * Analysis Engine
 *
 * Orchestration: build every function's CFG once, resolve the call graph,
 * explore each function as an analysis root, run the checkers, and serve
 * slice requests. CFGs and the call graph are immutable after construction;
 * function explorations share nothing mutable, so they run in parallel under
 * rayon when enabled.
 */

use crate::errors::{ResguardError, Result};
use crate::features::abstract_state::EffectTable;
use crate::features::call_graph::{resolve_call_graph, CallGraph};
use crate::features::checkers::{run_all_checkers, DefectReport};
use crate::features::flow_graph::{build_cfg, Cfg, NodeId};
use crate::features::path_explorer::{AnalysisStatus, ExplorerConfig, Exploration, PathExplorer};
use crate::features::slicing::{SliceResult, SliceTarget, Slicer};
use crate::shared::models::Program;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub effect_table: EffectTable,
    /// Worklist iteration budget per analysis root.
    pub max_iterations: usize,
    /// Inlining depth bound.
    pub max_inline_depth: usize,
    /// Explore independent functions on the rayon pool.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let explorer = ExplorerConfig::default();
        Self {
            effect_table: EffectTable::kernel(),
            max_iterations: explorer.max_iterations,
            max_inline_depth: explorer.max_inline_depth,
            parallel: true,
        }
    }
}

/// Per-function analysis outcome handed to the reporting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionAnalysis {
    pub function: String,
    pub status: AnalysisStatus,
    pub reports: Vec<DefectReport>,
}

pub struct AnalysisEngine {
    program: Program,
    cfgs: FxHashMap<String, Cfg>,
    call_graph: CallGraph,
    config: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(program: Program, config: AnalysisConfig) -> Self {
        let cfgs: FxHashMap<String, Cfg> = program
            .functions
            .iter()
            .map(|f| (f.name.clone(), build_cfg(f)))
            .collect();
        let call_graph = resolve_call_graph(&program, &cfgs);
        info!(
            functions = cfgs.len(),
            call_edges = call_graph.edge_count(),
            "analysis engine ready"
        );
        Self {
            program,
            cfgs,
            call_graph,
            config,
        }
    }

    pub fn cfg(&self, function: &str) -> Option<&Cfg> {
        self.cfgs.get(function)
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// Analyze every function; results come back in function-name order
    /// regardless of scheduling.
    pub fn analyze_all(&self) -> Vec<FunctionAnalysis> {
        let mut names: Vec<&String> = self.cfgs.keys().collect();
        names.sort();

        if self.config.parallel {
            names
                .par_iter()
                .map(|name| {
                    self.analyze_function(name.as_str())
                        .expect("cfg exists for name")
                })
                .collect()
        } else {
            names
                .iter()
                .map(|name| {
                    self.analyze_function(name.as_str())
                        .expect("cfg exists for name")
                })
                .collect()
        }
    }

    pub fn analyze_function(&self, function: &str) -> Result<FunctionAnalysis> {
        let cfg = self
            .cfgs
            .get(function)
            .ok_or_else(|| ResguardError::UnknownFunction(function.to_string()))?;

        let exploration = self.explore(function)?;
        if let AnalysisStatus::Incomplete { reason } = &exploration.status {
            warn!(function, %reason, "analysis incomplete");
        }

        let reports = run_all_checkers(cfg, &exploration, &self.program, &self.config.effect_table);
        debug!(
            function,
            iterations = exploration.iterations,
            reports = reports.len(),
            "function analyzed"
        );

        Ok(FunctionAnalysis {
            function: function.to_string(),
            status: exploration.status,
            reports,
        })
    }

    /// Raw exploration of one function, for callers that want the states.
    pub fn explore(&self, function: &str) -> Result<Exploration> {
        let explorer = PathExplorer::new(
            &self.program,
            &self.cfgs,
            &self.call_graph,
            &self.config.effect_table,
            ExplorerConfig {
                max_iterations: self.config.max_iterations,
                max_inline_depth: self.config.max_inline_depth,
            },
        );
        explorer.explore(function)
    }

    /// Slice for an explicit (function, node) target.
    pub fn slice(&self, function: &str, node: NodeId) -> Result<SliceResult> {
        let slicer = Slicer::new(&self.program, &self.cfgs, &self.call_graph);
        slicer.slice(SliceTarget {
            function: function.to_string(),
            node,
        })
    }

    /// Slice for the first call to `callee` inside `caller`.
    pub fn slice_call(&self, caller: &str, callee: &str) -> Result<SliceResult> {
        let cfg = self
            .cfgs
            .get(caller)
            .ok_or_else(|| ResguardError::UnknownFunction(caller.to_string()))?;
        let node = cfg
            .nodes_in_order()
            .find(|id| {
                cfg.node(*id)
                    .call_expr()
                    .is_some_and(|call| call.callee == callee)
            })
            .ok_or_else(|| {
                ResguardError::InvalidTarget(format!("no call to {} in {}", callee, caller))
            })?;
        self.slice(caller, node)
    }
}
