/*
 * Path Explorer
 *
 * Kildall-style worklist fixed point over one function's CFG: pop a node,
 * apply the transfer function, join the result into each successor's
 * accumulator, re-enqueue on change. Loops converge through the same
 * iteration; the lattice has finite height, so no widening step is needed.
 * A shared iteration budget guards against malformed input; exceeding it
 * yields an Incomplete status, not a defect.
 *
 * Calls to resolvable callees are inlined: the callee's CFG is explored with
 * the caller's state at the call site as its entry state, formals aliased to
 * actuals, and the callee's exit states joined back after the call. A call
 * that would re-enter a function already on the inlining stack falls back to
 * the unknown-callee effect, silently.
 */

use crate::errors::{ResguardError, Result};
use crate::features::abstract_state::domain::lattice::{
    AllocationTag, CellState, Nullability,
};
use crate::features::abstract_state::domain::path::AccessPath;
use crate::features::abstract_state::domain::state::ReturnValue;
use crate::features::abstract_state::infrastructure::transfer;
use crate::features::abstract_state::{AbstractState, EffectTable, TransferCtx};
use crate::features::call_graph::CallGraph;
use crate::features::flow_graph::{Cfg, CfgEdgeKind, Effect, NodeId, NodeKind};
use crate::features::path_explorer::domain::{AnalysisStatus, Exploration};
use crate::shared::models::{CallExpr, Expr, Program};
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Worklist iteration budget shared across a root function and everything
    /// inlined into it.
    pub max_iterations: usize,
    /// Inlining depth bound; the no-reentry rule is the termination guard,
    /// this bounds cost.
    pub max_inline_depth: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            max_inline_depth: 4,
        }
    }
}

pub struct PathExplorer<'a> {
    program: &'a Program,
    cfgs: &'a FxHashMap<String, Cfg>,
    call_graph: &'a CallGraph,
    effects: &'a EffectTable,
    config: ExplorerConfig,
}

struct RunResult {
    node_states: FxHashMap<NodeId, AbstractState>,
    exit_states: Vec<(NodeId, AbstractState)>,
    first_reach: FxHashMap<NodeId, NodeId>,
    iterations: usize,
    complete: bool,
}

impl<'a> PathExplorer<'a> {
    pub fn new(
        program: &'a Program,
        cfgs: &'a FxHashMap<String, Cfg>,
        call_graph: &'a CallGraph,
        effects: &'a EffectTable,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            program,
            cfgs,
            call_graph,
            effects,
            config,
        }
    }

    /// Explore one function as an analysis root, starting from the empty
    /// state (locks default Unlocked, nothing tracked).
    pub fn explore(&self, function: &str) -> Result<Exploration> {
        let cfg = self
            .cfgs
            .get(function)
            .ok_or_else(|| ResguardError::UnknownFunction(function.to_string()))?;

        let mut stack = vec![function.to_string()];
        let mut budget = self.config.max_iterations;
        let run = self.run(cfg, AbstractState::empty(), &mut stack, &mut budget);

        let status = if run.complete {
            AnalysisStatus::Complete
        } else {
            debug!(function, "worklist iteration bound exceeded");
            AnalysisStatus::Incomplete {
                reason: format!(
                    "worklist iteration bound of {} exceeded",
                    self.config.max_iterations
                ),
            }
        };

        Ok(Exploration {
            function: function.to_string(),
            status,
            node_states: run.node_states,
            exit_states: run.exit_states,
            first_reach: run.first_reach,
            iterations: run.iterations,
        })
    }

    fn run(
        &self,
        cfg: &Cfg,
        entry_state: AbstractState,
        stack: &mut Vec<String>,
        budget: &mut usize,
    ) -> RunResult {
        let decl = self.program.function(&cfg.function);
        let params: &[String] = decl.map(|f| f.params.as_slice()).unwrap_or(&[]);
        let ctx = TransferCtx {
            function: &cfg.function,
            params,
            symbols: &self.program.symbols,
            effects: self.effects,
        };

        let mut node_states: FxHashMap<NodeId, AbstractState> = FxHashMap::default();
        let mut first_reach: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        node_states.insert(cfg.entry, entry_state);

        let mut worklist: VecDeque<NodeId> = VecDeque::new();
        let mut queued: FxHashSet<NodeId> = FxHashSet::default();
        worklist.push_back(cfg.entry);
        queued.insert(cfg.entry);

        let mut iterations = 0usize;
        let mut complete = true;

        while let Some(node) = worklist.pop_front() {
            queued.remove(&node);
            if *budget == 0 {
                complete = false;
                break;
            }
            *budget -= 1;
            iterations += 1;

            let state = match node_states.get(&node) {
                Some(s) => s.clone(),
                None => continue,
            };

            let (out, ok) = self.transfer_node(cfg, node, state, &ctx, stack, budget);
            if !ok {
                complete = false;
            }
            if out.is_fatal() {
                // The path terminates here; nothing flows to successors.
                continue;
            }

            let mut edges: Vec<(NodeId, CfgEdgeKind)> = cfg
                .graph
                .edges(node)
                .map(|e| (e.target(), e.weight().clone()))
                .collect();
            edges.sort_by_key(|(target, _)| target.index());

            for (succ, kind) in edges {
                let mut refined = out.clone();
                let feasible = match (&kind, cfg.node(node).branch_cond()) {
                    (CfgEdgeKind::TrueBranch, Some(cond)) => {
                        transfer::refine_edge(&mut refined, cond, true, &ctx)
                    }
                    (CfgEdgeKind::FalseBranch | CfgEdgeKind::LoopExit, Some(cond)) => {
                        transfer::refine_edge(&mut refined, cond, false, &ctx)
                    }
                    _ => true,
                };
                if !feasible {
                    continue;
                }

                match node_states.get(&succ) {
                    Some(old) => {
                        let joined = AbstractState::join(old, &refined);
                        if joined != *old {
                            node_states.insert(succ, joined);
                            if queued.insert(succ) {
                                worklist.push_back(succ);
                            }
                        }
                    }
                    None => {
                        node_states.insert(succ, refined);
                        first_reach.insert(succ, node);
                        if queued.insert(succ) {
                            worklist.push_back(succ);
                        }
                    }
                }
            }
        }

        let exit_states = cfg
            .exits
            .iter()
            .filter_map(|exit| {
                node_states
                    .get(exit)
                    .filter(|s| !s.is_fatal())
                    .map(|s| (*exit, s.clone()))
            })
            .collect();

        RunResult {
            node_states,
            exit_states,
            first_reach,
            iterations,
            complete,
        }
    }

    fn transfer_node(
        &self,
        cfg: &Cfg,
        node: NodeId,
        mut state: AbstractState,
        ctx: &TransferCtx,
        stack: &mut Vec<String>,
        budget: &mut usize,
    ) -> (AbstractState, bool) {
        if cfg.node(node).kind == NodeKind::UnknownEffect {
            state.widen_all();
            return (state, true);
        }

        let mut ok = true;
        for effect in &cfg.node(node).effects {
            match effect {
                Effect::Assign {
                    lhs,
                    rhs: Expr::Call(call),
                } => {
                    ok &= self.handle_call(&mut state, call, Some(lhs), ctx, stack, budget);
                }
                Effect::Assign { lhs, rhs } => {
                    transfer::apply_assign(&mut state, lhs, rhs, ctx);
                }
                Effect::Call(call) => {
                    ok &= self.handle_call(&mut state, call, None, ctx, stack, budget);
                }
                Effect::Branch(_) => {}
                Effect::Return(expr) => {
                    transfer::apply_return(&mut state, expr.as_ref(), ctx);
                }
            }
            if state.is_fatal() {
                break;
            }
        }
        (state, ok)
    }

    /// Calls resolve in three tiers: effect-table primitives first, then
    /// inlinable defined callees, then the unknown-callee degradation.
    fn handle_call(
        &self,
        state: &mut AbstractState,
        call: &CallExpr,
        dest: Option<&Expr>,
        ctx: &TransferCtx,
        stack: &mut Vec<String>,
        budget: &mut usize,
    ) -> bool {
        if let Some(effect) = self.effects.get(&call.callee) {
            transfer::apply_builtin(state, effect, call, dest, ctx);
            return true;
        }

        let callee_name = call.callee.as_str();
        let inlinable = self.program.has_function(callee_name)
            && self.cfgs.contains_key(callee_name)
            && !stack.iter().any(|f| f == callee_name)
            && stack.len() <= self.config.max_inline_depth;

        if !inlinable {
            if self.program.has_function(callee_name) {
                // Re-entry or depth bound: silent unknown-callee fallback.
                debug!(
                    callee = callee_name,
                    recursive = self.call_graph.is_recursive(callee_name),
                    "skipping inline"
                );
            }
            transfer::apply_unknown_call(state, call, dest, ctx);
            return true;
        }

        let callee_cfg = &self.cfgs[callee_name];
        let callee_decl = self
            .program
            .function(callee_name)
            .expect("inlinable callee has a declaration");

        // Entry state: caller state with formals aliased to actuals.
        let mut entry_state = state.clone();
        for (i, param) in callee_decl.params.iter().enumerate() {
            let param_path = AccessPath::local(callee_name, param);
            entry_state.reassign_target(&param_path);
            match call.args.get(i) {
                Some(arg) => match ctx.path_of(arg) {
                    Some(arg_path) => entry_state.assign_alias(&param_path, &arg_path),
                    None => {
                        if matches!(arg, Expr::Null) {
                            entry_state.set_cell(
                                &param_path,
                                CellState::new(
                                    AllocationTag::Unallocated,
                                    Nullability::DefiniteNull,
                                ),
                            );
                        }
                    }
                },
                None => {}
            }
        }

        stack.push(callee_name.to_string());
        let sub = self.run(callee_cfg, entry_state, stack, budget);
        stack.pop();

        if sub.exit_states.is_empty() {
            // Every path through the callee hit a fatal primitive.
            state.set_fatal();
            return sub.complete;
        }

        let mut joined: Option<AbstractState> = None;
        let mut ret_cell: Option<CellState> = None;
        let mut ret_paths: Vec<AccessPath> = Vec::new();
        for (_, exit_state) in &sub.exit_states {
            match exit_state.returned() {
                Some(ReturnValue::Path(path)) => {
                    ret_cell = Some(match ret_cell {
                        Some(prev) => prev.join(&exit_state.cell(path)),
                        None => exit_state.cell(path),
                    });
                    ret_paths.push(path.clone());
                }
                Some(ReturnValue::Null) => {
                    let null_cell =
                        CellState::new(AllocationTag::Unallocated, Nullability::DefiniteNull);
                    ret_cell = Some(match ret_cell {
                        Some(prev) => prev.join(&null_cell),
                        None => null_cell,
                    });
                }
                Some(ReturnValue::Opaque) | None => {}
            }

            let mut pruned = exit_state.clone();
            pruned.prune_frame(callee_name);
            joined = Some(match joined {
                Some(acc) => AbstractState::join(&acc, &pruned),
                None => pruned,
            });
        }
        *state = joined.expect("at least one exit state");

        if let Some(dest_path) = dest.and_then(|d| ctx.path_of(d)) {
            state.reassign_target(&dest_path);
            ret_paths.sort();
            ret_paths.dedup();
            // Returning a single caller-visible path aliases the destination
            // to it; anything else binds the joined cell value.
            if ret_paths.len() == 1 && !ret_paths[0].belongs_to(callee_name) {
                state.assign_alias(&dest_path, &ret_paths[0]);
                if let Some(cell) = ret_cell {
                    state.set_cell(&dest_path, cell);
                }
            } else if let Some(cell) = ret_cell {
                state.set_cell(&dest_path, cell);
            }
        }

        sub.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::abstract_state::{AllocationTag, Guarded, LockState, Nullability};
    use crate::features::call_graph::resolve_call_graph;
    use crate::features::flow_graph::build_cfg;
    use crate::shared::models::{CmpOp, Function, Stmt, SymbolTable};

    fn explore(
        program: Program,
        effects: EffectTable,
        function: &str,
    ) -> (Exploration, FxHashMap<String, Cfg>) {
        let cfgs: FxHashMap<String, Cfg> = program
            .functions
            .iter()
            .map(|f| (f.name.clone(), build_cfg(f)))
            .collect();
        let call_graph = resolve_call_graph(&program, &cfgs);
        let explorer = PathExplorer::new(
            &program,
            &cfgs,
            &call_graph,
            &effects,
            ExplorerConfig::default(),
        );
        let exploration = explorer.explore(function).unwrap();
        (exploration, cfgs)
    }

    #[test]
    fn test_straight_line_alloc_free() {
        let program = Program::new(
            vec![Function::new(
                "f",
                vec![],
                vec![
                    Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                    Stmt::call("kfree", vec![Expr::var("p")]),
                    Stmt::ret_void(),
                ],
            )],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "f");

        assert!(exploration.status.is_complete());
        assert_eq!(exploration.exit_states.len(), 1);
        let (_, exit) = &exploration.exit_states[0];
        assert_eq!(
            exit.cell(&AccessPath::local("f", "p")).tag,
            AllocationTag::Freed
        );
    }

    #[test]
    fn test_loop_reaches_fixed_point() {
        let program = Program::new(
            vec![Function::new(
                "f",
                vec![],
                vec![
                    Stmt::assign(Expr::var("i"), Expr::Int(0)),
                    Stmt::loop_while(
                        Expr::cmp(CmpOp::Lt, Expr::var("i"), Expr::Int(10)),
                        vec![Stmt::assign(Expr::var("i"), Expr::Int(1))],
                    ),
                    Stmt::ret_void(),
                ],
            )],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "f");
        assert!(exploration.status.is_complete());
        assert_eq!(exploration.exit_states.len(), 1);
    }

    #[test]
    fn test_lock_balanced_across_loop() {
        // lock(&l); for (...) {...}; unlock(&l); — exit must be Unlocked.
        let program = Program::new(
            vec![Function::new(
                "f",
                vec![],
                vec![
                    Stmt::call("mutex_lock", vec![Expr::addr_of(Expr::var("l"))]),
                    Stmt::loop_while(
                        Expr::cmp(CmpOp::Lt, Expr::var("i"), Expr::Int(10)),
                        vec![Stmt::assign(Expr::var("i"), Expr::Int(1))],
                    ),
                    Stmt::call("mutex_unlock", vec![Expr::addr_of(Expr::var("l"))]),
                    Stmt::ret_void(),
                ],
            )],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "f");
        let (_, exit) = &exploration.exit_states[0];
        assert_eq!(
            exit.lock(&AccessPath::local("f", "l")),
            Guarded::Flat(LockState::Unlocked)
        );
    }

    #[test]
    fn test_correlated_branches_keep_lock_balanced() {
        // if (c) lock(l); ... if (c) unlock(l); with no writes to c.
        let program = Program::new(
            vec![Function::new(
                "f",
                vec!["c"],
                vec![
                    Stmt::if_then(
                        Expr::var("c"),
                        vec![Stmt::call("mutex_lock", vec![Expr::addr_of(Expr::var("l"))])],
                    ),
                    Stmt::assign(Expr::var("x"), Expr::Int(3)),
                    Stmt::if_then(
                        Expr::var("c"),
                        vec![Stmt::call(
                            "mutex_unlock",
                            vec![Expr::addr_of(Expr::var("l"))],
                        )],
                    ),
                    Stmt::ret_void(),
                ],
            )],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "f");
        let (_, exit) = &exploration.exit_states[0];
        assert_eq!(
            exit.lock(&AccessPath::local("f", "l")),
            Guarded::Flat(LockState::Unlocked)
        );
    }

    #[test]
    fn test_inlined_callee_frees_caller_pointer() {
        let program = Program::new(
            vec![
                Function::new(
                    "main",
                    vec![],
                    vec![
                        Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                        Stmt::call("release", vec![Expr::var("p")]),
                        Stmt::ret_void(),
                    ],
                ),
                Function::new(
                    "release",
                    vec!["ptr"],
                    vec![Stmt::call("kfree", vec![Expr::var("ptr")]), Stmt::ret_void()],
                ),
            ],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "main");
        let (_, exit) = &exploration.exit_states[0];
        assert_eq!(
            exit.cell(&AccessPath::local("main", "p")).tag,
            AllocationTag::Freed
        );
    }

    #[test]
    fn test_recursive_callee_degrades_to_unknown() {
        let program = Program::new(
            vec![
                Function::new(
                    "main",
                    vec![],
                    vec![
                        Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                        Stmt::call("spin", vec![Expr::var("p")]),
                        Stmt::ret_void(),
                    ],
                ),
                Function::new(
                    "spin",
                    vec!["q"],
                    vec![Stmt::call("spin", vec![Expr::var("q")]), Stmt::ret_void()],
                ),
            ],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "main");
        assert!(exploration.status.is_complete());
        let (_, exit) = &exploration.exit_states[0];
        // The self-recursive callee was entered once; its inner re-entry
        // degraded the pointer to untracked.
        assert_eq!(
            exit.cell(&AccessPath::local("main", "p")).tag,
            AllocationTag::Unknown
        );
    }

    #[test]
    fn test_fatal_path_terminates() {
        let program = Program::new(
            vec![Function::new(
                "f",
                vec!["p"],
                vec![
                    Stmt::if_then(Expr::not(Expr::var("p")), vec![Stmt::call("panic", vec![])]),
                    Stmt::ret_void(),
                ],
            )],
            SymbolTable::new(),
        );
        let (exploration, _) = explore(program, EffectTable::kernel(), "f");
        // Only the non-fatal path reaches the exit, with p proven non-null.
        assert_eq!(exploration.exit_states.len(), 1);
        let (_, exit) = &exploration.exit_states[0];
        assert_eq!(
            exit.cell(&AccessPath::local("f", "p")).null,
            Nullability::NonNull
        );
    }

    #[test]
    fn test_null_refinement_on_guard() {
        let program = Program::new(
            vec![Function::new(
                "f",
                vec![],
                vec![
                    Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                    Stmt::if_then(
                        Expr::var("p"),
                        vec![Stmt::assign(
                            Expr::field(Expr::var("p"), "x"),
                            Expr::Int(1),
                        )],
                    ),
                    Stmt::ret_void(),
                ],
            )],
            SymbolTable::new(),
        );
        let (exploration, cfgs) = explore(program, EffectTable::kernel(), "f");

        // Find the guarded assignment node and check p is NonNull there.
        let cfg = &cfgs["f"];
        let guarded = cfg
            .nodes_in_order()
            .find(|id| {
                cfg.node(*id)
                    .effects
                    .iter()
                    .any(|e| matches!(e, Effect::Assign { lhs: Expr::Field { .. }, .. }))
            })
            .unwrap();
        let state = exploration.state_at(guarded).unwrap();
        assert_eq!(
            state.cell(&AccessPath::local("f", "p")).null,
            Nullability::NonNull
        );
    }
}
