//! Lock-imbalance: at every Exit node each lock location's state must equal
//! its Entry state (default Unlocked) on every path. A conditional value
//! whose guard survived to the exit, or an outright conflict from diverging
//! paths, is a mismatch. The witness trace lists the acquire/release nodes.

use crate::features::abstract_state::domain::lattice::{join_locks, Guarded, LockState};
use crate::features::abstract_state::{PrimitiveEffect, TransferCtx};
use crate::features::checkers::domain::{DefectKind, DefectReport};
use crate::features::flow_graph::Cfg;
use crate::features::path_explorer::Exploration;

pub fn check(cfg: &Cfg, exploration: &Exploration, ctx: &TransferCtx) -> Vec<DefectReport> {
    let mut reports = Vec::new();

    for (exit_node, exit_state) in &exploration.exit_states {
        for (path, guarded) in exit_state.locks() {
            let witness = match guarded {
                Guarded::Flat(LockState::Unlocked) => continue,
                Guarded::Flat(LockState::Locked) => {
                    format!("{} is still Locked at exit", path)
                }
                Guarded::Cond { key, .. } => match guarded.flatten(join_locks) {
                    Some(LockState::Unlocked) => continue,
                    Some(LockState::Locked) => format!("{} is still Locked at exit", path),
                    None => format!(
                        "{} is Locked only when {} holds at exit",
                        path, key
                    ),
                },
                Guarded::Conflict => {
                    format!("{} reaches exit both Locked and Unlocked", path)
                }
            };

            let trace = lock_site_nodes(cfg, ctx, path);
            reports.push(
                DefectReport::new(
                    DefectKind::LockImbalance,
                    &cfg.function,
                    exit_node.index() as u32,
                    path.to_string(),
                    witness,
                )
                .with_trace(trace),
            );
        }
    }
    reports
}

/// Acquire/release call sites naming this lock, syntactically.
fn lock_site_nodes(
    cfg: &Cfg,
    ctx: &TransferCtx,
    lock_path: &crate::features::abstract_state::AccessPath,
) -> Vec<u32> {
    let mut nodes = Vec::new();
    for node in cfg.nodes_in_order() {
        let Some(call) = cfg.node(node).call_expr() else {
            continue;
        };
        let arg = match ctx.effects.get(&call.callee) {
            Some(PrimitiveEffect::Lock { arg }) | Some(PrimitiveEffect::Unlock { arg }) => arg,
            _ => continue,
        };
        if let Some(path) = call.args.get(arg).and_then(|a| ctx.path_of(a)) {
            if path == *lock_path || path.interferes_with(lock_path) {
                nodes.push(node.index() as u32);
            }
        }
    }
    nodes
}
