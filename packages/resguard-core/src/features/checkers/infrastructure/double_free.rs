//! Double-free: a call whose modeled effect is "free" on a location already
//! tagged Freed.

use crate::features::abstract_state::{AllocationTag, PrimitiveEffect, TransferCtx};
use crate::features::checkers::domain::{DefectKind, DefectReport};
use crate::features::flow_graph::Cfg;
use crate::features::path_explorer::Exploration;

pub fn check(cfg: &Cfg, exploration: &Exploration, ctx: &TransferCtx) -> Vec<DefectReport> {
    let mut reports = Vec::new();

    for node in cfg.nodes_in_order() {
        let Some(call) = cfg.node(node).call_expr() else {
            continue;
        };
        let Some(PrimitiveEffect::Free { arg }) = ctx.effects.get(&call.callee) else {
            continue;
        };
        let Some(state) = exploration.state_at(node) else {
            continue;
        };
        let Some(path) = call.args.get(arg).and_then(|a| ctx.path_of(a)) else {
            continue;
        };

        if state.cell(&path).tag == AllocationTag::Freed {
            reports.push(DefectReport::new(
                DefectKind::DoubleFree,
                &cfg.function,
                node.index() as u32,
                state.canonical(&path).to_string(),
                format!("{} is already Freed when {} is called", path, call.callee),
            ));
        }
    }
    reports
}
