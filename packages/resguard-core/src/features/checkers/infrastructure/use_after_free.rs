//! Use-after-free: any read, write-through, or dereference of a location
//! tagged Freed. Freeing a freed location is the double-free checker's
//! territory and is excluded here.

use crate::features::abstract_state::domain::path::AccessPath;
use crate::features::abstract_state::infrastructure::transfer::{collect_derefs, collect_reads};
use crate::features::abstract_state::{AllocationTag, PrimitiveEffect, TransferCtx};
use crate::features::checkers::domain::{DefectKind, DefectReport};
use crate::features::flow_graph::{Cfg, Effect};
use crate::features::path_explorer::Exploration;
use crate::shared::models::Expr;

pub fn check(cfg: &Cfg, exploration: &Exploration, ctx: &TransferCtx) -> Vec<DefectReport> {
    let mut reports = Vec::new();

    for node in cfg.nodes_in_order() {
        let Some(state) = exploration.state_at(node) else {
            continue;
        };

        for effect in &cfg.node(node).effects {
            let mut used: Vec<AccessPath> = Vec::new();
            match effect {
                Effect::Assign { lhs, rhs } => {
                    match rhs {
                        Expr::Call(call) => collect_call_uses(call, ctx, &mut used),
                        other => collect_reads(other, ctx, &mut used),
                    }
                    // Writing through a projection reads the base pointer.
                    collect_derefs(lhs, ctx, &mut used);
                }
                Effect::Call(call) => collect_call_uses(call, ctx, &mut used),
                Effect::Branch(cond) => collect_reads(cond, ctx, &mut used),
                Effect::Return(Some(expr)) => collect_reads(expr, ctx, &mut used),
                Effect::Return(None) => {}
            }

            for path in used {
                if state.cell(&path).tag == AllocationTag::Freed {
                    reports.push(DefectReport::new(
                        DefectKind::UseAfterFree,
                        &cfg.function,
                        node.index() as u32,
                        state.canonical(&path).to_string(),
                        format!("{} is Freed when used here", path),
                    ));
                }
            }
        }
    }
    reports
}

fn collect_call_uses(
    call: &crate::shared::models::CallExpr,
    ctx: &TransferCtx,
    out: &mut Vec<AccessPath>,
) {
    match ctx.effects.get(&call.callee) {
        Some(PrimitiveEffect::Free { arg }) => {
            // The freed argument itself is double-free territory; its
            // subexpressions are still uses.
            for (i, a) in call.args.iter().enumerate() {
                if i == arg {
                    collect_derefs(a, ctx, out);
                } else {
                    collect_reads(a, ctx, out);
                }
            }
        }
        _ => {
            for a in &call.args {
                collect_reads(a, ctx, out);
            }
        }
    }
}
