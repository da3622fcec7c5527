//! Null-deref: a dereference of a tracked location that is DefiniteNull, or
//! an unchecked allocation result (Allocated + MaybeNull) with no dominating
//! null comparison. A comparison that proved NonNull on the incoming paths
//! silences the report; untracked locations stay silent so degradation never
//! turns into noise.

use crate::features::abstract_state::domain::path::AccessPath;
use crate::features::abstract_state::infrastructure::transfer::collect_derefs;
use crate::features::abstract_state::{AllocationTag, Nullability, TransferCtx};
use crate::features::checkers::domain::{DefectKind, DefectReport};
use crate::features::flow_graph::{Cfg, Effect};
use crate::features::path_explorer::Exploration;

pub fn check(cfg: &Cfg, exploration: &Exploration, ctx: &TransferCtx) -> Vec<DefectReport> {
    let mut reports = Vec::new();

    for node in cfg.nodes_in_order() {
        let Some(state) = exploration.state_at(node) else {
            continue;
        };

        let mut derefs: Vec<AccessPath> = Vec::new();
        for effect in &cfg.node(node).effects {
            match effect {
                Effect::Assign { lhs, rhs } => {
                    collect_derefs(lhs, ctx, &mut derefs);
                    collect_derefs(rhs, ctx, &mut derefs);
                }
                Effect::Call(call) => {
                    for arg in &call.args {
                        collect_derefs(arg, ctx, &mut derefs);
                    }
                }
                Effect::Branch(cond) => collect_derefs(cond, ctx, &mut derefs),
                Effect::Return(Some(expr)) => collect_derefs(expr, ctx, &mut derefs),
                Effect::Return(None) => {}
            }
        }

        for path in derefs {
            if !state.is_tracked(&path) {
                continue;
            }
            let cell = state.cell(&path);
            let reported = match cell.null {
                Nullability::DefiniteNull => Some("is null here"),
                Nullability::MaybeNull if cell.tag == AllocationTag::Allocated => {
                    Some("may be null: allocation result is unchecked")
                }
                _ => None,
            };
            if let Some(reason) = reported {
                reports.push(DefectReport::new(
                    DefectKind::NullDeref,
                    &cfg.function,
                    node.index() as u32,
                    state.canonical(&path).to_string(),
                    format!("{} {}", path, reason),
                ));
            }
        }
    }
    reports
}
