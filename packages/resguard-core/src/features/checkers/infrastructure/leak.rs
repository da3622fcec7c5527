//! Leak: a location still tagged Allocated at an Exit node with no reference
//! reachable by the caller — not returned, not stored through a global or a
//! parameter projection. Paths that terminated in a fatal primitive never
//! reach an exit state, which exempts them by construction.

use crate::features::abstract_state::domain::lattice::join_cells;
use crate::features::abstract_state::domain::state::ReturnValue;
use crate::features::abstract_state::{AllocationTag, TransferCtx};
use crate::features::checkers::domain::{DefectKind, DefectReport};
use crate::features::flow_graph::Cfg;
use crate::features::path_explorer::Exploration;

pub fn check(cfg: &Cfg, exploration: &Exploration, _ctx: &TransferCtx) -> Vec<DefectReport> {
    let mut reports = Vec::new();

    for (exit_node, exit_state) in &exploration.exit_states {
        for (path, guarded) in exit_state.cells() {
            let Some(cell) = guarded.flatten(join_cells) else {
                continue;
            };
            // A tag that merged to Unknown means some path freed it; the
            // conservative policy stays silent there.
            if cell.tag != AllocationTag::Allocated {
                continue;
            }
            // Caller-reachable storage is not a leak.
            if path.is_global() || exit_state.is_escaped(path) {
                continue;
            }
            if !path.projections.is_empty() {
                // Fields of caller-visible structures travel with their base.
                continue;
            }
            if let Some(ReturnValue::Path(returned)) = exit_state.returned() {
                if exit_state.are_aliased(returned, path) {
                    continue;
                }
            }

            reports.push(DefectReport::new(
                DefectKind::Leak,
                &cfg.function,
                exit_node.index() as u32,
                path.to_string(),
                format!("{} is still Allocated and unreachable past this exit", path),
            ));
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::abstract_state::EffectTable;
    use crate::features::call_graph::resolve_call_graph;
    use crate::features::flow_graph::build_cfg;
    use crate::features::path_explorer::{ExplorerConfig, PathExplorer};
    use crate::shared::models::{Expr, Function, Program, Stmt, SymbolTable};
    use rustc_hash::FxHashMap;

    fn check_program(program: Program, function: &str) -> Vec<DefectReport> {
        let effects = EffectTable::kernel();
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
        let decl = program.function(function).unwrap();
        let ctx = TransferCtx {
            function,
            params: &decl.params,
            symbols: &program.symbols,
            effects: &effects,
        };
        check(&cfgs[function], &exploration, &ctx)
    }

    fn single(function: Function) -> Vec<DefectReport> {
        let name = function.name.clone();
        check_program(Program::new(vec![function], SymbolTable::new()), &name)
    }

    #[test]
    fn test_alloc_without_free_leaks() {
        let reports = single(Function::new(
            "f",
            vec![],
            vec![
                Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                Stmt::ret_void(),
            ],
        ));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, DefectKind::Leak);
    }

    #[test]
    fn test_freed_before_exit_is_silent() {
        let reports = single(Function::new(
            "f",
            vec![],
            vec![
                Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                Stmt::call("kfree", vec![Expr::var("p")]),
                Stmt::ret_void(),
            ],
        ));
        assert!(reports.is_empty());
    }

    #[test]
    fn test_returned_allocation_is_not_a_leak() {
        let reports = single(Function::new(
            "f",
            vec![],
            vec![
                Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                Stmt::ret(Expr::var("p")),
            ],
        ));
        assert!(reports.is_empty());
    }

    #[test]
    fn test_stored_through_out_param_is_not_a_leak() {
        let reports = single(Function::new(
            "f",
            vec!["out"],
            vec![
                Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                Stmt::assign(Expr::deref(Expr::var("out")), Expr::var("p")),
                Stmt::ret_void(),
            ],
        ));
        assert!(reports.is_empty());
    }

    #[test]
    fn test_fatal_path_exempt() {
        let reports = single(Function::new(
            "f",
            vec![],
            vec![
                Stmt::assign(Expr::var("p"), Expr::call("kmalloc", vec![Expr::Int(8)])),
                Stmt::if_then(Expr::not(Expr::var("p")), vec![Stmt::call("panic", vec![])]),
                Stmt::call("kfree", vec![Expr::var("p")]),
                Stmt::ret_void(),
            ],
        ));
        assert!(reports.is_empty());
    }
}
