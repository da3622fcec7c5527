/*
 * Checker Harness
 *
 * Runs the five defect checkers over one function's exploration result and
 * dedups: at most one report per (function, kind, location), keeping the
 * earliest node in program order; the attached trace is the
 * earliest-discovered path to that node.
 */

pub mod double_free;
pub mod leak;
pub mod lock_imbalance;
pub mod null_deref;
pub mod use_after_free;

use crate::features::abstract_state::{EffectTable, TransferCtx};
use crate::features::checkers::domain::{DefectKind, DefectReport};
use crate::features::flow_graph::Cfg;
use crate::features::path_explorer::Exploration;
use crate::shared::models::Program;
use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;

pub fn run_all_checkers(
    cfg: &Cfg,
    exploration: &Exploration,
    program: &Program,
    effects: &EffectTable,
) -> Vec<DefectReport> {
    let decl = program.function(&cfg.function);
    let params: &[String] = decl.map(|f| f.params.as_slice()).unwrap_or(&[]);
    let ctx = TransferCtx {
        function: &cfg.function,
        params,
        symbols: &program.symbols,
        effects,
    };

    let mut reports = Vec::new();
    reports.extend(double_free::check(cfg, exploration, &ctx));
    reports.extend(use_after_free::check(cfg, exploration, &ctx));
    reports.extend(leak::check(cfg, exploration, &ctx));
    reports.extend(null_deref::check(cfg, exploration, &ctx));
    reports.extend(lock_imbalance::check(cfg, exploration, &ctx));

    dedup_and_attach_traces(reports, exploration)
}

fn dedup_and_attach_traces(
    mut reports: Vec<DefectReport>,
    exploration: &Exploration,
) -> Vec<DefectReport> {
    reports.sort_by_key(|r| (r.kind, r.location.clone(), r.node));

    let mut chosen: BTreeMap<(DefectKind, String), DefectReport> = BTreeMap::new();
    for report in reports {
        chosen
            .entry((report.kind, report.location.clone()))
            .or_insert(report);
    }

    let mut result: Vec<DefectReport> = chosen
        .into_values()
        .map(|mut report| {
            if report.trace.is_empty() {
                report.trace = exploration
                    .witness_path(NodeIndex::new(report.node as usize))
                    .into_iter()
                    .map(|id| id.index() as u32)
                    .collect();
            }
            report
        })
        .collect();
    result.sort_by_key(|r| (r.node, r.kind));
    result
}
