//! Shared helpers for scenario tests.
#![allow(dead_code)] // Not every scenario file uses every helper.

use resguard_core::{
    AnalysisConfig, AnalysisEngine, DefectKind, DefectReport, EffectTable, Function,
    FunctionAnalysis, Program, SymbolTable,
};

pub fn engine_with(program: Program, effect_table: EffectTable) -> AnalysisEngine {
    AnalysisEngine::new(
        program,
        AnalysisConfig {
            effect_table,
            ..AnalysisConfig::default()
        },
    )
}

pub fn analyze_single(function: Function, effect_table: EffectTable) -> FunctionAnalysis {
    let name = function.name.clone();
    let engine = engine_with(
        Program::new(vec![function], SymbolTable::new()),
        effect_table,
    );
    engine.analyze_function(&name).unwrap()
}

pub fn reports_of_kind(analysis: &FunctionAnalysis, kind: DefectKind) -> Vec<&DefectReport> {
    analysis.reports.iter().filter(|r| r.kind == kind).collect()
}
