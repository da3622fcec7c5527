/*
 * Resguard Core - Resource-Safety Static Analysis Engine
 *
 * Feature-First Architecture:
 * - shared/      : Input vocabulary (statements, expressions, symbol table)
 * - features/    : Vertical slices (flow_graph → call_graph → abstract_state
 *                  → path_explorer → checkers / slicing)
 * - pipeline/    : Orchestration (AnalysisEngine)
 *
 * The engine consumes per-function statement trees plus a resolved symbol
 * table from the parsing collaborator and produces defect reports and
 * slices for the reporting collaborator. Parsing, CLI, and persistence live
 * outside this crate.
 */

#![allow(clippy::collapsible_if)] // Readability over brevity
#![allow(clippy::manual_map)] // map_or style preference
#![allow(clippy::upper_case_acronyms)] // CFG naming

/// Shared models
pub mod shared;

/// Feature modules
pub mod features;

/// Pipeline orchestration
pub mod pipeline;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use errors::{ResguardError, Result};
pub use features::abstract_state::{
    AbstractState, AccessPath, AllocationTag, CellState, EffectTable, Guarded, LockState,
    Nullability, PrimitiveEffect,
};
pub use features::call_graph::{CallGraph, CallSite, CallTarget};
pub use features::checkers::{DefectKind, DefectReport};
pub use features::flow_graph::{build_cfg, Cfg, CfgEdgeKind, CfgNode, NodeId, NodeKind};
pub use features::path_explorer::{AnalysisStatus, Exploration, PathExplorer};
pub use features::slicing::{SliceResult, SliceTarget, TraceEvent};
pub use pipeline::{AnalysisConfig, AnalysisEngine, FunctionAnalysis};
pub use shared::models::{
    CallExpr, CaseLabel, CmpOp, Expr, Function, Program, Stmt, SwitchCase, SymbolTable,
};
