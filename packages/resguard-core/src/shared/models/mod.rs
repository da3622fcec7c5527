//! Common data models.

pub mod program;

pub use program::{
    CallExpr, CaseLabel, CmpOp, Expr, Function, Program, Stmt, SwitchCase, SymbolTable,
};
