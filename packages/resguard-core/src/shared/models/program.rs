/*
 * Input Program Model
 *
 * The reduced statement vocabulary handed over by the parsing/symbol-resolution
 * collaborator. Statements are already lowered to a fixed small set
 * (assignment, call, conditional, loop, switch, return); identifiers are
 * resolved against the accompanying symbol table.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Comparison operator in a condition expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A call expression: callee name plus argument expressions.
///
/// Calls through function pointers arrive with the pointer's variable name as
/// `callee`; the resolver classifies those as unknown because no function of
/// that name exists in the program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: String,
    pub args: Vec<Expr>,
}

impl CallExpr {
    pub fn new(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            callee: callee.into(),
            args,
        }
    }
}

/// Expression vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Named variable (local, parameter, or global per the symbol table).
    Var(String),
    /// Field access; covers both `s.f` and `p->f` (the parser collapses the
    /// arrow form).
    Field { base: Box<Expr>, field: String },
    /// Pointer dereference `*p`.
    Deref(Box<Expr>),
    /// Address-of `&l`.
    AddrOf(Box<Expr>),
    /// The null literal.
    Null,
    Int(i64),
    /// Logical negation `!e`.
    Not(Box<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call(CallExpr),
    /// Anything the parser could not express in this vocabulary.
    Unknown,
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn field(base: Expr, field: impl Into<String>) -> Self {
        Expr::Field {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn deref(inner: Expr) -> Self {
        Expr::Deref(Box::new(inner))
    }

    pub fn addr_of(inner: Expr) -> Self {
        Expr::AddrOf(Box::new(inner))
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr::new(callee, args))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Field { base, field } => write!(f, "{}.{}", base, field),
            Expr::Deref(inner) => write!(f, "*{}", inner),
            Expr::AddrOf(inner) => write!(f, "&{}", inner),
            Expr::Null => write!(f, "null"),
            Expr::Int(value) => write!(f, "{}", value),
            Expr::Not(inner) => write!(f, "!{}", inner),
            Expr::Cmp { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.as_str(), rhs),
            Expr::Call(call) => {
                write!(f, "{}(", call.callee)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// Label of one `switch` case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseLabel {
    /// One or more literal values sharing a body.
    Values(Vec<i64>),
    /// GNU-style case range `lo ... hi`.
    Range(i64, i64),
    Default,
}

/// One arm of a `switch` statement.
///
/// `falls_through` is true when the case body had no terminal `break`; the
/// CFG builder materializes an explicit fallthrough edge into the next arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub label: CaseLabel,
    pub body: Vec<Stmt>,
    pub falls_through: bool,
}

/// Statement vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    Assign { lhs: Expr, rhs: Expr },
    Call(CallExpr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Loop { cond: Expr, body: Vec<Stmt> },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
    },
    Return(Option<Expr>),
    /// A statement kind with no defined lowering rule.
    Unknown,
}

impl Stmt {
    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Stmt::Assign { lhs, rhs }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Stmt::Call(CallExpr::new(callee, args))
    }

    pub fn if_then(cond: Expr, then_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body: Vec::new(),
        }
    }

    pub fn if_else(cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body,
        }
    }

    pub fn loop_while(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::Loop { cond, body }
    }

    pub fn ret(expr: Expr) -> Self {
        Stmt::Return(Some(expr))
    }

    pub fn ret_void() -> Self {
        Stmt::Return(None)
    }
}

/// One function as delivered by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<&str>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(String::from).collect(),
            body,
        }
    }
}

/// Resolved symbol information from the excluded collaborator.
///
/// Call targets resolve by exact name match: a name with a `Function` body in
/// the program is a defined callee, a name listed here as external is a
/// declared-but-unanalyzable callee, and everything else is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    globals: BTreeSet<String>,
    externals: BTreeSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_global(&mut self, name: impl Into<String>) {
        self.globals.insert(name.into());
    }

    pub fn declare_external(&mut self, name: impl Into<String>) {
        self.externals.insert(name.into());
    }

    pub fn with_global(mut self, name: impl Into<String>) -> Self {
        self.declare_global(name);
        self
    }

    pub fn with_external(mut self, name: impl Into<String>) -> Self {
        self.declare_external(name);
        self
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.externals.contains(name)
    }

    pub fn globals(&self) -> impl Iterator<Item = &String> {
        self.globals.iter()
    }
}

/// A whole translation unit: function bodies plus the symbol table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
    pub symbols: SymbolTable,
}

impl Program {
    pub fn new(functions: Vec<Function>, symbols: SymbolTable) -> Self {
        Self { functions, symbols }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.function(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display() {
        let e = Expr::cmp(
            CmpOp::Ne,
            Expr::field(Expr::var("a"), "x"),
            Expr::Null,
        );
        assert_eq!(e.to_string(), "a.x != null");

        let call = Expr::call("kfree", vec![Expr::deref(Expr::var("p"))]);
        assert_eq!(call.to_string(), "kfree(*p)");
    }

    #[test]
    fn test_symbol_table_lookup() {
        let symbols = SymbolTable::new()
            .with_global("global_lock")
            .with_external("printf");

        assert!(symbols.is_global("global_lock"));
        assert!(!symbols.is_global("printf"));
        assert!(symbols.is_external("printf"));
    }

    #[test]
    fn test_program_function_lookup() {
        let program = Program::new(
            vec![Function::new("main", vec![], vec![Stmt::ret_void()])],
            SymbolTable::new(),
        );
        assert!(program.has_function("main"));
        assert!(!program.has_function("missing"));
    }
}
