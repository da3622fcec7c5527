/*
 * Access Paths
 *
 * An access path identifies a trackable memory cell: a local variable, a
 * global, or a struct field reached through a bounded chain of
 * dereferences/field accesses. Two paths denote the same cell iff they are
 * syntactically identical after alias normalization; the alias classes live in
 * the state, not here.
 *
 * Locals carry their owning function so that paths stay globally unique when
 * callee frames are inlined into a caller's exploration; globals carry a
 * process-wide identity on purpose.
 */

use crate::shared::models::{Expr, SymbolTable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum projection chain length. Paths deeper than this are not tracked.
pub const MAX_PROJECTIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathBase {
    Global(String),
    Local { function: String, var: String },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Projection {
    Deref,
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessPath {
    pub base: PathBase,
    pub projections: Vec<Projection>,
}

impl AccessPath {
    pub fn local(function: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            base: PathBase::Local {
                function: function.into(),
                var: var.into(),
            },
            projections: Vec::new(),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self {
            base: PathBase::Global(name.into()),
            projections: Vec::new(),
        }
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projections.push(projection);
        self
    }

    /// Resolve an expression into the path it names, if any.
    ///
    /// Address-of collapses onto its operand's path: `&l` names the same
    /// tracked cell as `l`, which is what makes `p = &l; unlock(p)` balance
    /// `lock(&l)` under the alias rules.
    pub fn of_expr(expr: &Expr, function: &str, symbols: &SymbolTable) -> Option<AccessPath> {
        match expr {
            Expr::Var(name) => Some(if symbols.is_global(name) {
                AccessPath::global(name.clone())
            } else {
                AccessPath::local(function, name.clone())
            }),
            Expr::Field { base, field } => {
                let path = Self::of_expr(base, function, symbols)?;
                if path.projections.len() >= MAX_PROJECTIONS {
                    return None;
                }
                Some(path.project(Projection::Field(field.clone())))
            }
            Expr::Deref(inner) => {
                let path = Self::of_expr(inner, function, symbols)?;
                if path.projections.len() >= MAX_PROJECTIONS {
                    return None;
                }
                Some(path.project(Projection::Deref))
            }
            Expr::AddrOf(inner) => Self::of_expr(inner, function, symbols),
            _ => None,
        }
    }

    /// Whether this path is rooted in a global.
    pub fn is_global(&self) -> bool {
        matches!(self.base, PathBase::Global(_))
    }

    /// Whether this path is the plain local `var` of `function`.
    pub fn is_local_var(&self, function: &str, var: &str) -> bool {
        self.projections.is_empty()
            && matches!(&self.base, PathBase::Local { function: f, var: v } if f == function && v == var)
    }

    /// Whether the path lives in the given function's frame.
    pub fn belongs_to(&self, function: &str) -> bool {
        matches!(&self.base, PathBase::Local { function: f, .. } if f == function)
    }

    /// Two paths interfere when a write to one may change what the other
    /// names. The syntactic model keeps this coarse: shared base means
    /// interference.
    pub fn interferes_with(&self, other: &AccessPath) -> bool {
        self.base == other.base
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = match &self.base {
            PathBase::Global(name) => name.clone(),
            PathBase::Local { var, .. } => var.clone(),
        };
        for projection in &self.projections {
            rendered = match projection {
                Projection::Deref => format!("*{}", rendered),
                Projection::Field(field) => format!("{}.{}", rendered, field),
            };
        }
        write!(f, "{}", rendered)
    }
}
