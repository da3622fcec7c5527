/*
 * Transfer Function
 *
 * Applies one primitive effect to an abstract state: assignments update the
 * alias classes and nullability, recognized primitives update allocation
 * tags and lock states per the effect table, branch edges refine condition
 * memory and nullability.
 *
 * Calls to resolvable non-primitive callees are not handled here; the path
 * explorer inlines those. Everything in this module is total: malformed input
 * degrades state, it never fails.
 */

use crate::features::abstract_state::domain::lattice::{
    AllocationTag, CellState, CondKey, LockState, Nullability,
};
use crate::features::abstract_state::domain::path::AccessPath;
use crate::features::abstract_state::domain::state::{AbstractState, ReturnValue};
use crate::features::abstract_state::infrastructure::effects::{EffectTable, PrimitiveEffect};
use crate::shared::models::{CallExpr, CmpOp, Expr, SymbolTable};
use std::collections::BTreeSet;

/// Read-only context for one function's transfer steps.
pub struct TransferCtx<'a> {
    pub function: &'a str,
    pub params: &'a [String],
    pub symbols: &'a SymbolTable,
    pub effects: &'a EffectTable,
}

impl<'a> TransferCtx<'a> {
    pub fn path_of(&self, expr: &Expr) -> Option<AccessPath> {
        AccessPath::of_expr(expr, self.function, self.symbols)
    }

    fn is_param(&self, path: &AccessPath) -> bool {
        self.params
            .iter()
            .any(|p| {
                matches!(
                    &path.base,
                    crate::features::abstract_state::domain::path::PathBase::Local { function, var }
                        if function == self.function && var == p
                )
            })
    }
}

// ─── assignment ────────────────────────────────────────────────────────────

/// `lhs = rhs` for non-call right-hand sides.
pub fn apply_assign(state: &mut AbstractState, lhs: &Expr, rhs: &Expr, ctx: &TransferCtx) {
    let Some(lhs_path) = ctx.path_of(lhs) else {
        return;
    };

    // A store through a global or a parameter projection hands the value to
    // the caller's world; remember that for leak checking.
    if let Some(rhs_path) = ctx.path_of(rhs) {
        if escapes_through(&lhs_path, ctx) {
            state.mark_escaped(&rhs_path);
        }
    }

    state.reassign_target(&lhs_path);

    match rhs {
        Expr::Null => {
            state.set_cell(
                &lhs_path,
                CellState::new(AllocationTag::Unallocated, Nullability::DefiniteNull),
            );
        }
        Expr::Var(_) | Expr::Field { .. } | Expr::Deref(_) | Expr::AddrOf(_) => {
            if let Some(rhs_path) = ctx.path_of(rhs) {
                // Reading a field out of a zeroed allocation yields null.
                if !state.is_tracked(&rhs_path) {
                    if let Some(parent) = parent_path(&rhs_path) {
                        let parent_cell = state.cell(&parent);
                        if parent_cell.zeroed && parent_cell.tag == AllocationTag::Allocated {
                            state.set_cell(
                                &rhs_path,
                                CellState::new(
                                    AllocationTag::Unallocated,
                                    Nullability::DefiniteNull,
                                ),
                            );
                        }
                    }
                }
                state.assign_alias(&lhs_path, &rhs_path);
            }
        }
        // Scalars and unmodeled expressions leave the target untracked.
        _ => {}
    }
}

fn parent_path(path: &AccessPath) -> Option<AccessPath> {
    if path.projections.is_empty() {
        return None;
    }
    let mut parent = path.clone();
    parent.projections.pop();
    Some(parent)
}

fn escapes_through(lhs: &AccessPath, ctx: &TransferCtx) -> bool {
    if lhs.is_global() {
        return true;
    }
    !lhs.projections.is_empty() && {
        let mut base = lhs.clone();
        base.projections.clear();
        ctx.is_param(&base)
    }
}

// ─── calls ─────────────────────────────────────────────────────────────────

/// Apply a recognized primitive. `dest` is the assignment target when the
/// call's result is stored.
pub fn apply_builtin(
    state: &mut AbstractState,
    effect: PrimitiveEffect,
    call: &CallExpr,
    dest: Option<&Expr>,
    ctx: &TransferCtx,
) {
    match effect {
        PrimitiveEffect::Alloc | PrimitiveEffect::ZeroedAlloc => {
            if let Some(lhs_path) = dest.and_then(|d| ctx.path_of(d)) {
                state.reassign_target(&lhs_path);
                let mut cell = CellState::new(AllocationTag::Allocated, Nullability::MaybeNull);
                cell.zeroed = effect == PrimitiveEffect::ZeroedAlloc;
                state.set_cell(&lhs_path, cell);
            }
        }
        PrimitiveEffect::Free { arg } => {
            if let Some(path) = call.args.get(arg).and_then(|a| ctx.path_of(a)) {
                state.set_tag(&path, AllocationTag::Freed);
            }
            untrack_dest(state, dest, ctx);
        }
        PrimitiveEffect::Lock { arg } => {
            if let Some(path) = call.args.get(arg).and_then(|a| ctx.path_of(a)) {
                state.set_lock(&path, LockState::Locked);
            }
            untrack_dest(state, dest, ctx);
        }
        PrimitiveEffect::Unlock { arg } => {
            if let Some(path) = call.args.get(arg).and_then(|a| ctx.path_of(a)) {
                state.set_lock(&path, LockState::Unlocked);
            }
            untrack_dest(state, dest, ctx);
        }
        PrimitiveEffect::Fatal => {
            state.set_fatal();
        }
    }
}

/// Unknown or external callee: every location passed by pointer/reference
/// becomes untracked (Unknown on lookup); everything else is left unchanged.
/// An assignment through the call breaks the target's aliases.
pub fn apply_unknown_call(
    state: &mut AbstractState,
    call: &CallExpr,
    dest: Option<&Expr>,
    ctx: &TransferCtx,
) {
    for arg in &call.args {
        if let Some(path) = ctx.path_of(arg) {
            state.invalidate_for_write(&path);
            state.untrack(&path);
            state.drop_lock(&path);
        }
    }
    untrack_dest(state, dest, ctx);
}

fn untrack_dest(state: &mut AbstractState, dest: Option<&Expr>, ctx: &TransferCtx) {
    if let Some(lhs_path) = dest.and_then(|d| ctx.path_of(d)) {
        state.reassign_target(&lhs_path);
    }
}

// ─── return ────────────────────────────────────────────────────────────────

pub fn apply_return(state: &mut AbstractState, expr: Option<&Expr>, ctx: &TransferCtx) {
    let Some(expr) = expr else {
        return;
    };
    let value = match expr {
        Expr::Null | Expr::Int(0) => ReturnValue::Null,
        other => match ctx.path_of(other) {
            Some(path) => ReturnValue::Path(state.canonical(&path)),
            None => ReturnValue::Opaque,
        },
    };
    state.set_returned(value);
}

// ─── branch refinement ─────────────────────────────────────────────────────

/// A condition reduced to a stable identity plus how the true edge relates to
/// it, and the path whose nullability it tests, if any.
pub struct NormalizedCond {
    pub key: CondKey,
    pub polarity: bool,
    pub null_path: Option<AccessPath>,
}

/// Normalize a branch condition by resolving operand paths through the alias
/// classes. Structural equality of the result is what makes two branches on
/// the same unmodified predicate control-equivalent.
pub fn normalize_cond(
    state: &AbstractState,
    cond: &Expr,
    ctx: &TransferCtx,
) -> Option<NormalizedCond> {
    let mut polarity = true;
    let mut expr = cond;
    loop {
        match expr {
            Expr::Not(inner) => {
                polarity = !polarity;
                expr = inner;
            }
            Expr::Cmp {
                op: CmpOp::Eq,
                lhs,
                rhs,
            } if matches!(**rhs, Expr::Null) => {
                polarity = !polarity;
                expr = lhs;
            }
            Expr::Cmp {
                op: CmpOp::Eq,
                lhs,
                rhs,
            } if matches!(**lhs, Expr::Null) => {
                polarity = !polarity;
                expr = rhs;
            }
            Expr::Cmp {
                op: CmpOp::Ne,
                lhs,
                rhs,
            } if matches!(**rhs, Expr::Null) => {
                expr = lhs;
            }
            Expr::Cmp {
                op: CmpOp::Ne,
                lhs,
                rhs,
            } if matches!(**lhs, Expr::Null) => {
                expr = rhs;
            }
            _ => break,
        }
    }

    // A bare pointer expression is a null test on its path.
    if let Some(path) = ctx.path_of(expr) {
        let canon = state.canonical(&path);
        let mut operands = BTreeSet::new();
        operands.insert(canon.clone());
        return Some(NormalizedCond {
            key: CondKey::new(canon.to_string(), operands),
            polarity,
            null_path: Some(canon),
        });
    }

    // Anything else keeps a structural identity without null information.
    let mut operands = BTreeSet::new();
    let repr = render_normalized(state, expr, ctx, &mut operands)?;
    Some(NormalizedCond {
        key: CondKey::new(repr, operands),
        polarity,
        null_path: None,
    })
}

fn render_normalized(
    state: &AbstractState,
    expr: &Expr,
    ctx: &TransferCtx,
    operands: &mut BTreeSet<AccessPath>,
) -> Option<String> {
    if let Some(path) = ctx.path_of(expr) {
        let canon = state.canonical(&path);
        operands.insert(canon.clone());
        return Some(canon.to_string());
    }
    match expr {
        Expr::Int(value) => Some(value.to_string()),
        Expr::Null => Some("null".to_string()),
        Expr::Not(inner) => Some(format!("!{}", render_normalized(state, inner, ctx, operands)?)),
        Expr::Cmp { op, lhs, rhs } => {
            let l = render_normalized(state, lhs, ctx, operands)?;
            let r = render_normalized(state, rhs, ctx, operands)?;
            Some(format!("{} {} {}", l, op.as_str(), r))
        }
        // Calls and unknowns in a condition have no stable identity.
        _ => None,
    }
}

/// Refine a state for one branch edge. Returns false when the edge is
/// infeasible under the recorded condition memory.
pub fn refine_edge(
    state: &mut AbstractState,
    cond: &Expr,
    edge_is_true: bool,
    ctx: &TransferCtx,
) -> bool {
    let Some(normalized) = normalize_cond(state, cond, ctx) else {
        return true;
    };
    let outcome = if edge_is_true {
        normalized.polarity
    } else {
        !normalized.polarity
    };

    if state.known_cond(&normalized.key) == Some(!outcome) {
        return false;
    }
    state.refine_cond(&normalized.key, outcome);

    if let Some(path) = normalized.null_path {
        if outcome {
            state.set_nullability(&path, Nullability::NonNull);
        } else {
            state.set_nullability(&path, Nullability::DefiniteNull);
            // A pointer proven null holds no allocation; the failed-alloc
            // branch must not read as Allocated.
            if state.cell(&path).tag == AllocationTag::Allocated {
                state.set_tag(&path, AllocationTag::Unallocated);
            }
        }
    }
    true
}

// ─── read/deref collection for the checkers ────────────────────────────────

/// Paths whose values an expression reads.
pub fn collect_reads(expr: &Expr, ctx: &TransferCtx, out: &mut Vec<AccessPath>) {
    match expr {
        Expr::Var(_) | Expr::Field { .. } | Expr::Deref(_) => {
            if let Some(path) = ctx.path_of(expr) {
                out.push(path);
            }
            match expr {
                Expr::Field { base, .. } => collect_reads(base, ctx, out),
                Expr::Deref(inner) => collect_reads(inner, ctx, out),
                _ => {}
            }
        }
        // Taking an address reads no value.
        Expr::AddrOf(_) => {}
        Expr::Not(inner) => collect_reads(inner, ctx, out),
        Expr::Cmp { lhs, rhs, .. } => {
            collect_reads(lhs, ctx, out);
            collect_reads(rhs, ctx, out);
        }
        Expr::Call(call) => {
            for arg in &call.args {
                collect_reads(arg, ctx, out);
            }
        }
        Expr::Null | Expr::Int(_) | Expr::Unknown => {}
    }
}

/// Paths an expression dereferences (through `*p`, `p->f`, or `p.f`).
pub fn collect_derefs(expr: &Expr, ctx: &TransferCtx, out: &mut Vec<AccessPath>) {
    match expr {
        Expr::Deref(inner) => {
            if let Some(path) = ctx.path_of(inner) {
                out.push(path);
            }
            collect_derefs(inner, ctx, out);
        }
        Expr::Field { base, .. } => {
            if let Some(path) = ctx.path_of(base) {
                out.push(path);
            }
            collect_derefs(base, ctx, out);
        }
        Expr::AddrOf(inner) | Expr::Not(inner) => collect_derefs(inner, ctx, out),
        Expr::Cmp { lhs, rhs, .. } => {
            collect_derefs(lhs, ctx, out);
            collect_derefs(rhs, ctx, out);
        }
        Expr::Call(call) => {
            for arg in &call.args {
                collect_derefs(arg, ctx, out);
            }
        }
        Expr::Var(_) | Expr::Null | Expr::Int(_) | Expr::Unknown => {}
    }
}
