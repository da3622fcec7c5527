/*
 * The fact lattice.
 *
 * Per tracked cell: (AllocationTag, Nullability). Per lock object: LockState.
 * Join rules: identical values pass through, Unknown absorbs, differing
 * allocation tags become Unknown, differing nullability becomes MaybeNull.
 * LockState has no neutral top; an irreconcilable lock join is Conflict and
 * the imbalance checker reports it.
 *
 * Guarded<T> keeps a divergent value alive when the divergence is explained by
 * one branch condition: `Cond { key, when_true, when_false }`. A later branch
 * on a structurally equal condition refines the value back to the exact arm;
 * a write to any operand of the condition degrades it to the conservative
 * join. The lattice stays finite: arms are always flat.
 */

use crate::features::abstract_state::domain::path::AccessPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllocationTag {
    Unallocated,
    Allocated,
    Freed,
    Unknown,
}

impl AllocationTag {
    pub fn join(self, other: AllocationTag) -> AllocationTag {
        if self == other {
            self
        } else {
            AllocationTag::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Nullability {
    MaybeNull,
    NonNull,
    DefiniteNull,
}

impl Nullability {
    pub fn join(self, other: Nullability) -> Nullability {
        if self == other {
            self
        } else {
            Nullability::MaybeNull
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LockState {
    Unlocked,
    Locked,
}

/// Tracked facts for one memory cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellState {
    pub tag: AllocationTag,
    pub null: Nullability,
    /// Contents were zeroed at allocation; field reads start DefiniteNull.
    pub zeroed: bool,
}

impl CellState {
    pub fn new(tag: AllocationTag, null: Nullability) -> Self {
        Self {
            tag,
            null,
            zeroed: false,
        }
    }

    /// The untracked/external value: lookups of absent keys read as this.
    pub fn unknown() -> Self {
        Self::new(AllocationTag::Unknown, Nullability::MaybeNull)
    }

    pub fn join(&self, other: &CellState) -> CellState {
        CellState {
            tag: self.tag.join(other.tag),
            null: self.null.join(other.null),
            zeroed: self.zeroed && other.zeroed,
        }
    }
}

/// Normalized branch condition identity: a stable rendering plus the operand
/// paths whose reassignment invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CondKey {
    pub repr: String,
    pub operands: BTreeSet<AccessPath>,
}

impl CondKey {
    pub fn new(repr: String, operands: BTreeSet<AccessPath>) -> Self {
        Self { repr, operands }
    }

    /// Whether a write to `path` can change this condition's outcome.
    pub fn invalidated_by(&self, path: &AccessPath) -> bool {
        self.operands.iter().any(|op| op.interferes_with(path))
    }
}

impl fmt::Display for CondKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}

/// How a join point splits its two incoming states: both recorded the same
/// condition with opposite outcomes, and `a_is_true` says which side took the
/// true edge.
#[derive(Debug, Clone)]
pub struct BranchSplit {
    pub key: CondKey,
    pub a_is_true: bool,
}

/// A lattice value that may be conditional on one branch predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guarded<T> {
    Flat(T),
    Cond {
        key: CondKey,
        when_true: T,
        when_false: T,
    },
    /// Irreconcilable; only lock values reach this.
    Conflict,
}

impl<T: Clone + PartialEq> Guarded<T> {
    /// Collapse to a single value using `join`; None from `join` means the
    /// arms cannot be reconciled.
    pub fn flatten(&self, join: impl Fn(&T, &T) -> Option<T>) -> Option<T> {
        match self {
            Guarded::Flat(v) => Some(v.clone()),
            Guarded::Cond {
                when_true,
                when_false,
                ..
            } => join(when_true, when_false),
            Guarded::Conflict => None,
        }
    }

    /// Refine against a known branch outcome.
    pub fn refine(&self, key: &CondKey, outcome: bool) -> Guarded<T> {
        match self {
            Guarded::Cond {
                key: k,
                when_true,
                when_false,
            } if k == key => {
                Guarded::Flat(if outcome { when_true.clone() } else { when_false.clone() })
            }
            other => other.clone(),
        }
    }

    /// Degrade to flat if a write to `path` invalidates the guarding
    /// condition.
    pub fn invalidate(&self, path: &AccessPath, join: impl Fn(&T, &T) -> Option<T>) -> Guarded<T> {
        match self {
            Guarded::Cond { key, .. } if key.invalidated_by(path) => match self.flatten(&join) {
                Some(v) => Guarded::Flat(v),
                None => Guarded::Conflict,
            },
            other => other.clone(),
        }
    }

    /// Join two guarded values. `split` carries the condition that separates
    /// the two incoming states, when exactly one does; `know_a`/`know_b`
    /// report each side's recorded outcome for a condition, so a flat value
    /// from a state that took one edge of a guard merges into the matching
    /// arm of the other side's conditional value.
    pub fn join_with(
        a: &Guarded<T>,
        b: &Guarded<T>,
        split: Option<&BranchSplit>,
        know_a: &dyn Fn(&CondKey) -> Option<bool>,
        know_b: &dyn Fn(&CondKey) -> Option<bool>,
        join: impl Fn(&T, &T) -> Option<T> + Copy,
    ) -> Guarded<T> {
        match (a, b) {
            (Guarded::Conflict, _) | (_, Guarded::Conflict) => Guarded::Conflict,

            (Guarded::Flat(x), Guarded::Flat(y)) => {
                if x == y {
                    Guarded::Flat(x.clone())
                } else if let Some(split) = split {
                    let (when_true, when_false) = if split.a_is_true {
                        (x.clone(), y.clone())
                    } else {
                        (y.clone(), x.clone())
                    };
                    Guarded::Cond {
                        key: split.key.clone(),
                        when_true,
                        when_false,
                    }
                } else {
                    match join(x, y) {
                        Some(v) => Guarded::Flat(v),
                        None => Guarded::Conflict,
                    }
                }
            }

            (
                Guarded::Flat(x),
                Guarded::Cond {
                    key,
                    when_true,
                    when_false,
                },
            ) => match know_a(key) {
                Some(true) => match join(x, when_true) {
                    Some(t) => Guarded::Cond {
                        key: key.clone(),
                        when_true: t,
                        when_false: when_false.clone(),
                    },
                    None => Guarded::Conflict,
                },
                Some(false) => match join(x, when_false) {
                    Some(f) => Guarded::Cond {
                        key: key.clone(),
                        when_true: when_true.clone(),
                        when_false: f,
                    },
                    None => Guarded::Conflict,
                },
                None => match b.flatten(join) {
                    Some(y) => Guarded::join_with(
                        a,
                        &Guarded::Flat(y),
                        split,
                        know_a,
                        know_b,
                        join,
                    ),
                    None => Guarded::Conflict,
                },
            },

            (Guarded::Cond { .. }, Guarded::Flat(_)) => {
                Guarded::join_with(b, a, split.map(flip_split).as_ref(), know_b, know_a, join)
            }

            (
                Guarded::Cond {
                    key: ka,
                    when_true: ta,
                    when_false: fa,
                },
                Guarded::Cond {
                    key: kb,
                    when_true: tb,
                    when_false: fb,
                },
            ) => {
                if ka == kb {
                    match (join(ta, tb), join(fa, fb)) {
                        (Some(t), Some(f)) if t == f => Guarded::Flat(t),
                        (Some(t), Some(f)) => Guarded::Cond {
                            key: ka.clone(),
                            when_true: t,
                            when_false: f,
                        },
                        _ => Guarded::Conflict,
                    }
                } else {
                    // Differently-keyed: collapse both sides first.
                    match (a.flatten(join), b.flatten(join)) {
                        (Some(x), Some(y)) => Guarded::join_with(
                            &Guarded::Flat(x),
                            &Guarded::Flat(y),
                            split,
                            know_a,
                            know_b,
                            join,
                        ),
                        _ => Guarded::Conflict,
                    }
                }
            }
        }
    }
}

fn flip_split(split: &BranchSplit) -> BranchSplit {
    BranchSplit {
        key: split.key.clone(),
        a_is_true: !split.a_is_true,
    }
}

/// Join for cell values: total.
pub fn join_cells(a: &CellState, b: &CellState) -> Option<CellState> {
    Some(a.join(b))
}

/// Join for lock values: partial; disagreement is a conflict.
pub fn join_locks(a: &LockState, b: &LockState) -> Option<LockState> {
    if a == b {
        Some(*a)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_join_unknown_absorbs() {
        use AllocationTag::*;
        assert_eq!(Allocated.join(Allocated), Allocated);
        assert_eq!(Allocated.join(Freed), Unknown);
        assert_eq!(Unknown.join(Freed), Unknown);
        assert_eq!(Freed.join(Unknown), Unknown);
    }

    #[test]
    fn test_nullability_join() {
        use Nullability::*;
        assert_eq!(NonNull.join(NonNull), NonNull);
        assert_eq!(NonNull.join(DefiniteNull), MaybeNull);
        assert_eq!(MaybeNull.join(NonNull), MaybeNull);
    }

    fn key(repr: &str) -> CondKey {
        CondKey::new(repr.to_string(), BTreeSet::new())
    }

    fn no_knowledge(_: &CondKey) -> Option<bool> {
        None
    }

    #[test]
    fn test_split_join_builds_conditional() {
        let a = Guarded::Flat(LockState::Locked);
        let b = Guarded::Flat(LockState::Unlocked);
        let split = BranchSplit {
            key: key("cond"),
            a_is_true: true,
        };
        let joined =
            Guarded::join_with(&a, &b, Some(&split), &no_knowledge, &no_knowledge, join_locks);
        assert_eq!(
            joined,
            Guarded::Cond {
                key: key("cond"),
                when_true: LockState::Locked,
                when_false: LockState::Unlocked,
            }
        );

        // The later structurally-equal branch gets the exact arm back.
        assert_eq!(
            joined.refine(&key("cond"), true),
            Guarded::Flat(LockState::Locked)
        );
        assert_eq!(
            joined.refine(&key("cond"), false),
            Guarded::Flat(LockState::Unlocked)
        );
    }

    #[test]
    fn test_unsplit_lock_join_conflicts() {
        let a = Guarded::Flat(LockState::Locked);
        let b = Guarded::Flat(LockState::Unlocked);
        assert_eq!(
            Guarded::join_with(&a, &b, None, &no_knowledge, &no_knowledge, join_locks),
            Guarded::Conflict
        );
    }

    #[test]
    fn test_flat_with_known_outcome_merges_into_arm() {
        // A state that took the true edge re-joins a conditional value: its
        // flat Locked belongs on the true arm, not in a conflict.
        let cond = Guarded::Cond {
            key: key("c"),
            when_true: LockState::Locked,
            when_false: LockState::Unlocked,
        };
        let flat = Guarded::Flat(LockState::Locked);
        let knows_true = |k: &CondKey| if *k == key("c") { Some(true) } else { None };

        let joined =
            Guarded::join_with(&flat, &cond, None, &knows_true, &no_knowledge, join_locks);
        assert_eq!(joined, cond);
    }

    #[test]
    fn test_invalidation_degrades_conditional() {
        let mut operands = BTreeSet::new();
        operands.insert(AccessPath::local("f", "a"));
        let cond = Guarded::Cond {
            key: CondKey::new("a.x".to_string(), operands),
            when_true: LockState::Locked,
            when_false: LockState::Unlocked,
        };

        let write_to_a = AccessPath::local("f", "a");
        assert_eq!(cond.invalidate(&write_to_a, join_locks), Guarded::Conflict);

        let write_to_b = AccessPath::local("f", "b");
        assert_eq!(cond.invalidate(&write_to_b, join_locks), cond);
    }
}
