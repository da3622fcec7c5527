/*
 * Abstract State
 *
 * A mapping from access path to (AllocationTag, Nullability), a mapping from
 * lock path to LockState, alias classes, and the condition memory backing
 * branch correlation. Values are never mutated after publication: the
 * explorer clones, applies a transition, and publishes the new value.
 *
 * Lookup of an absent cell reads as Unknown; lookup of an absent lock reads
 * as the Unlocked entry default.
 */

use crate::features::abstract_state::domain::lattice::{
    join_cells, join_locks, AllocationTag, BranchSplit, CellState, CondKey, Guarded, LockState,
    Nullability,
};
use crate::features::abstract_state::domain::path::AccessPath;
use crate::features::abstract_state::infrastructure::alias::AliasClasses;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a function's `return` handed back, as seen by an inlined exit state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnValue {
    Path(AccessPath),
    Null,
    Opaque,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbstractState {
    cells: BTreeMap<AccessPath, Guarded<CellState>>,
    locks: BTreeMap<AccessPath, Guarded<LockState>>,
    aliases: AliasClasses,
    conds: BTreeMap<CondKey, bool>,
    escaped: BTreeSet<AccessPath>,
    returned: Option<ReturnValue>,
    fatal: bool,
}

impl AbstractState {
    pub fn empty() -> Self {
        Self::default()
    }

    // ─── lookups ───────────────────────────────────────────────────────────

    pub fn canonical(&self, path: &AccessPath) -> AccessPath {
        self.aliases.canonical(path)
    }

    pub fn are_aliased(&self, a: &AccessPath, b: &AccessPath) -> bool {
        self.aliases.are_aliased(a, b)
    }

    /// Flattened view of a cell; absent keys read as Unknown.
    pub fn cell(&self, path: &AccessPath) -> CellState {
        let canon = self.canonical(path);
        match self.cells.get(&canon) {
            Some(guarded) => guarded.flatten(join_cells).unwrap_or_else(CellState::unknown),
            None => CellState::unknown(),
        }
    }

    pub fn is_tracked(&self, path: &AccessPath) -> bool {
        let canon = self.canonical(path);
        self.cells.contains_key(&canon)
    }

    pub fn lock(&self, path: &AccessPath) -> Guarded<LockState> {
        let canon = self.canonical(path);
        self.locks
            .get(&canon)
            .cloned()
            .unwrap_or(Guarded::Flat(LockState::Unlocked))
    }

    pub fn cells(&self) -> impl Iterator<Item = (&AccessPath, &Guarded<CellState>)> {
        self.cells.iter()
    }

    pub fn locks(&self) -> impl Iterator<Item = (&AccessPath, &Guarded<LockState>)> {
        self.locks.iter()
    }

    pub fn is_escaped(&self, path: &AccessPath) -> bool {
        let canon = self.canonical(path);
        self.escaped.contains(&canon)
    }

    pub fn returned(&self) -> Option<&ReturnValue> {
        self.returned.as_ref()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn known_cond(&self, key: &CondKey) -> Option<bool> {
        self.conds.get(key).copied()
    }

    // ─── transitions (used by transfer; each runs on a fresh clone) ────────

    pub fn set_cell(&mut self, path: &AccessPath, cell: CellState) {
        let canon = self.canonical(path);
        self.cells.insert(canon, Guarded::Flat(cell));
    }

    pub fn set_nullability(&mut self, path: &AccessPath, null: Nullability) {
        let canon = self.canonical(path);
        let mut cell = self.cell(&canon);
        cell.null = null;
        self.cells.insert(canon, Guarded::Flat(cell));
    }

    pub fn set_tag(&mut self, path: &AccessPath, tag: AllocationTag) {
        let canon = self.canonical(path);
        let mut cell = self.cell(&canon);
        cell.tag = tag;
        self.cells.insert(canon, Guarded::Flat(cell));
    }

    pub fn untrack(&mut self, path: &AccessPath) {
        let canon = self.canonical(path);
        self.cells.remove(&canon);
    }

    pub fn set_lock(&mut self, path: &AccessPath, lock: LockState) {
        let canon = self.canonical(path);
        if lock == LockState::Unlocked {
            // Unlocked is the entry default; keeping the map sparse keeps
            // state comparison cheap.
            self.locks.remove(&canon);
        } else {
            self.locks.insert(canon, Guarded::Flat(lock));
        }
    }

    pub fn drop_lock(&mut self, path: &AccessPath) {
        let canon = self.canonical(path);
        self.locks.remove(&canon);
    }

    /// Invalidate everything a write to `path` may have changed: condition
    /// memory entries reading it and conditional values guarded by them.
    pub fn invalidate_for_write(&mut self, path: &AccessPath) {
        self.conds.retain(|key, _| !key.invalidated_by(path));
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .map(|(k, v)| (k, v.invalidate(path, join_cells)))
            .collect();
        let locks = std::mem::take(&mut self.locks);
        self.locks = locks
            .into_iter()
            .map(|(k, v)| (k, v.invalidate(path, join_locks)))
            .collect();
    }

    /// Prepare `path` to receive a new value: invalidate readers, detach it
    /// from its alias class (re-keying class state if it was the
    /// representative), and drop its own tracked facts.
    pub fn reassign_target(&mut self, path: &AccessPath) {
        self.invalidate_for_write(path);
        if let Some((old, new)) = self.aliases.detach(path) {
            if let Some(v) = self.cells.remove(&old) {
                self.cells.insert(new.clone(), v);
            }
            if let Some(v) = self.locks.remove(&old) {
                self.locks.insert(new.clone(), v);
            }
            if self.escaped.remove(&old) {
                self.escaped.insert(new);
            }
        } else {
            self.cells.remove(path);
            self.locks.remove(path);
            self.escaped.remove(path);
        }
    }

    /// Record `path = target` aliasing after a `reassign_target(path)`.
    pub fn assign_alias(&mut self, path: &AccessPath, target: &AccessPath) {
        self.aliases.merge(path, target);
    }

    /// Record a branch outcome and refine conditional values with it.
    pub fn refine_cond(&mut self, key: &CondKey, outcome: bool) {
        self.conds.insert(key.clone(), outcome);
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .map(|(k, v)| (k, v.refine(key, outcome)))
            .collect();
        let locks = std::mem::take(&mut self.locks);
        self.locks = locks
            .into_iter()
            .map(|(k, v)| (k, v.refine(key, outcome)))
            .collect();
    }

    pub fn mark_escaped(&mut self, path: &AccessPath) {
        let canon = self.canonical(path);
        self.escaped.insert(canon);
    }

    pub fn set_returned(&mut self, value: ReturnValue) {
        self.returned = Some(value);
    }

    pub fn set_fatal(&mut self) {
        self.fatal = true;
    }

    /// Conservative widening for a statement with no lowering rule: every
    /// tracked fact may have been touched.
    pub fn widen_all(&mut self) {
        for value in self.cells.values_mut() {
            *value = Guarded::Flat(CellState::unknown());
        }
        self.locks.clear();
        self.conds.clear();
        self.aliases = AliasClasses::new();
    }

    /// Drop everything belonging to an inlined callee's frame once it
    /// returns.
    pub fn prune_frame(&mut self, function: &str) {
        for (old, new) in self.aliases.prune_frame(function) {
            if let Some(v) = self.cells.remove(&old) {
                self.cells.insert(new.clone(), v);
            }
            if let Some(v) = self.locks.remove(&old) {
                self.locks.insert(new.clone(), v);
            }
            if self.escaped.remove(&old) {
                self.escaped.insert(new);
            }
        }
        self.cells.retain(|k, _| !k.belongs_to(function));
        self.locks.retain(|k, _| !k.belongs_to(function));
        self.escaped.retain(|k| !k.belongs_to(function));
        self.conds
            .retain(|key, _| !key.operands.iter().any(|op| op.belongs_to(function)));
        self.returned = None;
    }

    // ─── join ──────────────────────────────────────────────────────────────

    /// Least upper bound of two states, with branch-correlation rescue: when
    /// the two sides disagree on exactly complementary outcomes of a recorded
    /// condition, divergent values become conditional on it instead of
    /// collapsing to Unknown/Conflict.
    pub fn join(a: &AbstractState, b: &AbstractState) -> AbstractState {
        if a == b {
            return a.clone();
        }

        let split = Self::find_split(a, b);
        let know_a = |key: &CondKey| a.conds.get(key).copied();
        let know_b = |key: &CondKey| b.conds.get(key).copied();

        let mut conds = BTreeMap::new();
        for (key, value) in &a.conds {
            if b.conds.get(key) == Some(value) {
                conds.insert(key.clone(), *value);
            }
        }

        let aliases = AliasClasses::intersect(&a.aliases, &b.aliases);

        let mut cell_keys: BTreeSet<&AccessPath> = a.cells.keys().collect();
        cell_keys.extend(b.cells.keys());
        let mut cells = BTreeMap::new();
        for key in cell_keys {
            let unknown = Guarded::Flat(CellState::unknown());
            let va = a.cells.get(key).unwrap_or(&unknown);
            let vb = b.cells.get(key).unwrap_or(&unknown);
            cells.insert(
                key.clone(),
                Guarded::join_with(va, vb, split.as_ref(), &know_a, &know_b, join_cells),
            );
        }

        let mut lock_keys: BTreeSet<&AccessPath> = a.locks.keys().collect();
        lock_keys.extend(b.locks.keys());
        let mut locks = BTreeMap::new();
        for key in lock_keys {
            let default = Guarded::Flat(LockState::Unlocked);
            let va = a.locks.get(key).unwrap_or(&default);
            let vb = b.locks.get(key).unwrap_or(&default);
            let joined =
                Guarded::join_with(va, vb, split.as_ref(), &know_a, &know_b, join_locks);
            if joined != Guarded::Flat(LockState::Unlocked) {
                locks.insert(key.clone(), joined);
            }
        }

        let mut escaped = a.escaped.clone();
        escaped.extend(b.escaped.iter().cloned());

        let returned = if a.returned == b.returned {
            a.returned.clone()
        } else {
            None
        };

        AbstractState {
            cells,
            locks,
            aliases,
            conds,
            escaped,
            returned,
            fatal: a.fatal && b.fatal,
        }
    }

    /// The condition distinguishing the two incoming states, when exactly
    /// explained: both sides recorded it with opposite outcomes. With several
    /// candidates the lexicographically first wins, deterministically.
    fn find_split(a: &AbstractState, b: &AbstractState) -> Option<BranchSplit> {
        for (key, va) in &a.conds {
            if let Some(vb) = b.conds.get(key) {
                if va != vb {
                    return Some(BranchSplit {
                        key: key.clone(),
                        a_is_true: *va,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> AccessPath {
        AccessPath::local("f", name)
    }

    fn key(repr: &str, operand: &AccessPath) -> CondKey {
        let mut operands = BTreeSet::new();
        operands.insert(operand.clone());
        CondKey::new(repr.to_string(), operands)
    }

    #[test]
    fn test_untracked_reads_unknown() {
        let state = AbstractState::empty();
        let cell = state.cell(&p("q"));
        assert_eq!(cell.tag, AllocationTag::Unknown);
        assert_eq!(cell.null, Nullability::MaybeNull);
        assert!(!state.is_tracked(&p("q")));
    }

    #[test]
    fn test_alias_shares_cell() {
        let mut state = AbstractState::empty();
        state.set_cell(&p("l"), CellState::new(AllocationTag::Allocated, Nullability::NonNull));
        state.assign_alias(&p("q"), &p("l"));

        assert_eq!(state.cell(&p("q")).tag, AllocationTag::Allocated);

        state.set_tag(&p("q"), AllocationTag::Freed);
        assert_eq!(state.cell(&p("l")).tag, AllocationTag::Freed);
    }

    #[test]
    fn test_join_divergent_tags_to_unknown() {
        let mut a = AbstractState::empty();
        a.set_cell(&p("x"), CellState::new(AllocationTag::Allocated, Nullability::NonNull));
        let mut b = AbstractState::empty();
        b.set_cell(&p("x"), CellState::new(AllocationTag::Freed, Nullability::NonNull));

        let joined = AbstractState::join(&a, &b);
        assert_eq!(joined.cell(&p("x")).tag, AllocationTag::Unknown);
    }

    #[test]
    fn test_join_identical_tags_unchanged() {
        let mut a = AbstractState::empty();
        a.set_cell(&p("x"), CellState::new(AllocationTag::Freed, Nullability::NonNull));
        let joined = AbstractState::join(&a, &a.clone());
        assert_eq!(joined.cell(&p("x")).tag, AllocationTag::Freed);
    }

    #[test]
    fn test_join_with_complementary_conds_builds_conditional_lock() {
        let cond = key("c", &p("c"));

        let mut a = AbstractState::empty();
        a.refine_cond(&cond, true);
        a.set_lock(&p("l"), LockState::Locked);

        let mut b = AbstractState::empty();
        b.refine_cond(&cond, false);

        let joined = AbstractState::join(&a, &b);
        match joined.lock(&p("l")) {
            Guarded::Cond {
                when_true,
                when_false,
                ..
            } => {
                assert_eq!(when_true, LockState::Locked);
                assert_eq!(when_false, LockState::Unlocked);
            }
            other => panic!("expected conditional lock, got {:?}", other),
        }
        // The distinguishing condition is consumed by the join.
        assert_eq!(joined.known_cond(&cond), None);
    }

    #[test]
    fn test_join_without_split_conflicts_lock() {
        let mut a = AbstractState::empty();
        a.set_lock(&p("l"), LockState::Locked);
        let b = AbstractState::empty();

        let joined = AbstractState::join(&a, &b);
        assert_eq!(joined.lock(&p("l")), Guarded::Conflict);
    }

    #[test]
    fn test_write_invalidates_condition_memory() {
        let cond = key("a.x", &p("a"));
        let mut state = AbstractState::empty();
        state.refine_cond(&cond, true);
        assert_eq!(state.known_cond(&cond), Some(true));

        state.invalidate_for_write(&p("a"));
        assert_eq!(state.known_cond(&cond), None);
    }

    #[test]
    fn test_reassign_rekeys_class_state() {
        let mut state = AbstractState::empty();
        state.set_cell(&p("l"), CellState::new(AllocationTag::Allocated, Nullability::NonNull));
        state.assign_alias(&p("q"), &p("l"));

        // `l = something_else` must not lose q's view of the old cell.
        state.reassign_target(&p("l"));
        assert_eq!(state.cell(&p("q")).tag, AllocationTag::Allocated);
        assert!(!state.are_aliased(&p("l"), &p("q")));
    }

    #[test]
    fn test_widen_all() {
        let mut state = AbstractState::empty();
        state.set_cell(&p("x"), CellState::new(AllocationTag::Allocated, Nullability::NonNull));
        state.set_lock(&p("l"), LockState::Locked);

        state.widen_all();
        assert_eq!(state.cell(&p("x")).tag, AllocationTag::Unknown);
        assert_eq!(state.lock(&p("l")), Guarded::Flat(LockState::Unlocked));
    }
}
