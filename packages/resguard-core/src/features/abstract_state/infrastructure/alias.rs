/*
 * Alias Classes
 *
 * Syntactic access-path aliasing under direct assignment: `p = q` and
 * `p = &l` merge classes, assignment through an opaque call breaks them.
 * This is a flat union-find keyed by access path; classes are tiny (a handful
 * of names per function), so simplicity beats asymptotics here.
 *
 * Invariant: `rep` maps members to their representative and representatives
 * never appear as keys. `merge` expects its first argument to be a singleton
 * (the state detaches an assignment target before re-aliasing it).
 */

use crate::features::abstract_state::domain::path::AccessPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasClasses {
    rep: BTreeMap<AccessPath, AccessPath>,
}

impl AliasClasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Representative of `path`'s class; a path not in any class represents
    /// itself.
    pub fn canonical(&self, path: &AccessPath) -> AccessPath {
        self.rep.get(path).cloned().unwrap_or_else(|| path.clone())
    }

    pub fn are_aliased(&self, a: &AccessPath, b: &AccessPath) -> bool {
        self.canonical(a) == self.canonical(b)
    }

    /// All members of `path`'s class, including the representative.
    pub fn members_of(&self, path: &AccessPath) -> Vec<AccessPath> {
        let canon = self.canonical(path);
        let mut members: Vec<AccessPath> = self
            .rep
            .iter()
            .filter(|(_, r)| **r == canon)
            .map(|(m, _)| m.clone())
            .collect();
        members.push(canon);
        members.sort();
        members
    }

    /// Merge the singleton `path` into `target`'s class.
    pub fn merge(&mut self, path: &AccessPath, target: &AccessPath) {
        let canon = self.canonical(target);
        if canon == *path {
            return;
        }
        self.rep.insert(path.clone(), canon);
    }

    /// Remove `path` from its class. When `path` was the representative of a
    /// class that still has other members, the survivors get a new
    /// representative and the caller must re-key any state stored under the
    /// old one; the return value is that `(old, new)` pair.
    pub fn detach(&mut self, path: &AccessPath) -> Option<(AccessPath, AccessPath)> {
        if self.rep.remove(path).is_some() {
            // Was a plain member; the class keeps its representative.
            return None;
        }

        let members: Vec<AccessPath> = self
            .rep
            .iter()
            .filter(|(_, r)| *r == path)
            .map(|(m, _)| m.clone())
            .collect();
        if members.is_empty() {
            return None;
        }

        let new_rep = members.iter().min().cloned().expect("nonempty members");
        self.rep.remove(&new_rep);
        for member in members {
            if member != new_rep {
                self.rep.insert(member, new_rep.clone());
            }
        }
        Some((path.clone(), new_rep))
    }

    /// Drop every class entry touching `function`'s frame (used when an
    /// inlined callee returns). Returns re-key instructions for classes whose
    /// representative lived in the dropped frame but which still have
    /// surviving members.
    pub fn prune_frame(&mut self, function: &str) -> Vec<(AccessPath, AccessPath)> {
        let doomed: Vec<AccessPath> = self
            .rep
            .keys()
            .filter(|p| p.belongs_to(function))
            .cloned()
            .collect();
        for path in &doomed {
            self.rep.remove(path);
        }

        let doomed_reps: Vec<AccessPath> = self
            .rep
            .values()
            .filter(|r| r.belongs_to(function))
            .cloned()
            .collect();
        let mut rekeys = Vec::new();
        for rep in doomed_reps {
            if let Some(pair) = self.detach(&rep) {
                rekeys.push(pair);
            }
        }
        rekeys
    }

    /// All aliased pairs `(member, representative)`.
    pub fn pairs(&self) -> impl Iterator<Item = (&AccessPath, &AccessPath)> {
        self.rep.iter()
    }

    /// The intersection of two alias relations: only pairs aliased on both
    /// sides survive a join.
    pub fn intersect(a: &AliasClasses, b: &AliasClasses) -> AliasClasses {
        let mut result = AliasClasses::new();
        for (member, _) in a.rep.iter() {
            let canon_a = a.canonical(member);
            if b.are_aliased(member, &canon_a) {
                result.merge(member, &canon_a);
            }
        }
        result
    }
}
