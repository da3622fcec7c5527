/*
 * Builtin Effect Table
 *
 * The single source of truth for how the analysis interprets allocator and
 * lock primitive names. Keyed by callee name; checked before symbol
 * resolution so that a vocabulary entry wins even when a body of the same
 * name exists in the program.
 *
 * Two vocabularies ship built in (kernel-style and libc-style); tables are
 * serde-deserializable so other systems vocabularies can be loaded as
 * configuration.
 */

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Modeled effect of one recognized primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveEffect {
    /// Return value becomes Allocated (and MaybeNull until checked).
    Alloc,
    /// Same as Alloc, plus the allocation's contents are zeroed.
    ZeroedAlloc,
    /// The argument at `arg`'s tag becomes Freed.
    Free { arg: usize },
    /// The argument at `arg` (by reference) becomes Locked.
    Lock { arg: usize },
    /// The argument at `arg` (by reference) becomes Unlocked.
    Unlock { arg: usize },
    /// Terminates the path; no follow-up checks apply beyond it.
    Fatal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectTable {
    entries: BTreeMap<String, PrimitiveEffect>,
}

static KERNEL: Lazy<EffectTable> = Lazy::new(|| {
    let mut table = EffectTable::new();
    table.insert("kmalloc", PrimitiveEffect::Alloc);
    table.insert("vmalloc", PrimitiveEffect::Alloc);
    table.insert("kzalloc", PrimitiveEffect::ZeroedAlloc);
    table.insert("kcalloc", PrimitiveEffect::ZeroedAlloc);
    table.insert("kfree", PrimitiveEffect::Free { arg: 0 });
    table.insert("vfree", PrimitiveEffect::Free { arg: 0 });
    table.insert("mutex_lock", PrimitiveEffect::Lock { arg: 0 });
    table.insert("mutex_unlock", PrimitiveEffect::Unlock { arg: 0 });
    table.insert("spin_lock", PrimitiveEffect::Lock { arg: 0 });
    table.insert("spin_unlock", PrimitiveEffect::Unlock { arg: 0 });
    table.insert("panic", PrimitiveEffect::Fatal);
    table.insert("BUG", PrimitiveEffect::Fatal);
    table
});

static LIBC: Lazy<EffectTable> = Lazy::new(|| {
    let mut table = EffectTable::new();
    table.insert("malloc", PrimitiveEffect::Alloc);
    table.insert("calloc", PrimitiveEffect::ZeroedAlloc);
    table.insert("free", PrimitiveEffect::Free { arg: 0 });
    table.insert("pthread_mutex_lock", PrimitiveEffect::Lock { arg: 0 });
    table.insert("pthread_mutex_unlock", PrimitiveEffect::Unlock { arg: 0 });
    table.insert("exit", PrimitiveEffect::Fatal);
    table.insert("abort", PrimitiveEffect::Fatal);
    table
});

impl EffectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel-style allocator and mutex vocabulary.
    pub fn kernel() -> Self {
        KERNEL.clone()
    }

    /// Generic heap/pthread vocabulary.
    pub fn libc() -> Self {
        LIBC.clone()
    }

    pub fn insert(&mut self, name: impl Into<String>, effect: PrimitiveEffect) {
        self.entries.insert(name.into(), effect);
    }

    pub fn with(mut self, name: impl Into<String>, effect: PrimitiveEffect) -> Self {
        self.insert(name, effect);
        self
    }

    pub fn get(&self, name: &str) -> Option<PrimitiveEffect> {
        self.entries.get(name).copied()
    }

    pub fn is_fatal(&self, name: &str) -> bool {
        matches!(self.get(name), Some(PrimitiveEffect::Fatal))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
