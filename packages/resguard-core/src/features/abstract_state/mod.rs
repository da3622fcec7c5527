//! Abstract state: the lattice of tracked facts per memory location and lock
//! object, alias classes, the builtin effect table, and the transfer/join
//! operations.

pub mod domain;
pub mod infrastructure;

pub use domain::lattice::{
    AllocationTag, BranchSplit, CellState, CondKey, Guarded, LockState, Nullability,
};
pub use domain::path::{AccessPath, PathBase, Projection};
pub use domain::state::{AbstractState, ReturnValue};
pub use infrastructure::alias::AliasClasses;
pub use infrastructure::effects::{EffectTable, PrimitiveEffect};
pub use infrastructure::transfer::TransferCtx;
