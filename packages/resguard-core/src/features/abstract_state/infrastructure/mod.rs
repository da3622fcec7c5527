//! Abstract-state infrastructure: alias classes, the builtin effect table,
//! and the transfer function.

pub mod alias;
pub mod effects;
pub mod transfer;
