//! Defect reports.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefectKind {
    DoubleFree,
    UseAfterFree,
    Leak,
    NullDeref,
    LockImbalance,
}

impl DefectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectKind::DoubleFree => "double-free",
            DefectKind::UseAfterFree => "use-after-free",
            DefectKind::Leak => "leak",
            DefectKind::NullDeref => "null-deref",
            DefectKind::LockImbalance => "lock-imbalance",
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reported defect. `node` and `trace` are CFG node indices in the
/// reported function; the trace is the earliest-discovered witnessing path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectReport {
    pub kind: DefectKind,
    pub function: String,
    pub node: u32,
    /// The access path the defect is about; the dedup key alongside kind.
    pub location: String,
    /// Short state witness, human readable.
    pub witness: String,
    /// Node identifiers forming the witnessing trace, when available.
    pub trace: Vec<u32>,
}

impl DefectReport {
    pub fn new(
        kind: DefectKind,
        function: impl Into<String>,
        node: u32,
        location: impl Into<String>,
        witness: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            function: function.into(),
            node,
            location: location.into(),
            witness: witness.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<u32>) -> Self {
        self.trace = trace;
        self
    }
}

impl fmt::Display for DefectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at node {} in {}: {}",
            self.kind, self.location, self.node, self.function, self.witness
        )
    }
}
