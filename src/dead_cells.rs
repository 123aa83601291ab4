//! Dead-cell table — the upstream aliasing analysis' verdict on which
//! deconstruction sites leave garbage behind, and under what condition.
//!
//! The table maps the program point of a deconstruction to the
//! [`ReuseCondition`] under which its cell is really dead. It is created
//! once per procedure by the structure-sharing analysis; this pass only
//! shrinks it, removing entries as their sites are claimed by a match or
//! swept by the cell-caching fallback. Removed entries never come back.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::goal::ProgramPoint;

// ── Reuse conditions ────────────────────────────────────────────────

/// An alias-safety obligation minted by the upstream sharing analysis.
///
/// Opaque to this pass: obligations are only collected, unioned, and
/// handed back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Obligation(u32);

impl Obligation {
    /// Create an obligation token from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The condition under which a cell is dead and its reuse is sound.
///
/// `Always` means the upstream analysis proved the cell unconditionally
/// dead. `Conditional` carries the set of alias obligations that must
/// hold at run time. The least upper bound of two conditions is the
/// union of their obligation sets, with `Always` (the empty set) as
/// identity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ReuseCondition {
    /// The cell is dead on every execution; no run-time check needed.
    Always,
    /// Dead only when every obligation in the set holds.
    Conditional(BTreeSet<Obligation>),
}

impl ReuseCondition {
    /// `true` for the unconditional ("always true") condition.
    #[inline]
    pub fn is_always(&self) -> bool {
        matches!(self, ReuseCondition::Always)
    }

    /// Least upper bound: union of obligation sets.
    pub fn lub(&self, other: &ReuseCondition) -> ReuseCondition {
        match (self, other) {
            (ReuseCondition::Always, c) | (c, ReuseCondition::Always) => c.clone(),
            (ReuseCondition::Conditional(a), ReuseCondition::Conditional(b)) => {
                ReuseCondition::Conditional(a.union(b).copied().collect())
            }
        }
    }
}

// ── The table ───────────────────────────────────────────────────────

/// Program point of a deconstruction → condition under which its cell
/// is dead.
///
/// All operations are O(1) expected; absence is a normal outcome, never
/// an error.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DeadCellTable {
    entries: FxHashMap<ProgramPoint, ReuseCondition>,
}

impl DeadCellTable {
    /// Empty table (a procedure with no dead cells).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(point, condition)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (ProgramPoint, ReuseCondition)>) -> Self {
        DeadCellTable {
            entries: entries.into_iter().collect(),
        }
    }

    /// The condition for `point`, if its cell is dead.
    pub fn lookup(&self, point: ProgramPoint) -> Option<&ReuseCondition> {
        self.entries.get(&point)
    }

    /// Remove the entry for `point`. Removing an absent point is a no-op.
    pub fn remove(&mut self, point: ProgramPoint) {
        self.entries.remove(&point);
    }

    /// Drop every entry whose condition is not `Always`.
    ///
    /// Run before the cell-caching sweep: only unconditionally dead cells
    /// may be pooled.
    pub fn remove_conditional_entries(&mut self) {
        self.entries.retain(|_, cond| cond.is_always());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate the remaining entries. Order is unspecified; callers that
    /// need determinism sort on the program point.
    pub fn iter(&self) -> impl Iterator<Item = (ProgramPoint, &ReuseCondition)> {
        self.entries.iter().map(|(p, c)| (*p, c))
    }
}
