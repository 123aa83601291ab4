//! Goal tree IR — the procedure-body representation the reuse analysis
//! traverses and rewrites.
//!
//! A procedure body is a tree of [`Goal`] nodes: unifications at the leaves,
//! conjunction/disjunction/switch/negation/if-then-else as interior nodes,
//! and opaque calls. Every node carries a [`ReuseDecision`] annotation slot,
//! initially [`ReuseDecision::Undecided`]; the analysis records its decisions
//! by rebuilding the tree top-down, never by aliasing into it.
//!
//! The variant set is deliberately closed: every traversal in this crate
//! matches exhaustively over [`GoalKind`] and [`Unify`], so adding a node
//! kind is a compile-time error until each traversal handles it.

use smallvec::SmallVec;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Variable ID within one procedure.
///
/// IDs are allocated by the front end; this crate only compares them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    /// Create a new variable ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Program point — a stable identifier for one construct/deconstruct site.
///
/// Assigned by the front end from the node's position in the tree, and
/// therefore stable across the rebuilds this analysis performs. Two distinct
/// deconstruct/construct sites never share a program point within one
/// procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ProgramPoint(u32);

impl ProgramPoint {
    /// Create a new program point from a raw index.
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

/// Interned constructor name. The front end owns the interner; this crate
/// only compares names for equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct CtorName(u32);

impl CtorName {
    /// Create a constructor name from a raw interner index.
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

// ── Constructor tags ────────────────────────────────────────────────

/// A constructor tag: functor name plus declared arity.
///
/// Two tags are the same functor only if both name and arity agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct CtorTag {
    pub name: CtorName,
    pub arity: u32,
}

// ── Reuse annotations ───────────────────────────────────────────────

/// The dead cell a construction has been assigned to reuse.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ReuseCell {
    /// The variable whose cell dies and is reused.
    pub dead_var: VarId,
    /// Candidate constructor tags the dead cell may have been built with.
    pub tags: Vec<CtorTag>,
    /// `update_mask[i] == false` means argument *i* of the reused cell
    /// already holds the correct value and need not be rewritten.
    pub update_mask: Vec<bool>,
}

/// Per-node reuse decision, recorded by the selector and the cell-caching
/// sweep. Consumed by the code generator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ReuseDecision {
    /// No decision recorded.
    #[default]
    Undecided,
    /// The cell deconstructed here dies; its storage becomes garbage.
    CellDied,
    /// The cell dies here and, being unconditionally dead and unreused,
    /// may be pooled by the run-time allocator instead of released.
    CellCached,
    /// The construction may reuse the dead cell, but only when the
    /// accumulated alias precondition holds at run time.
    PotentialReuse(ReuseCell),
    /// The construction reuses the dead cell unconditionally.
    Reuse(ReuseCell),
}

// ── Goal tree ───────────────────────────────────────────────────────

/// A unification, the leaf operation of a goal tree.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Unify {
    /// Allocate and fill a new cell: `var = tag(args...)`.
    Construct {
        var: VarId,
        tag: CtorTag,
        args: Vec<VarId>,
        point: ProgramPoint,
    },
    /// Read a cell apart: `var => tag(args...)`. If `var` has no other
    /// uses, its cell is dead afterwards.
    Deconstruct {
        var: VarId,
        tag: CtorTag,
        args: Vec<VarId>,
        point: ProgramPoint,
    },
    /// Variable-to-variable assignment: `to := from`.
    Assign { to: VarId, from: VarId },
    /// Equality test on two bound variables.
    SimpleTest { left: VarId, right: VarId },
}

/// One arm of a switch: the tag being switched on and the case body.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Case {
    pub tag: CtorTag,
    pub goal: Goal,
}

/// The shape of a goal node.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum GoalKind {
    /// A unification leaf.
    Unify(Unify),
    /// Sequential conjunction; children execute in order.
    Conj(Vec<Goal>),
    /// Disjunction; branches are mutually exclusive at run time.
    Disj(Vec<Goal>),
    /// Switch on the top functor of `var`; cases are mutually exclusive.
    Switch { var: VarId, cases: Vec<Case> },
    /// Negated goal. Bindings made inside are never visible outside.
    Negation(Box<Goal>),
    /// Quantification/commit scope; transparent to this analysis.
    Scope(Box<Goal>),
    /// If-then-else: `cond` then `then`, else `els`.
    IfThenElse {
        cond: Box<Goal>,
        then: Box<Goal>,
        els: Box<Goal>,
    },
    /// First-order call to another procedure.
    PlainCall { args: Vec<VarId> },
    /// Higher-order or typeclass-method call.
    GenericCall { args: Vec<VarId> },
    /// Call to foreign code.
    ForeignCall { args: Vec<VarId> },
}

/// A goal tree node: shape plus the reuse annotation slot.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Goal {
    pub kind: GoalKind,
    pub reuse: ReuseDecision,
}

impl Goal {
    /// Wrap a kind with an empty annotation slot.
    pub fn new(kind: GoalKind) -> Self {
        Goal {
            kind,
            reuse: ReuseDecision::Undecided,
        }
    }

    /// Visit every unification in the tree, in program order, together
    /// with its annotation. Read-only; used by tests and trace dumps.
    pub fn for_each_unify<F>(&self, f: &mut F)
    where
        F: FnMut(&Unify, &ReuseDecision),
    {
        match &self.kind {
            GoalKind::Unify(u) => f(u, &self.reuse),
            GoalKind::Conj(goals) | GoalKind::Disj(goals) => {
                for g in goals {
                    g.for_each_unify(f);
                }
            }
            GoalKind::Switch { cases, .. } => {
                for case in cases {
                    case.goal.for_each_unify(f);
                }
            }
            GoalKind::Negation(g) | GoalKind::Scope(g) => g.for_each_unify(f),
            GoalKind::IfThenElse { cond, then, els } => {
                cond.for_each_unify(f);
                then.for_each_unify(f);
                els.for_each_unify(f);
            }
            GoalKind::PlainCall { .. }
            | GoalKind::GenericCall { .. }
            | GoalKind::ForeignCall { .. } => {}
        }
    }

    /// Collect `(point, decision)` for every annotated construct and
    /// deconstruct site. Convenience over [`Goal::for_each_unify`].
    pub fn annotated_sites(&self) -> SmallVec<[(ProgramPoint, ReuseDecision); 8]> {
        let mut sites = SmallVec::new();
        self.for_each_unify(&mut |u, decision| {
            if *decision == ReuseDecision::Undecided {
                return;
            }
            match u {
                Unify::Construct { point, .. } | Unify::Deconstruct { point, .. } => {
                    sites.push((*point, decision.clone()));
                }
                Unify::Assign { .. } | Unify::SimpleTest { .. } => {}
            }
        });
        sites
    }
}
