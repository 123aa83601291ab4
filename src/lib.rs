//! Compile-time garbage collection for the compiler: structure-reuse
//! analysis over procedure goal trees.
//!
//! Given a procedure body in which some deconstructions leave dead cells
//! behind (per the upstream structure-sharing analysis), this crate
//! decides which dead cells may have their storage reused in place by
//! later constructions, instead of fresh allocation. It provides:
//!
//! - **Goal tree IR** ([`Goal`], [`GoalKind`], [`Unify`]) — the immutable
//!   procedure-body representation every pass in this crate traverses and
//!   rebuilds, with a per-node [`ReuseDecision`] annotation slot.
//!
//! - **Dead-cell table** ([`DeadCellTable`], [`ReuseCondition`]) — the
//!   upstream analysis' verdict: deconstruction site → condition under
//!   which its cell is dead.
//!
//! - **Cost model** ([`compute_reuse_type`], [`ReuseType`], [`glb`]) —
//!   pure scoring of candidate pairings.
//!
//! - **Match table** ([`compute_match_table`], [`Match`], [`MatchTable`])
//!   — one round's scored candidate assignments, built by a
//!   continuation-threading traversal of the goal tree.
//!
//! - **Selector** ([`select_reuses`]) — the fixed-point loop committing
//!   the best match per round, plus the cell-caching fallback
//!   ([`mark_cacheable_cells`]) for dead cells nothing could reuse.
//!
//! # Design
//!
//! The analysis is single-threaded and purely functional per procedure:
//! every round threads the `(dead-cell table, goal tree, accumulated
//! condition)` state explicitly, and the tree is rebuilt rather than
//! mutated when a decision lands. A batch compiler may parallelize across
//! procedures; within one procedure each round's match table depends on
//! the previous round's removals, so the loop is strictly sequential.
//!
//! Soundness rests on conservatism at control splits: branch-local deaths
//! never pair past their branch unless the variable dies in *every*
//! branch, and nothing inside a negation is visible outside it.
//!
//! This is an internal pass over validated input: there are no user-facing
//! errors. Cost-model rejection is an ordinary `None`; broken internal
//! invariants abort the procedure's analysis with a panic naming the
//! invariant.

pub mod cache;
pub mod cost;
pub mod dead_cells;
pub mod goal;
pub mod matching;
pub mod select;

#[cfg(test)]
mod test_helpers;

pub use cache::mark_cacheable_cells;
pub use cost::{compute_reuse_type, glb, ReuseType};
pub use dead_cells::{DeadCellTable, Obligation, ReuseCondition};
pub use goal::{
    Case, CtorName, CtorTag, Goal, GoalKind, ProgramPoint, ReuseCell, ReuseDecision, Unify, VarId,
};
pub use matching::{average_match, compute_match_table, ConSpec, DeconSpec, Match, MatchTable};
pub use select::select_reuses;

/// Which dead cells a construction is allowed to reuse.
///
/// Fixed configuration for the whole procedure; supplied by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReuseStrategy {
    /// Only cells built with the construction's own functor.
    SameConstructorOnly,
    /// Any cell whose arity exceeds the construction's by at most `n`.
    WithinArityDifference(u32),
}

/// Module/type oracle for the cost model.
///
/// Answers the one layout question the analysis needs: whether a cell of
/// this variable's type, built with this functor, carries a hidden
/// secondary tag in its first slot. The compiler's type tables implement
/// this; tests use table-backed stubs.
pub trait TypeContext {
    fn has_secondary_tag(&self, var: VarId, tag: &CtorTag) -> bool;
}

/// Result of analyzing one procedure.
#[derive(Clone, Debug, PartialEq)]
pub struct ReuseAnalysis {
    /// The rewritten goal tree, reuse decisions recorded per node.
    pub goal: Goal,
    /// Condition under which every committed reuse is sound.
    pub condition: ReuseCondition,
}

/// Analyze one procedure: run the selector to its fixed point, then
/// sweep the leftover unconditionally-dead cells into the allocator
/// cache.
pub fn analyze_proc(
    goal: Goal,
    mut dead_cells: DeadCellTable,
    strategy: ReuseStrategy,
    ctx: &dyn TypeContext,
) -> ReuseAnalysis {
    tracing::debug!(
        dead_cells = dead_cells.len(),
        ?strategy,
        "structure reuse analysis"
    );
    let (goal, condition) = select::select_reuses(goal, &mut dead_cells, strategy, ctx);
    let goal = cache::mark_cacheable_cells(goal, &mut dead_cells);
    ReuseAnalysis { goal, condition }
}
