//! Cell-caching fallback — sweeps the dead cells nothing could reuse.
//!
//! After the selection loop has exhausted every reuse opportunity, a cell
//! that is unconditionally dead but paired with no construction can still
//! be handed to the run-time allocator's cache instead of being released
//! outright. Conditional entries are dropped first: a cell that is only
//! conditionally dead must never be pooled.
//!
//! This is a monotone single-pass rewrite with no backtracking.

use crate::dead_cells::DeadCellTable;
use crate::goal::{Case, Goal, GoalKind, ReuseDecision, Unify};

/// Mark every surviving unconditionally-dead, unreused deconstruction
/// site as cacheable.
pub fn mark_cacheable_cells(goal: Goal, dead_cells: &mut DeadCellTable) -> Goal {
    dead_cells.remove_conditional_entries();
    if dead_cells.is_empty() {
        return goal;
    }
    tracing::debug!(cacheable = dead_cells.len(), "marking cacheable cells");
    sweep(goal, dead_cells)
}

fn sweep(goal: Goal, dead_cells: &DeadCellTable) -> Goal {
    let Goal { kind, reuse } = goal;
    match kind {
        GoalKind::Unify(Unify::Deconstruct {
            var,
            tag,
            args,
            point,
        }) if reuse == ReuseDecision::Undecided && dead_cells.lookup(point).is_some() => Goal {
            kind: GoalKind::Unify(Unify::Deconstruct {
                var,
                tag,
                args,
                point,
            }),
            reuse: ReuseDecision::CellCached,
        },
        GoalKind::Unify(u) => Goal {
            kind: GoalKind::Unify(u),
            reuse,
        },
        GoalKind::Conj(goals) => Goal {
            kind: GoalKind::Conj(goals.into_iter().map(|g| sweep(g, dead_cells)).collect()),
            reuse,
        },
        GoalKind::Disj(branches) => Goal {
            kind: GoalKind::Disj(
                branches
                    .into_iter()
                    .map(|g| sweep(g, dead_cells))
                    .collect(),
            ),
            reuse,
        },
        GoalKind::Switch { var, cases } => Goal {
            kind: GoalKind::Switch {
                var,
                cases: cases
                    .into_iter()
                    .map(|c| Case {
                        tag: c.tag,
                        goal: sweep(c.goal, dead_cells),
                    })
                    .collect(),
            },
            reuse,
        },
        GoalKind::Negation(inner) => Goal {
            kind: GoalKind::Negation(Box::new(sweep(*inner, dead_cells))),
            reuse,
        },
        GoalKind::Scope(inner) => Goal {
            kind: GoalKind::Scope(Box::new(sweep(*inner, dead_cells))),
            reuse,
        },
        GoalKind::IfThenElse { cond, then, els } => Goal {
            kind: GoalKind::IfThenElse {
                cond: Box::new(sweep(*cond, dead_cells)),
                then: Box::new(sweep(*then, dead_cells)),
                els: Box::new(sweep(*els, dead_cells)),
            },
            reuse,
        },
        kind @ (GoalKind::PlainCall { .. }
        | GoalKind::GenericCall { .. }
        | GoalKind::ForeignCall { .. }) => Goal { kind, reuse },
    }
}
