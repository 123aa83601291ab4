//! Match selector & annotator — the fixed-point core of the pass.
//!
//! Each round rebuilds the match table, commits the single best match
//! (highest value/degree ratio, not highest raw value), rewrites the goal
//! tree to record the decision, strips the consumed deconstructions from
//! the dead-cell table, and folds the match's condition into the
//! procedure-wide accumulator. Every round removes at least one dead-cell
//! entry, so the loop runs at most as many rounds as the table had
//! entries.
//!
//! The ratio rule is a deliberate anti-greedy correction: a cell reusable
//! by many candidates yields priority to a cell with few alternatives at
//! the same value, because committing the flexible cell first can strand
//! the inflexible one with nothing left to reuse.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::dead_cells::{DeadCellTable, ReuseCondition};
use crate::goal::{
    Case, CtorTag, Goal, GoalKind, ProgramPoint, ReuseCell, ReuseDecision, Unify, VarId,
};
use crate::matching::{compute_match_table, Match};
use crate::{ReuseStrategy, TypeContext};

/// Run the selection loop to its fixed point.
///
/// Returns the annotated goal tree and the accumulated condition under
/// which every committed reuse is sound.
pub fn select_reuses(
    mut goal: Goal,
    dead_cells: &mut DeadCellTable,
    strategy: ReuseStrategy,
    ctx: &dyn TypeContext,
) -> (Goal, ReuseCondition) {
    let initial = dead_cells.len();
    let mut accumulated = ReuseCondition::Always;
    let mut rounds = 0u32;

    loop {
        let table = compute_match_table(dead_cells, strategy, ctx, &goal);
        if table.is_empty() {
            break;
        }
        rounds += 1;

        if tracing::enabled!(tracing::Level::TRACE) {
            for m in table.iter() {
                tracing::trace!(
                    dead_var = m.dead_var().raw(),
                    value = m.value,
                    degree = m.degree,
                    candidates = m.con_specs.len(),
                    "candidate match"
                );
            }
        }

        let Some(best) = table.highest_ratio_match() else {
            unreachable!("non-empty match table with no best match");
        };
        let best = best.clone();
        tracing::debug!(
            round = rounds,
            dead_var = best.dead_var().raw(),
            value = best.value,
            degree = best.degree,
            "committing match"
        );

        let condition = best.condition();
        for spec in &best.decon_specs {
            dead_cells.remove(spec.point);
        }
        goal = annotate_match(goal, &best, &condition);
        accumulated = accumulated.lub(&condition);

        debug_assert!(
            rounds as usize <= initial,
            "selection exceeded the dead-cell bound"
        );
    }

    tracing::debug!(rounds, remaining = dead_cells.len(), "reuse selection converged");
    (goal, accumulated)
}

// ── Tree rewriting ──────────────────────────────────────────────────

/// Everything needed to record one committed match in the tree.
struct Commit {
    decon_points: FxHashSet<ProgramPoint>,
    /// Construction point → field-update mask from its con spec.
    con_masks: FxHashMap<ProgramPoint, Vec<bool>>,
    dead_var: VarId,
    tags: SmallVec<[CtorTag; 2]>,
    conditional: bool,
}

/// Rebuild the tree with the match's decisions recorded: every consumed
/// deconstruction becomes "cell died", every chosen construction becomes
/// a (possibly conditional) reuse of the dead variable's cell.
///
/// The tree is consumed and reconstructed top-down; untouched subtrees
/// move through unchanged.
fn annotate_match(goal: Goal, m: &Match, condition: &ReuseCondition) -> Goal {
    let mut tags: SmallVec<[CtorTag; 2]> = SmallVec::new();
    for spec in &m.decon_specs {
        if !tags.contains(&spec.tag) {
            tags.push(spec.tag);
        }
    }
    let commit = Commit {
        decon_points: m.decon_specs.iter().map(|s| s.point).collect(),
        con_masks: m
            .con_specs
            .iter()
            .map(|c| (c.point, c.reuse_type.update_mask.clone()))
            .collect(),
        dead_var: m.dead_var(),
        tags,
        conditional: !condition.is_always(),
    };
    rewrite(goal, &commit)
}

fn rewrite(goal: Goal, commit: &Commit) -> Goal {
    let Goal { kind, reuse } = goal;
    match kind {
        GoalKind::Unify(Unify::Deconstruct {
            var,
            tag,
            args,
            point,
        }) if commit.decon_points.contains(&point) => Goal {
            kind: GoalKind::Unify(Unify::Deconstruct {
                var,
                tag,
                args,
                point,
            }),
            reuse: ReuseDecision::CellDied,
        },
        GoalKind::Unify(Unify::Construct {
            var,
            tag,
            args,
            point,
        }) if commit.con_masks.contains_key(&point) => {
            let cell = ReuseCell {
                dead_var: commit.dead_var,
                tags: commit.tags.to_vec(),
                update_mask: commit.con_masks[&point].clone(),
            };
            Goal {
                kind: GoalKind::Unify(Unify::Construct {
                    var,
                    tag,
                    args,
                    point,
                }),
                reuse: if commit.conditional {
                    ReuseDecision::PotentialReuse(cell)
                } else {
                    ReuseDecision::Reuse(cell)
                },
            }
        }
        GoalKind::Unify(u) => Goal {
            kind: GoalKind::Unify(u),
            reuse,
        },
        GoalKind::Conj(goals) => Goal {
            kind: GoalKind::Conj(goals.into_iter().map(|g| rewrite(g, commit)).collect()),
            reuse,
        },
        GoalKind::Disj(branches) => Goal {
            kind: GoalKind::Disj(branches.into_iter().map(|g| rewrite(g, commit)).collect()),
            reuse,
        },
        GoalKind::Switch { var, cases } => Goal {
            kind: GoalKind::Switch {
                var,
                cases: cases
                    .into_iter()
                    .map(|c| Case {
                        tag: c.tag,
                        goal: rewrite(c.goal, commit),
                    })
                    .collect(),
            },
            reuse,
        },
        GoalKind::Negation(inner) => Goal {
            kind: GoalKind::Negation(Box::new(rewrite(*inner, commit))),
            reuse,
        },
        GoalKind::Scope(inner) => Goal {
            kind: GoalKind::Scope(Box::new(rewrite(*inner, commit))),
            reuse,
        },
        GoalKind::IfThenElse { cond, then, els } => Goal {
            kind: GoalKind::IfThenElse {
                cond: Box::new(rewrite(*cond, commit)),
                then: Box::new(rewrite(*then, commit)),
                els: Box::new(rewrite(*els, commit)),
            },
            reuse,
        },
        kind @ (GoalKind::PlainCall { .. }
        | GoalKind::GenericCall { .. }
        | GoalKind::ForeignCall { .. }) => Goal { kind, reuse },
    }
}

#[cfg(test)]
mod tests;
