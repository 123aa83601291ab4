use pretty_assertions::assert_eq;

use crate::dead_cells::{DeadCellTable, ReuseCondition};
use crate::goal::ReuseDecision;
use crate::select::select_reuses;
use crate::test_helpers::{
    always_dead, conditional, conj, construct, decision_at, deconstruct, pp, tag, NoSecTags,
};
use crate::ReuseStrategy;

/// One pair: the deconstruction is marked dead, the construction reuses
/// its cell unconditionally, and the dead-cell entry is consumed.
#[test]
fn commits_unconditional_pair() {
    let t = tag(10, 2);
    let goal = conj(vec![
        deconstruct(1, t, &[2, 3], 0),
        construct(5, t, &[6, 7], 1),
    ]);
    let mut dead = always_dead(&[0]);

    let (goal, condition) = select_reuses(
        goal,
        &mut dead,
        ReuseStrategy::SameConstructorOnly,
        &NoSecTags,
    );

    assert_eq!(condition, ReuseCondition::Always);
    assert_eq!(decision_at(&goal, 0), ReuseDecision::CellDied);
    match decision_at(&goal, 1) {
        ReuseDecision::Reuse(cell) => {
            assert_eq!(cell.dead_var.raw(), 1);
            assert_eq!(cell.tags, vec![t]);
            assert_eq!(cell.update_mask, vec![true, true]);
        }
        other => panic!("expected unconditional reuse, got {other:?}"),
    }

    // Idempotent removal: the committed point is gone from the table.
    assert!(dead.lookup(pp(0)).is_none());
    assert!(dead.is_empty());
}

/// A conditionally dead cell yields a potential reuse and surfaces its
/// obligations in the accumulated condition.
#[test]
fn commits_conditional_pair() {
    let t = tag(10, 2);
    let goal = conj(vec![
        deconstruct(1, t, &[2, 3], 0),
        construct(5, t, &[6, 7], 1),
    ]);
    let mut dead = DeadCellTable::from_entries([(pp(0), conditional(&[7]))]);

    let (goal, condition) = select_reuses(
        goal,
        &mut dead,
        ReuseStrategy::SameConstructorOnly,
        &NoSecTags,
    );

    assert_eq!(condition, conditional(&[7]));
    assert_eq!(decision_at(&goal, 0), ReuseDecision::CellDied);
    assert!(matches!(
        decision_at(&goal, 1),
        ReuseDecision::PotentialReuse(_)
    ));
}

/// Two dead cells and two constructions resolve over two rounds: each
/// round commits one match and shrinks the dead-cell table.
#[test]
fn resolves_competing_matches_over_rounds() {
    let t = tag(10, 2);
    let goal = conj(vec![
        deconstruct(1, t, &[2, 3], 0),
        deconstruct(4, t, &[5, 6], 1),
        construct(7, t, &[8, 9], 2),
        construct(10, t, &[11, 12], 3),
    ]);
    let mut dead = always_dead(&[0, 1]);

    let (goal, condition) = select_reuses(
        goal,
        &mut dead,
        ReuseStrategy::SameConstructorOnly,
        &NoSecTags,
    );

    assert_eq!(condition, ReuseCondition::Always);
    assert!(dead.is_empty());
    assert_eq!(decision_at(&goal, 0), ReuseDecision::CellDied);
    assert_eq!(decision_at(&goal, 1), ReuseDecision::CellDied);
    assert!(matches!(decision_at(&goal, 2), ReuseDecision::Reuse(_)));
    assert!(matches!(decision_at(&goal, 3), ReuseDecision::Reuse(_)));
}

/// Obligations accumulate across rounds: the procedure-wide condition is
/// the union of every committed match's condition.
#[test]
fn accumulates_conditions_across_rounds() {
    let t = tag(10, 2);
    let goal = conj(vec![
        deconstruct(1, t, &[2, 3], 0),
        deconstruct(4, t, &[5, 6], 1),
        construct(7, t, &[8, 9], 2),
        construct(10, t, &[11, 12], 3),
    ]);
    let mut dead =
        DeadCellTable::from_entries([(pp(0), conditional(&[1])), (pp(1), conditional(&[2]))]);

    let (_, condition) = select_reuses(
        goal,
        &mut dead,
        ReuseStrategy::SameConstructorOnly,
        &NoSecTags,
    );
    assert_eq!(condition, conditional(&[1, 2]));
}

/// When constructions run out, unmatched dead cells survive in the
/// table for the cell-caching fallback.
#[test]
fn unmatched_cells_stay_in_table() {
    let t = tag(10, 2);
    let goal = conj(vec![
        deconstruct(1, t, &[2, 3], 0),
        deconstruct(4, t, &[5, 6], 1),
        construct(7, t, &[8, 9], 2),
    ]);
    let mut dead = always_dead(&[0, 1]);

    let (goal, _) = select_reuses(
        goal,
        &mut dead,
        ReuseStrategy::SameConstructorOnly,
        &NoSecTags,
    );

    // Var 1 sorts first and wins the only construction.
    assert_eq!(decision_at(&goal, 0), ReuseDecision::CellDied);
    assert!(matches!(decision_at(&goal, 2), ReuseDecision::Reuse(_)));
    // Var 4's cell found nothing; its entry remains.
    assert_eq!(decision_at(&goal, 1), ReuseDecision::Undecided);
    assert_eq!(dead.len(), 1);
    assert!(dead.lookup(pp(1)).is_some());
}

/// No candidates at all: the loop exits immediately and touches
/// nothing.
#[test]
fn no_candidates_is_a_fixed_point() {
    let t = tag(10, 2);
    let goal = conj(vec![deconstruct(1, t, &[2, 3], 0)]);
    let mut dead = always_dead(&[0]);

    let (goal, condition) = select_reuses(
        goal,
        &mut dead,
        ReuseStrategy::SameConstructorOnly,
        &NoSecTags,
    );

    assert_eq!(condition, ReuseCondition::Always);
    assert_eq!(decision_at(&goal, 0), ReuseDecision::Undecided);
    assert_eq!(dead.len(), 1);
}
