//! Shared test utilities for the reuse analysis.
//!
//! Consolidates goal-tree and table factories used across the `goal`,
//! `dead_cells`, `cost`, `matching`, `select`, and `cache` tests. Only
//! compiled in test builds.

use std::collections::BTreeSet;

use crate::dead_cells::{DeadCellTable, Obligation, ReuseCondition};
use crate::goal::{Case, CtorName, CtorTag, Goal, GoalKind, ProgramPoint, Unify, VarId};
use crate::matching::DeconSpec;
use crate::TypeContext;

/// Shorthand for `VarId::new(n)`.
pub(crate) fn v(n: u32) -> VarId {
    VarId::new(n)
}

/// Shorthand for `ProgramPoint::new(n)`.
pub(crate) fn pp(n: u32) -> ProgramPoint {
    ProgramPoint::new(n)
}

/// Constructor tag with an interned name and arity.
pub(crate) fn tag(name: u32, arity: u32) -> CtorTag {
    CtorTag {
        name: CtorName::new(name),
        arity,
    }
}

pub(crate) fn construct(var: u32, t: CtorTag, args: &[u32], point: u32) -> Goal {
    Goal::new(GoalKind::Unify(Unify::Construct {
        var: v(var),
        tag: t,
        args: args.iter().map(|&a| v(a)).collect(),
        point: pp(point),
    }))
}

pub(crate) fn deconstruct(var: u32, t: CtorTag, args: &[u32], point: u32) -> Goal {
    Goal::new(GoalKind::Unify(Unify::Deconstruct {
        var: v(var),
        tag: t,
        args: args.iter().map(|&a| v(a)).collect(),
        point: pp(point),
    }))
}

pub(crate) fn conj(goals: Vec<Goal>) -> Goal {
    Goal::new(GoalKind::Conj(goals))
}

pub(crate) fn disj(branches: Vec<Goal>) -> Goal {
    Goal::new(GoalKind::Disj(branches))
}

pub(crate) fn switch(var: u32, cases: Vec<(CtorTag, Goal)>) -> Goal {
    Goal::new(GoalKind::Switch {
        var: v(var),
        cases: cases
            .into_iter()
            .map(|(t, goal)| Case { tag: t, goal })
            .collect(),
    })
}

pub(crate) fn negation(goal: Goal) -> Goal {
    Goal::new(GoalKind::Negation(Box::new(goal)))
}

pub(crate) fn scope(goal: Goal) -> Goal {
    Goal::new(GoalKind::Scope(Box::new(goal)))
}

pub(crate) fn ite(cond: Goal, then: Goal, els: Goal) -> Goal {
    Goal::new(GoalKind::IfThenElse {
        cond: Box::new(cond),
        then: Box::new(then),
        els: Box::new(els),
    })
}

pub(crate) fn plain_call(args: &[u32]) -> Goal {
    Goal::new(GoalKind::PlainCall {
        args: args.iter().map(|&a| v(a)).collect(),
    })
}

/// Condition carrying the given obligation tokens.
pub(crate) fn conditional(obligations: &[u32]) -> ReuseCondition {
    ReuseCondition::Conditional(
        obligations
            .iter()
            .map(|&o| Obligation::new(o))
            .collect::<BTreeSet<_>>(),
    )
}

/// Table in which every listed point is unconditionally dead.
pub(crate) fn always_dead(points: &[u32]) -> DeadCellTable {
    DeadCellTable::from_entries(points.iter().map(|&p| (pp(p), ReuseCondition::Always)))
}

/// Deconstruction spec with an `Always` condition, for cost-model tests.
pub(crate) fn decon_spec(var: u32, t: CtorTag, args: &[u32], point: u32) -> DeconSpec {
    DeconSpec {
        var: v(var),
        point: pp(point),
        tag: t,
        args: args.iter().map(|&a| v(a)).collect(),
        condition: ReuseCondition::Always,
    }
}

/// The decision recorded at the construct/deconstruct site with this
/// program point.
pub(crate) fn decision_at(goal: &Goal, point: u32) -> crate::goal::ReuseDecision {
    let mut found = None;
    goal.for_each_unify(&mut |u, d| {
        let p = match u {
            Unify::Construct { point, .. } | Unify::Deconstruct { point, .. } => *point,
            Unify::Assign { .. } | Unify::SimpleTest { .. } => return,
        };
        if p == pp(point) {
            found = Some(d.clone());
        }
    });
    found.expect("no construct/deconstruct at that program point")
}

/// Type context in which no cell has a hidden secondary tag.
pub(crate) struct NoSecTags;

impl TypeContext for NoSecTags {
    fn has_secondary_tag(&self, _var: VarId, _tag: &CtorTag) -> bool {
        false
    }
}

/// Type context with an explicit list of `(var, ctor name)` pairs whose
/// cells carry a secondary tag.
pub(crate) struct SecTagsFor(pub Vec<(u32, u32)>);

impl TypeContext for SecTagsFor {
    fn has_secondary_tag(&self, var: VarId, tag: &CtorTag) -> bool {
        self.0.contains(&(var.raw(), tag.name.raw()))
    }
}
