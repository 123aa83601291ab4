//! Match-table builder — pairs live dead-cell sites with feasible
//! downstream construction sites, once per selection round.
//!
//! The traversal threads an explicit **continuation**: the list of sibling
//! goals that execute after the current node, in program order. A
//! deconstruction found in the dead-cell table opens a [`Match`] and
//! evaluates it against its continuation; each construction the
//! continuation can reach is scored by the cost model and folded into the
//! match.
//!
//! Branching is handled conservatively:
//!
//! - disjunction/switch branches are scanned with an *empty* continuation
//!   (a branch-local death may only pair with a branch-local construction);
//! - a variable dying in *every* branch is promoted to a joint match over
//!   the real continuation after the branched goal, since it is dead
//!   however control left;
//! - nothing inside a negation is visible outside it, so negated goals
//!   are scanned in isolation and propagate no deaths.
//!
//! Within one conjunction a dead cell can be consumed by at most one
//! descendant, so sibling outcomes compete (max value); disjunction arms
//! are mutually exclusive at run time, so their outcomes are averaged.
//!
//! The table is rebuilt from scratch every round — recomputing is cheaper
//! and simpler than invalidation tracking, and the round count is bounded
//! by the dead-cell table size.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::cost::{compute_reuse_type, glb, ReuseType};
use crate::dead_cells::{DeadCellTable, ReuseCondition};
use crate::goal::{CtorTag, Goal, GoalKind, ProgramPoint, ReuseDecision, Unify, VarId};
use crate::{ReuseStrategy, TypeContext};

// ── Candidate specs ─────────────────────────────────────────────────

/// A deconstruction whose cell the dead-cell table declares dead.
#[derive(Clone, Debug, PartialEq)]
pub struct DeconSpec {
    /// The dying variable.
    pub var: VarId,
    pub point: ProgramPoint,
    /// The functor the cell was built with.
    pub tag: CtorTag,
    /// The cell's argument variables.
    pub args: Vec<VarId>,
    /// Condition under which the cell is dead (from the dead-cell table).
    pub condition: ReuseCondition,
}

/// A construction that can reuse the match's dead cell.
#[derive(Clone, Debug, PartialEq)]
pub struct ConSpec {
    pub point: ProgramPoint,
    /// Combined reuse type against every deconstruction in the match.
    pub reuse_type: ReuseType,
}

// ── Matches ─────────────────────────────────────────────────────────

/// One candidate assignment: the deconstruction site(s) of a single dead
/// variable paired with the construction sites that can reuse its cell.
///
/// `degree` counts the construction candidates folded in across all
/// evaluated alternatives; it feeds the selector's tie-break only, never
/// the value.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    /// Non-empty; every spec refers to the same dead variable.
    pub decon_specs: SmallVec<[DeconSpec; 1]>,
    pub con_specs: Vec<ConSpec>,
    /// Mean of the con specs' reuse values; 0.0 while none were found.
    pub value: f64,
    pub degree: u32,
}

impl Match {
    /// Open a match for a single deconstruction.
    pub fn for_decon(spec: DeconSpec) -> Self {
        Match {
            decon_specs: smallvec![spec],
            con_specs: Vec::new(),
            value: 0.0,
            degree: 0,
        }
    }

    /// Open a joint match over several deconstructions of the same
    /// variable (one per branch of a disjunction).
    pub fn from_specs(specs: SmallVec<[DeconSpec; 1]>) -> Self {
        let Some(first) = specs.first() else {
            unreachable!("match with no deconstruction specs");
        };
        debug_assert!(
            specs.iter().all(|s| s.var == first.var),
            "match mixes deconstructions of different variables"
        );
        Match {
            decon_specs: specs,
            con_specs: Vec::new(),
            value: 0.0,
            degree: 0,
        }
    }

    /// The one dead variable all deconstruction specs refer to.
    pub fn dead_var(&self) -> VarId {
        let Some(first) = self.decon_specs.first() else {
            unreachable!("match with no deconstruction specs");
        };
        first.var
    }

    /// Fold in a construction candidate: the value becomes the mean of
    /// all con specs' reuse values, and the degree grows by one.
    pub fn add_con_spec(&mut self, spec: ConSpec) {
        self.con_specs.push(spec);
        self.degree += 1;
        self.value = self.con_specs.iter().map(|c| c.reuse_type.value).sum::<f64>()
            / self.con_specs.len() as f64;
    }

    /// Least upper bound of the deconstructions' reuse conditions.
    pub fn condition(&self) -> ReuseCondition {
        self.decon_specs
            .iter()
            .fold(ReuseCondition::Always, |acc, s| acc.lub(&s.condition))
    }

    /// Selection key: value per construction candidate. A zero value is
    /// ratio 0 regardless of degree.
    pub fn ratio(&self) -> f64 {
        if self.value == 0.0 {
            0.0
        } else {
            self.value / f64::from(self.degree.max(1))
        }
    }
}

/// Average the outcomes of mutually exclusive branches: mean of values,
/// sum of degrees, concatenated con specs. The decon specs are shared by
/// every input (all branches grew from the same base match).
///
/// Passing an empty list is an internal invariant violation.
pub fn average_match(matches: &[Match]) -> Match {
    let Some(first) = matches.first() else {
        unreachable!("average_match: empty match list");
    };
    let value = matches.iter().map(|m| m.value).sum::<f64>() / matches.len() as f64;
    let degree = matches.iter().map(|m| m.degree).sum();
    let con_specs = matches.iter().flat_map(|m| m.con_specs.clone()).collect();
    Match {
        decon_specs: first.decon_specs.clone(),
        con_specs,
        value,
        degree,
    }
}

// ── Match table ─────────────────────────────────────────────────────

/// Candidate matches per dead variable. Ordered by variable so the
/// selector's tie-break by table order is deterministic.
#[derive(Clone, Debug, Default)]
pub struct MatchTable {
    matches: BTreeMap<VarId, Vec<Match>>,
}

impl MatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, m: Match) {
        self.matches.entry(m.dead_var()).or_default().push(m);
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Total number of candidate matches.
    pub fn len(&self) -> usize {
        self.matches.values().map(Vec::len).sum()
    }

    /// All matches in table order (variable order, then insertion order).
    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.values().flatten()
    }

    /// The match with the highest value/degree ratio; ties go to the
    /// earliest match in table order.
    pub fn highest_ratio_match(&self) -> Option<&Match> {
        let mut best: Option<&Match> = None;
        for m in self.iter() {
            if best.is_none_or(|b| m.ratio() > b.ratio()) {
                best = Some(m);
            }
        }
        best
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Sibling goals executing after the current node, in program order.
type Continuation<'g> = SmallVec<[&'g Goal; 4]>;

/// Dead variables discovered in a subtree, with every deconstruction
/// spec seen for each. Only deaths guaranteed on *all* paths through the
/// subtree are propagated (see disjunction handling).
type DeadVarMap = FxHashMap<VarId, Vec<DeconSpec>>;

/// Build the match table for one round: every live dead-cell site paired
/// with the construction sites its continuation can reach.
pub fn compute_match_table(
    dead_cells: &DeadCellTable,
    strategy: ReuseStrategy,
    ctx: &dyn TypeContext,
    goal: &Goal,
) -> MatchTable {
    let mut builder = Builder {
        dead_cells,
        strategy,
        ctx,
        table: MatchTable::new(),
    };
    builder.scan_goal(goal, &[]);
    tracing::debug!(
        dead_cells = dead_cells.len(),
        candidates = builder.table.len(),
        "match table built"
    );
    builder.table
}

struct Builder<'a> {
    dead_cells: &'a DeadCellTable,
    strategy: ReuseStrategy,
    ctx: &'a dyn TypeContext,
    table: MatchTable,
}

impl Builder<'_> {
    /// Scan one goal against its continuation, recording any matches
    /// found, and return the dead variables this subtree kills on every
    /// path through it.
    fn scan_goal<'g>(&mut self, goal: &'g Goal, cont: &[&'g Goal]) -> DeadVarMap {
        match &goal.kind {
            GoalKind::Unify(Unify::Deconstruct {
                var,
                tag,
                args,
                point,
            }) => {
                let Some(condition) = self.dead_cells.lookup(*point) else {
                    return DeadVarMap::default();
                };
                let spec = DeconSpec {
                    var: *var,
                    point: *point,
                    tag: *tag,
                    args: args.clone(),
                    condition: condition.clone(),
                };
                let m = self.find_best_match_in_conjunction(cont, Match::for_decon(spec.clone()));
                if !m.con_specs.is_empty() {
                    self.table.add(m);
                }
                let mut dead = DeadVarMap::default();
                dead.insert(*var, vec![spec]);
                dead
            }
            GoalKind::Unify(_) => DeadVarMap::default(),
            GoalKind::Conj(goals) => {
                let refs: Continuation<'g> = goals.iter().collect();
                self.scan_seq(&refs, cont)
            }
            GoalKind::Disj(branches) => {
                let arms: Vec<SmallVec<[&'g Goal; 2]>> =
                    branches.iter().map(|g| smallvec![g]).collect();
                self.scan_branches(&arms, cont)
            }
            GoalKind::Switch { cases, .. } => {
                let arms: Vec<SmallVec<[&'g Goal; 2]>> =
                    cases.iter().map(|c| smallvec![&c.goal]).collect();
                self.scan_branches(&arms, cont)
            }
            GoalKind::Negation(inner) => {
                // Results inside a negation are never visible outside:
                // scan in isolation and propagate no deaths.
                self.scan_goal(inner, &[]);
                DeadVarMap::default()
            }
            GoalKind::Scope(inner) => self.scan_goal(inner, cont),
            GoalKind::IfThenElse { cond, then, els } => {
                let arms: Vec<SmallVec<[&'g Goal; 2]>> =
                    vec![smallvec![&**cond, &**then], smallvec![&**els]];
                self.scan_branches(&arms, cont)
            }
            GoalKind::PlainCall { .. }
            | GoalKind::GenericCall { .. }
            | GoalKind::ForeignCall { .. } => DeadVarMap::default(),
        }
    }

    /// Scan a sequence of goals executing in order. Goal *i*'s
    /// continuation is its later siblings followed by the outer
    /// continuation.
    fn scan_seq<'g>(&mut self, goals: &[&'g Goal], cont: &[&'g Goal]) -> DeadVarMap {
        let mut dead = DeadVarMap::default();
        for (i, goal) in goals.iter().enumerate() {
            let mut inner: Continuation<'g> = goals[i + 1..].iter().copied().collect();
            inner.extend_from_slice(cont);
            merge_dead_vars(&mut dead, self.scan_goal(goal, &inner));
        }
        dead
    }

    /// Scan mutually exclusive branches (disjunction, switch, the two
    /// arms of an if-then-else).
    ///
    /// Each branch is scanned with an empty continuation. A variable
    /// dying in every branch is dead however control leaves, so a joint
    /// match over all its branch deconstructions is evaluated against the
    /// real continuation; only those common deaths propagate upward.
    fn scan_branches<'g>(
        &mut self,
        branches: &[SmallVec<[&'g Goal; 2]>],
        cont: &[&'g Goal],
    ) -> DeadVarMap {
        let maps: Vec<DeadVarMap> = branches
            .iter()
            .map(|arm| self.scan_seq(arm, &[]))
            .collect();

        let Some((first, rest)) = maps.split_first() else {
            return DeadVarMap::default();
        };

        let mut common_vars: Vec<VarId> = first
            .keys()
            .filter(|var| rest.iter().all(|m| m.contains_key(var)))
            .copied()
            .collect();
        common_vars.sort_unstable();

        let mut dead = DeadVarMap::default();
        for var in common_vars {
            let specs: SmallVec<[DeconSpec; 1]> = maps
                .iter()
                .flat_map(|m| m[&var].iter().cloned())
                .collect();
            dead.insert(var, specs.to_vec());

            let joint = self.find_best_match_in_conjunction(cont, Match::from_specs(specs));
            if !joint.con_specs.is_empty() {
                self.table.add(joint);
            }
        }
        dead
    }

    /// Evaluate the match independently against each direct next goal —
    /// within one conjunction a dead cell is consumed by at most one
    /// descendant — and keep the highest-value outcome. The degree
    /// becomes the sum of degrees across all evaluated alternatives.
    fn find_best_match_in_conjunction(&self, cont: &[&Goal], m: Match) -> Match {
        if cont.is_empty() {
            return m;
        }
        let results: Vec<Match> = cont
            .iter()
            .map(|goal| self.find_match_in_goal(goal, m.clone()))
            .collect();
        let degree = results.iter().map(|r| r.degree).sum();

        let mut best = m;
        for r in results {
            if r.value > best.value {
                best = r;
            }
        }
        best.degree = degree;
        best
    }

    /// Grow the match with whatever this goal can contribute.
    fn find_match_in_goal(&self, goal: &Goal, m: Match) -> Match {
        match &goal.kind {
            GoalKind::Unify(Unify::Construct {
                var,
                tag,
                args,
                point,
            }) if goal.reuse == ReuseDecision::Undecided => {
                self.verify_match(m, *var, *tag, args, *point)
            }
            // Annotated constructions are already claimed; other
            // unifications neither construct nor deconstruct.
            GoalKind::Unify(_) => m,
            GoalKind::Conj(goals) => {
                let refs: Continuation<'_> = goals.iter().collect();
                self.find_best_match_in_conjunction(&refs, m)
            }
            GoalKind::Disj(branches) => {
                if branches.is_empty() {
                    return m;
                }
                let results: Vec<Match> = branches
                    .iter()
                    .map(|b| self.find_match_in_goal(b, m.clone()))
                    .collect();
                average_match(&results)
            }
            GoalKind::Switch { cases, .. } => {
                if cases.is_empty() {
                    return m;
                }
                let results: Vec<Match> = cases
                    .iter()
                    .map(|c| self.find_match_in_goal(&c.goal, m.clone()))
                    .collect();
                average_match(&results)
            }
            GoalKind::Negation(_) => m,
            GoalKind::Scope(inner) => self.find_match_in_goal(inner, m),
            GoalKind::IfThenElse { cond, then, els } => {
                let then_arm =
                    self.find_best_match_in_conjunction(&[&**cond, &**then], m.clone());
                let else_arm = self.find_match_in_goal(els, m);
                average_match(&[then_arm, else_arm])
            }
            GoalKind::PlainCall { .. }
            | GoalKind::GenericCall { .. }
            | GoalKind::ForeignCall { .. } => m,
        }
    }

    /// Score the construction against every open deconstruction spec.
    /// All must accept; the combined reuse type is their glb. On any
    /// rejection the match is returned unchanged.
    fn verify_match(
        &self,
        mut m: Match,
        var: VarId,
        tag: CtorTag,
        args: &[VarId],
        point: ProgramPoint,
    ) -> Match {
        let mut reuse_types: SmallVec<[ReuseType; 1]> =
            SmallVec::with_capacity(m.decon_specs.len());
        for spec in &m.decon_specs {
            match compute_reuse_type(self.strategy, self.ctx, spec, var, tag, args) {
                Some(rt) => reuse_types.push(rt),
                None => return m,
            }
        }
        let Some(reuse_type) = glb(&reuse_types) else {
            unreachable!("match with no deconstruction specs");
        };
        m.add_con_spec(ConSpec { point, reuse_type });
        m
    }
}

fn merge_dead_vars(dst: &mut DeadVarMap, src: DeadVarMap) {
    for (var, mut specs) in src {
        dst.entry(var).or_default().append(&mut specs);
    }
}
