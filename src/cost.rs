//! Reuse cost model — decides whether a candidate construction can reuse
//! a candidate dead cell, and how well.
//!
//! [`compute_reuse_type`] applies the arity and strategy gates, aligns the
//! two cells' argument slots (accounting for an optional hidden secondary
//! tag slot in either cell), counts the argument positions that already
//! hold the right value, and scores the pairing. The score approximates
//! "savings from skipping allocation and already-correct fields" minus
//! "penalty for wasted oversized cells and re-tagging". Rejection is an
//! ordinary outcome (`None`), never an error.
//!
//! When one construction can satisfy several deconstructions at once
//! (a variable dying in every branch of a disjunction), the pairwise
//! results are combined with [`glb`].

use crate::goal::{CtorTag, VarId};
use crate::matching::DeconSpec;
use crate::{ReuseStrategy, TypeContext};

/// Cost of one heap allocation, per field.
pub(crate) const ALPHA: f64 = 5.0;
/// Cost of one field write.
pub(crate) const GAMMA: f64 = 1.0;
/// Cost of one tag-field write.
pub(crate) const BETA: f64 = 1.0;

/// How a construction would reuse a particular dead cell.
#[derive(Clone, Debug, PartialEq)]
pub struct ReuseType {
    /// The construction uses the same functor the dead cell was built with.
    pub same_tag: bool,
    /// `update_mask[i] == false` means argument *i* of the new cell needs
    /// no rewrite: the dead cell already holds that value in the aligned
    /// slot.
    pub update_mask: Vec<bool>,
    /// Estimated savings. Always positive for an accepted pairing.
    pub value: f64,
}

/// Evaluate reusing `dead`'s cell as storage for `new_tag(new_args)`
/// bound to `new_var`.
///
/// Succeeds only if:
///
/// - the new cell has at least one argument (zero-arity cells own no
///   storage worth saving);
/// - the new cell is no bigger than the dead one;
/// - `strategy` is satisfied: same functor, or arity difference within
///   the configured bound.
///
/// Returns `None` when any gate fails or the computed savings are not
/// positive.
pub fn compute_reuse_type(
    strategy: ReuseStrategy,
    ctx: &dyn TypeContext,
    dead: &DeconSpec,
    new_var: VarId,
    new_tag: CtorTag,
    new_args: &[VarId],
) -> Option<ReuseType> {
    let new_arity = new_args.len();
    let dead_arity = dead.args.len();

    if new_arity == 0 || new_arity > dead_arity {
        return None;
    }

    let same_tag = new_tag == dead.tag;
    match strategy {
        ReuseStrategy::SameConstructorOnly => {
            if !same_tag {
                return None;
            }
        }
        ReuseStrategy::WithinArityDifference(n) => {
            if dead_arity - new_arity > n as usize {
                return None;
            }
        }
    }

    // Slot alignment: argument i of the new cell lives at cell slot
    // i + new_off, argument j of the dead cell at slot j + dead_off,
    // where the offset is 1 when the cell carries a hidden secondary
    // tag in slot 0.
    let new_off = usize::from(ctx.has_secondary_tag(new_var, &new_tag));
    let dead_off = usize::from(ctx.has_secondary_tag(dead.var, &dead.tag));

    let mut up_to_date = 0usize;
    let mut update_mask = Vec::with_capacity(new_arity);
    for (i, &arg) in new_args.iter().enumerate() {
        let slot = i + new_off;
        let correct = slot >= dead_off
            && dead
                .args
                .get(slot - dead_off)
                .is_some_and(|&dead_arg| dead_arg == arg);
        if correct {
            up_to_date += 1;
        }
        update_mask.push(!correct);
    }

    let new_arity_f = new_arity as f64;
    let weight = (ALPHA + GAMMA) * new_arity_f + BETA
        - GAMMA * (new_arity - up_to_date) as f64
        - if same_tag { BETA } else { 0.0 }
        - ALPHA * (dead_arity - new_arity) as f64;

    if weight <= 0.0 {
        return None;
    }

    Some(ReuseType {
        same_tag,
        update_mask,
        value: weight,
    })
}

/// Greatest lower bound of a set of reuse types.
///
/// `same_tag` is the conjunction, the update masks are combined
/// position-wise (truncated to the shortest input), and the value is the
/// arithmetic mean of all inputs. Returns `None` only for an empty
/// input — callers must never pass one.
pub fn glb(reuse_types: &[ReuseType]) -> Option<ReuseType> {
    let (first, rest) = reuse_types.split_first()?;

    let mut same_tag = first.same_tag;
    let mut update_mask = first.update_mask.clone();
    for rt in rest {
        same_tag = same_tag && rt.same_tag;
        update_mask.truncate(rt.update_mask.len());
        for (slot, &needs_update) in update_mask.iter_mut().zip(rt.update_mask.iter()) {
            *slot = *slot && needs_update;
        }
    }

    let value = reuse_types.iter().map(|rt| rt.value).sum::<f64>() / reuse_types.len() as f64;

    Some(ReuseType {
        same_tag,
        update_mask,
        value,
    })
}
