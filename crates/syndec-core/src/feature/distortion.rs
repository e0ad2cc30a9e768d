use crate::context::{Context, FeatureId, OwnerId};
use crate::grammar::Rule;

use super::{Accumulator, DpState, FeatureFunction, FeatureVector, Transition};

/// Jump distance between consecutive phrases: `-|last_end - new_begin|`.
///
/// Fires on binary glue applications joining a hypothesis (the tail sharing
/// the rule's left-hand side) with a phrase. Contiguous chart glue always
/// scores zero.
pub struct Distortion {
    id: FeatureId,
}

impl Distortion {
    pub fn new(ctx: &Context) -> Self {
        Self {
            id: ctx.features.id("Distortion"),
        }
    }
}

impl FeatureFunction for Distortion {
    fn name(&self) -> &str {
        "Distortion"
    }

    fn estimate_cost(&self, _rule: &Rule, _weights: &FeatureVector) -> f32 {
        0.0
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        if t.rule.owner() != OwnerId::GLUE || t.tails.len() != 2 {
            return None;
        }
        let lhs = t.rule.lhs();
        let (hyp, phrase) = if t.tails[0].lhs == lhs {
            (t.tails[0], t.tails[1])
        } else {
            (t.tails[1], t.tails[0])
        };
        let jump = hyp.j.abs_diff(phrase.i);
        acc.add(self.id, -(jump as f32));
        None
    }
}
