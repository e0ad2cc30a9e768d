use crate::context::{Context, FeatureId, OwnerId};
use crate::grammar::Rule;

use super::{Accumulator, DpState, FeatureFunction, FeatureVector, Transition};

/// Passes the scores stored on a grammar's rules through to the model.
pub struct PhraseModel {
    name: String,
    owner: OwnerId,
}

impl PhraseModel {
    pub fn new(ctx: &Context, owner: &str) -> Self {
        Self {
            name: format!("PhraseModel_{owner}"),
            owner: ctx.owners.id(owner),
        }
    }
}

impl FeatureFunction for PhraseModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32 {
        if rule.owner() == self.owner {
            rule.features().dot(weights)
        } else {
            0.0
        }
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        if t.rule.owner() == self.owner {
            for (id, value) in t.rule.features().iter() {
                acc.add(id, value);
            }
        }
        None
    }
}

/// Counts rule applications of one owner.
pub struct PhrasePenalty {
    name: String,
    id: FeatureId,
    owner: OwnerId,
}

impl PhrasePenalty {
    pub fn new(ctx: &Context, owner: &str) -> Self {
        let name = format!("PhrasePenalty_{owner}");
        Self {
            id: ctx.features.id(&name),
            name,
            owner: ctx.owners.id(owner),
        }
    }
}

impl FeatureFunction for PhrasePenalty {
    fn name(&self) -> &str {
        &self.name
    }

    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32 {
        if rule.owner() == self.owner {
            weights.get(self.id)
        } else {
            0.0
        }
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        if t.rule.owner() == self.owner {
            acc.add(self.id, 1.0);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureAccumulator;
    use crate::grammar::parse_rule;
    use crate::testutil::{leaf_transition, sentence};

    #[test]
    fn phrase_model_copies_rule_scores_for_its_owner() {
        let ctx = Context::new();
        let pm = PhraseModel::new(&ctx, "pt");
        let pt = ctx.owners.id("pt");
        let other = ctx.owners.id("other");
        let mine = parse_rule("[X] ||| a ||| x ||| -1 -2", &ctx, pt).unwrap();
        let theirs = parse_rule("[X] ||| a ||| x ||| -1 -2", &ctx, other).unwrap();
        let sentence = sentence(&ctx, "a");

        let mut acc = FeatureAccumulator::new();
        pm.compute(&leaf_transition(&mine, &sentence, 0, 1), &mut acc);
        let f = acc.into_features();
        assert_eq!(f.get(ctx.features.id("tm_pt_1")), -2.0);

        let mut acc = FeatureAccumulator::new();
        pm.compute(&leaf_transition(&theirs, &sentence, 0, 1), &mut acc);
        assert!(acc.into_features().is_empty());

        let weights = FeatureVector::from_named(&ctx.features, [("tm_pt_0", 1.0), ("tm_pt_1", 0.5)]);
        assert_eq!(pm.estimate_cost(&mine, &weights), -2.0);
    }

    #[test]
    fn phrase_penalty_counts() {
        let ctx = Context::new();
        let pp = PhrasePenalty::new(&ctx, "pt");
        let pt = ctx.owners.id("pt");
        let rule = parse_rule("[X] ||| a ||| x", &ctx, pt).unwrap();
        let sentence = sentence(&ctx, "a");
        let mut acc = FeatureAccumulator::new();
        pp.compute(&leaf_transition(&rule, &sentence, 0, 1), &mut acc);
        assert_eq!(acc.into_features().get(ctx.features.id("PhrasePenalty_pt")), 1.0);
    }
}
