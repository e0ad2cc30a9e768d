use crate::context::{Context, FeatureId, OwnerId};
use crate::grammar::Rule;

use super::{Accumulator, DpState, FeatureFunction, FeatureVector, Transition};

/// Default per-word value: −log10(e), so a unit weight charges one nat.
pub const DEFAULT_WORD_PENALTY: f32 = -std::f32::consts::LOG10_E;

/// Fires `value × (number of target words)` for each rule.
pub struct WordPenalty {
    id: FeatureId,
    value: f32,
}

impl WordPenalty {
    pub fn new(ctx: &Context, value: f32) -> Self {
        Self {
            id: ctx.features.id("WordPenalty"),
            value,
        }
    }

    fn fire(&self, rule: &Rule, acc: &mut dyn Accumulator) {
        let words = rule.target_word_count();
        if words > 0 {
            acc.add(self.id, self.value * words as f32);
        }
    }
}

impl FeatureFunction for WordPenalty {
    fn name(&self) -> &str {
        "WordPenalty"
    }

    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32 {
        weights.get(self.id) * self.value * rule.target_word_count() as f32
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        self.fire(t.rule, acc);
        None
    }
}

/// Penalises rules injected for unknown words.
pub struct OovPenalty {
    id: FeatureId,
    value: f32,
}

impl OovPenalty {
    pub const DEFAULT_VALUE: f32 = -100.0;

    pub fn new(ctx: &Context, value: f32) -> Self {
        Self {
            id: ctx.features.id("OOVPenalty"),
            value,
        }
    }
}

impl FeatureFunction for OovPenalty {
    fn name(&self) -> &str {
        "OOVPenalty"
    }

    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32 {
        if rule.owner() == OwnerId::OOV {
            weights.get(self.id) * self.value
        } else {
            0.0
        }
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        if t.rule.owner() == OwnerId::OOV {
            acc.add(self.id, self.value);
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
    fn word_penalty_skips_boundaries() {
        let ctx = Context::new();
        let wp = WordPenalty::new(&ctx, -1.0);
        let rule = parse_rule("[GOAL] ||| <s> a ||| <s> x y", &ctx, OwnerId::GLUE).unwrap();
        let sentence = sentence(&ctx, "a");
        let mut acc = FeatureAccumulator::new();
        wp.compute(&leaf_transition(&rule, &sentence, 0, 2), &mut acc);
        assert_eq!(acc.into_features().get(ctx.features.id("WordPenalty")), -2.0);
    }

    #[test]
    fn oov_penalty_only_for_oov_owner() {
        let ctx = Context::new();
        let oov = OovPenalty::new(&ctx, OovPenalty::DEFAULT_VALUE);
        let weights = FeatureVector::from_named(&ctx.features, [("OOVPenalty", 1.0)]);
        let pt = ctx.owners.id("pt");
        let normal = parse_rule("[X] ||| a ||| x", &ctx, pt).unwrap();
        let unknown = parse_rule("[X] ||| a ||| a", &ctx, OwnerId::OOV).unwrap();
        assert_eq!(oov.estimate_cost(&normal, &weights), 0.0);
        assert_eq!(oov.estimate_cost(&unknown, &weights), -100.0);
    }
}
