use crate::context::FeatureId;

use super::vector::FeatureVector;

/// Sink that feature functions report their contributions into.
///
/// The same `compute` call feeds either a running weighted score (search)
/// or a full feature vector (n-best output), so features never need to know
/// which one they are talking to.
pub trait Accumulator {
    fn add(&mut self, feature: FeatureId, value: f32);
}

/// Folds contributions into one weighted score.
pub struct ScoreAccumulator<'w> {
    weights: &'w FeatureVector,
    score: f32,
}

impl<'w> ScoreAccumulator<'w> {
    pub fn new(weights: &'w FeatureVector) -> Self {
        Self {
            weights,
            score: 0.0,
        }
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

impl Accumulator for ScoreAccumulator<'_> {
    #[inline]
    fn add(&mut self, feature: FeatureId, value: f32) {
        self.score += value * self.weights.get(feature);
    }
}

/// Collects the raw, unweighted feature values.
#[derive(Default)]
pub struct FeatureAccumulator {
    features: FeatureVector,
}

impl FeatureAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_features(self) -> FeatureVector {
        self.features
    }
}

impl Accumulator for FeatureAccumulator {
    #[inline]
    fn add(&mut self, feature: FeatureId, value: f32) {
        self.features.add(feature, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn score_and_feature_accumulators_agree() {
        let ctx = Context::new();
        let a = ctx.features.id("a");
        let b = ctx.features.id("b");
        let weights = FeatureVector::from_named(&ctx.features, [("a", 2.0), ("b", -1.0)]);

        let mut score = ScoreAccumulator::new(&weights);
        let mut feats = FeatureAccumulator::new();
        let feed = |acc: &mut dyn Accumulator| {
            acc.add(a, 1.5);
            acc.add(b, 4.0);
            acc.add(a, 0.5);
        };
        feed(&mut score);
        feed(&mut feats);
        let feats = feats.into_features();
        assert!((score.score() - feats.dot(&weights)).abs() < 1e-6);
        assert_eq!(feats.get(a), 2.0);
    }
}
