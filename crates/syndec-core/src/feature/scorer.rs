use crate::grammar::Rule;
use crate::hypergraph::HGNode;
use crate::sentence::Sentence;

use super::{
    Accumulator, FeatureAccumulator, FeatureFunction, FeatureVector, ScoreAccumulator,
    StateTuple, Transition,
};

/// Outcome of scoring one hyperedge application.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Weighted score added by this edge alone.
    pub transition: f32,
    /// Best derivation score through this edge: tails' scores + transition.
    pub viterbi: f32,
    /// Heuristic estimate of score still to come; prioritisation only.
    pub future: f32,
    pub states: StateTuple,
}

impl NodeResult {
    #[inline]
    pub fn pruning_estimate(&self) -> f32 {
        self.viterbi + self.future
    }
}

/// The configured features and their weights.
pub struct FeatureSet {
    features: Vec<Box<dyn FeatureFunction>>,
    weights: FeatureVector,
    num_slots: usize,
}

impl FeatureSet {
    /// Takes ownership of `features` and assigns state slots to the stateful
    /// ones in list order.
    pub fn new(mut features: Vec<Box<dyn FeatureFunction>>, weights: FeatureVector) -> Self {
        let mut num_slots = 0;
        for f in features.iter_mut() {
            if f.is_stateful() {
                f.bind_state_slot(num_slots);
                num_slots += 1;
            }
        }
        Self {
            features,
            weights,
            num_slots,
        }
    }

    pub fn weights(&self) -> &FeatureVector {
        &self.weights
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn num_state_slots(&self) -> usize {
        self.num_slots
    }

    /// Memoised Σ estimate_cost over all features.
    pub fn estimate_rule(&self, rule: &Rule) -> f32 {
        rule.estimated_cost_or_init(|| {
            self.features
                .iter()
                .map(|f| f.estimate_cost(rule, &self.weights))
                .sum()
        })
    }

    fn run(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> (StateTuple, f32) {
        let mut slots = vec![None; self.num_slots];
        let mut future = 0.0;
        let mut slot = 0;
        for f in &self.features {
            let state = f.compute(t, acc);
            if f.is_stateful() {
                future += f.estimate_future_cost(t.rule, state.as_ref(), &self.weights);
                slots[slot] = state;
                slot += 1;
            }
        }
        (StateTuple::from_slots(slots), future)
    }

    pub fn compute(&self, t: &Transition<'_>) -> NodeResult {
        let mut acc = ScoreAccumulator::new(&self.weights);
        let (states, future) = self.run(t, &mut acc);
        let transition = acc.score();
        let inside: f32 = t.tails.iter().map(|n| n.score()).sum();
        NodeResult {
            transition,
            viterbi: inside + transition,
            future,
            states,
        }
    }

    /// Weighted score of the goal transition over `tail`.
    pub fn compute_final(&self, tail: &HGNode, sentence: &Sentence) -> f32 {
        let mut acc = ScoreAccumulator::new(&self.weights);
        for f in &self.features {
            f.compute_final(tail, sentence, &mut acc);
        }
        acc.score()
    }

    /// Unweighted feature values of one edge, for n-best output.
    pub fn transition_features(&self, t: &Transition<'_>) -> FeatureVector {
        let mut acc = FeatureAccumulator::new();
        self.run(t, &mut acc);
        acc.into_features()
    }

    pub fn final_features(&self, tail: &HGNode, sentence: &Sentence) -> FeatureVector {
        let mut acc = FeatureAccumulator::new();
        for f in &self.features {
            f.compute_final(tail, sentence, &mut acc);
        }
        acc.into_features()
    }

    /// Acquires per-sentence resources; they are released when the guard
    /// drops, even if the search unwinds.
    pub fn acquire(&self, sentence_id: usize) -> SentenceGuard<'_> {
        for f in &self.features {
            f.acquire(sentence_id);
        }
        SentenceGuard {
            features: self,
            sentence_id,
        }
    }
}

pub struct SentenceGuard<'a> {
    features: &'a FeatureSet,
    sentence_id: usize,
}

impl Drop for SentenceGuard<'_> {
    fn drop(&mut self) {
        for f in &self.features.features {
            f.release(self.sentence_id);
        }
    }
}
