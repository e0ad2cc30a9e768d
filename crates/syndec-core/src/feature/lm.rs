use std::sync::{Arc, PoisonError};

use crate::context::{Context, FeatureId};
use crate::grammar::{Rule, TargetSymbol};
use crate::hypergraph::HGNode;
use crate::lm::{self, LanguageModel, LmItem, LmPools};
use crate::sentence::Sentence;

use super::{Accumulator, DpState, FeatureFunction, FeatureVector, Transition};

/// N-gram language model feature over an external [`LanguageModel`].
pub struct LanguageModelFeature {
    name: String,
    id: FeatureId,
    model: Arc<dyn LanguageModel>,
    slot: usize,
    pools: Arc<LmPools>,
}

impl LanguageModelFeature {
    pub fn new(ctx: &Context, name: &str, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.to_string(),
            id: ctx.features.id(name),
            model,
            slot: 0,
            pools: Arc::default(),
        }
    }

    /// Shared handle on the per-sentence scratch caches; stays valid after
    /// the feature is moved into a [`FeatureSet`](super::FeatureSet).
    pub fn pools(&self) -> Arc<LmPools> {
        Arc::clone(&self.pools)
    }

    fn tail_state<'n>(&self, node: &'n HGNode) -> Option<&'n lm::NgramState> {
        match node.states.get(self.slot) {
            Some(DpState::Ngram(s)) => Some(s),
            _ => None,
        }
    }
}

impl FeatureFunction for LanguageModelFeature {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn bind_state_slot(&mut self, slot: usize) {
        self.slot = slot;
    }

    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32 {
        weights.get(self.id) * lm::estimate_target(self.model.as_ref(), rule.target())
    }

    fn estimate_future_cost(
        &self,
        _rule: &Rule,
        state: Option<&DpState>,
        weights: &FeatureVector,
    ) -> f32 {
        match state {
            Some(DpState::Ngram(s)) => {
                weights.get(self.id) * lm::estimate_left(self.model.as_ref(), s)
            }
            _ => 0.0,
        }
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        let mut items = Vec::with_capacity(t.rule.target().len());
        for sym in t.rule.target() {
            match *sym {
                TargetSymbol::Word(w) => items.push(LmItem::Word(w)),
                TargetSymbol::Slot(k) => {
                    if let Some(s) = t.tails.get(k).and_then(|n| self.tail_state(n)) {
                        items.push(LmItem::State(s));
                    }
                }
            }
        }
        let cache = self.pools.get(t.sentence.id());
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        let (score, state) = lm::score_items(self.model.as_ref(), &items, &mut cache);
        acc.add(self.id, score);
        Some(DpState::Ngram(state))
    }

    fn compute_final(
        &self,
        tail: &HGNode,
        sentence: &Sentence,
        acc: &mut dyn Accumulator,
    ) -> Option<DpState> {
        let state = self.tail_state(tail)?;
        let cache = self.pools.get(sentence.id());
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        let score = lm::score_final(self.model.as_ref(), state, &mut cache);
        acc.add(self.id, score);
        None
    }

    fn acquire(&self, sentence_id: usize) {
        self.pools.acquire(sentence_id);
    }

    fn release(&self, sentence_id: usize) {
        self.pools.release(sentence_id);
    }
}
