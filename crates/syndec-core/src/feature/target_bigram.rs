use std::collections::HashSet;
use std::sync::Arc;

use crate::context::Context;
use crate::grammar::{Rule, TargetSymbol};
use crate::hypergraph::HGNode;
use crate::sentence::Sentence;
use crate::vocab::Symbol;

use super::{Accumulator, BigramState, DpState, FeatureFunction, FeatureVector, Transition};

/// Sparse indicator features `TargetBigram_<w1>_<w2>` over output bigrams.
///
/// With a vocabulary, words outside it are collapsed to `UNK` so the
/// feature space stays bounded.
pub struct TargetBigram {
    ctx: Arc<Context>,
    slot: usize,
    vocab: Option<HashSet<Symbol>>,
}

impl TargetBigram {
    pub fn new(ctx: Arc<Context>, vocab: Option<HashSet<Symbol>>) -> Self {
        Self {
            ctx,
            slot: 0,
            vocab,
        }
    }

    fn surface(&self, w: Symbol) -> String {
        match &self.vocab {
            Some(v) if !w.is_boundary() && !v.contains(&w) => "UNK".to_string(),
            _ => self.ctx.vocab.word(w),
        }
    }

    fn feature_name(&self, a: Symbol, b: Symbol) -> String {
        format!("TargetBigram_{}_{}", self.surface(a), self.surface(b))
    }

    fn fire(&self, a: Symbol, b: Symbol, acc: &mut dyn Accumulator) {
        let id = self.ctx.features.id(&self.feature_name(a, b));
        acc.add(id, 1.0);
    }

    fn tail_state<'n>(&self, node: &'n HGNode) -> Option<&'n BigramState> {
        match node.states.get(self.slot) {
            Some(DpState::Bigram(s)) => Some(s),
            _ => None,
        }
    }
}

impl FeatureFunction for TargetBigram {
    fn name(&self) -> &str {
        "TargetBigram"
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn bind_state_slot(&mut self, slot: usize) {
        self.slot = slot;
    }

    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32 {
        let mut total = 0.0;
        let mut prev: Option<Symbol> = None;
        for t in rule.target() {
            match *t {
                TargetSymbol::Word(w) => {
                    if let Some(p) = prev {
                        if let Some(id) = self.ctx.features.get(&self.feature_name(p, w)) {
                            total += weights.get(id);
                        }
                    }
                    prev = Some(w);
                }
                TargetSymbol::Slot(_) => prev = None,
            }
        }
        total
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState> {
        let mut first: Option<Symbol> = None;
        let mut prev: Option<Symbol> = None;
        for sym in t.rule.target() {
            match *sym {
                TargetSymbol::Word(w) => {
                    if let Some(p) = prev {
                        self.fire(p, w, acc);
                    }
                    first.get_or_insert(w);
                    prev = Some(w);
                }
                TargetSymbol::Slot(k) => {
                    let Some(state) = t.tails.get(k).and_then(|n| self.tail_state(n)) else {
                        continue;
                    };
                    if let Some(l) = state.left {
                        if let Some(p) = prev {
                            self.fire(p, l, acc);
                        }
                        first.get_or_insert(l);
                    }
                    if state.right.is_some() {
                        prev = state.right;
                    }
                }
            }
        }
        Some(DpState::Bigram(BigramState {
            left: first,
            right: prev,
        }))
    }

    fn compute_final(
        &self,
        tail: &HGNode,
        _sentence: &Sentence,
        acc: &mut dyn Accumulator,
    ) -> Option<DpState> {
        let state = self.tail_state(tail)?;
        let left = state.left.unwrap_or(Symbol::EOS);
        if left != Symbol::BOS {
            self.fire(Symbol::BOS, left, acc);
        }
        match state.right {
            Some(Symbol::EOS) | None => {}
            Some(right) => self.fire(right, Symbol::EOS, acc),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OwnerId;
    use crate::feature::{FeatureAccumulator, StateTuple};
    use crate::grammar::parse_rule;
    use crate::hypergraph::{HyperEdge, HyperGraph};
    use crate::testutil::{leaf_transition, sentence};

    fn fired(ctx: &Context, acc: FeatureAccumulator) -> Vec<String> {
        let mut names: Vec<String> = acc
            .into_features()
            .iter()
            .map(|(id, _)| ctx.features.name(id))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn bigrams_cross_tail_boundaries() {
        let ctx = Context::new();
        let bigram = TargetBigram::new(Arc::clone(&ctx), None);
        let pt = ctx.owners.id("pt");
        let sentence = sentence(&ctx, "a b c");

        let leaf = parse_rule("[X] ||| a b ||| x y", &ctx, pt).unwrap();
        let mut acc = FeatureAccumulator::new();
        let state = bigram.compute(&leaf_transition(&leaf, &sentence, 1, 3), &mut acc);
        assert_eq!(fired(&ctx, acc), ["TargetBigram_x_y"]);
        let Some(DpState::Bigram(inner)) = state.clone() else {
            panic!("expected a bigram state");
        };
        assert_eq!(inner.left, Some(ctx.vocab.id("x")));
        assert_eq!(inner.right, Some(ctx.vocab.id("y")));

        let mut hg = HyperGraph::new(1);
        let tail = hg.add_node(
            1,
            3,
            Symbol::X,
            StateTuple::from_slots(vec![state]),
            HyperEdge {
                rule: Some(Arc::new(leaf)),
                tails: Vec::new(),
                score: 0.0,
                transition: 0.0,
            },
        );
        let tail = hg.node(tail);
        let outer = parse_rule("[X] ||| [X,1] c ||| [X,1] z", &ctx, pt).unwrap();
        let mut acc = FeatureAccumulator::new();
        let state = bigram.compute(
            &Transition {
                rule: &outer,
                tails: &[tail],
                i: 1,
                j: 4,
                sentence: &sentence,
            },
            &mut acc,
        );
        assert_eq!(fired(&ctx, acc), ["TargetBigram_y_z"]);

        let goal = hg.add_node(
            0,
            5,
            Symbol::GOAL,
            StateTuple::from_slots(vec![state]),
            HyperEdge {
                rule: None,
                tails: Vec::new(),
                score: 0.0,
                transition: 0.0,
            },
        );
        let mut acc = FeatureAccumulator::new();
        bigram.compute_final(hg.node(goal), &sentence, &mut acc);
        assert_eq!(
            fired(&ctx, acc),
            ["TargetBigram_<s>_x", "TargetBigram_z_</s>"]
        );
    }

    #[test]
    fn words_outside_vocabulary_collapse() {
        let ctx = Context::new();
        let vocab = [ctx.vocab.id("x")].into_iter().collect();
        let bigram = TargetBigram::new(Arc::clone(&ctx), Some(vocab));
        let rule = parse_rule("[X] ||| a ||| x rare", &ctx, OwnerId::OOV).unwrap();
        let sentence = sentence(&ctx, "a");
        let mut acc = FeatureAccumulator::new();
        bigram.compute(&leaf_transition(&rule, &sentence, 1, 2), &mut acc);
        assert_eq!(fired(&ctx, acc), ["TargetBigram_x_UNK"]);
    }
}
