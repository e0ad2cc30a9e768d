//! N-gram language model oracle and boundary-state scoring.
//!
//! A node's yield is summarised by an [`NgramState`]: the leading words whose
//! probability could not be computed yet (missing left context) and the
//! trailing `order - 1` words that serve as context for whatever follows.
//! Two nodes with equal states score identically in every larger context,
//! which is what makes recombination sound.

mod ngram;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::grammar::TargetSymbol;
use crate::vocab::Symbol;

pub use ngram::NgramModel;

#[derive(Debug, thiserror::Error)]
pub enum LmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ARPA line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// The external n-gram oracle.
pub trait LanguageModel: Send + Sync {
    fn order(&self) -> usize;

    /// log10 P(word | context). `context` is oldest-first and may be shorter
    /// than `order - 1`; implementations use its trailing words only.
    fn logprob(&self, context: &[Symbol], word: Symbol) -> f32;
}

/// LM boundary summary of a partial translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NgramState {
    /// Yield prefix whose probabilities are still pending.
    pub left: Vec<Symbol>,
    /// Last `order - 1` words of the yield.
    pub right: Vec<Symbol>,
    /// The yield begins with `<s>`, so no left context is missing.
    pub anchored: bool,
    /// Yield length, capped at `order`.
    pub len: usize,
}

/// One element of a rule's target side, as seen by the LM.
#[derive(Debug, Clone, Copy)]
pub enum LmItem<'a> {
    Word(Symbol),
    State(&'a NgramState),
}

/// Per-sentence memo of n-gram lookups.
#[derive(Debug, Default)]
pub struct LmCache {
    probs: HashMap<Vec<Symbol>, f32>,
}

impl LmCache {
    fn logprob(&mut self, model: &dyn LanguageModel, context: &[Symbol], word: Symbol) -> f32 {
        let mut key = Vec::with_capacity(context.len() + 1);
        key.extend_from_slice(context);
        key.push(word);
        if let Some(&p) = self.probs.get(&key) {
            return p;
        }
        let p = model.logprob(context, word);
        self.probs.insert(key, p);
        p
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }
}

/// Sentence-id keyed caches, handed out for the lifetime of one sentence.
#[derive(Default)]
pub struct LmPools {
    pools: Mutex<HashMap<usize, Arc<Mutex<LmCache>>>>,
}

impl LmPools {
    pub fn acquire(&self, sentence_id: usize) {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(sentence_id)
            .or_default();
    }

    pub fn release(&self, sentence_id: usize) {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&sentence_id);
    }

    /// Cache for `sentence_id`; a throwaway cache if none was acquired.
    pub fn get(&self, sentence_id: usize) -> Arc<Mutex<LmCache>> {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&sentence_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn active(&self) -> usize {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct Walk<'m> {
    model: &'m dyn LanguageModel,
    n1: usize,
    total: f32,
    left: Vec<Symbol>,
    ctx: Vec<Symbol>,
    anchored: bool,
    len: usize,
}

impl<'m> Walk<'m> {
    fn new(model: &'m dyn LanguageModel) -> Self {
        Self {
            model,
            n1: model.order().saturating_sub(1),
            total: 0.0,
            left: Vec::new(),
            ctx: Vec::new(),
            anchored: false,
            len: 0,
        }
    }

    fn push(&mut self, cache: &mut LmCache, word: Symbol) {
        if self.len == 0 && word == Symbol::BOS {
            self.anchored = true;
        } else if self.anchored || self.ctx.len() >= self.n1 {
            self.total += cache.logprob(self.model, &self.ctx, word);
        } else {
            self.left.push(word);
        }
        self.ctx.push(word);
        if self.ctx.len() > self.n1 {
            self.ctx.remove(0);
        }
        self.len = (self.len + 1).min(self.n1 + 1);
    }

    fn push_state(&mut self, cache: &mut LmCache, state: &NgramState) {
        if self.len == 0 && state.anchored {
            self.anchored = true;
        }
        let before = self.len;
        for &w in &state.left {
            self.push(cache, w);
        }
        if state.anchored || state.len > self.n1 {
            // Words between the tail's left and right boundaries were scored
            // inside the tail; only its right context carries over.
            self.ctx = state.right.clone();
        }
        self.len = (before + state.len).min(self.n1 + 1);
    }

    fn finish(self) -> (f32, NgramState) {
        (
            self.total,
            NgramState {
                left: self.left,
                right: self.ctx,
                anchored: self.anchored,
                len: self.len,
            },
        )
    }
}

/// Scores the newly complete n-grams of a rule application and returns the
/// resulting boundary state.
pub fn score_items(
    model: &dyn LanguageModel,
    items: &[LmItem<'_>],
    cache: &mut LmCache,
) -> (f32, NgramState) {
    let mut walk = Walk::new(model);
    for item in items {
        match *item {
            LmItem::Word(w) => walk.push(cache, w),
            LmItem::State(s) => walk.push_state(cache, s),
        }
    }
    walk.finish()
}

/// Completes a goal item: wraps the yield in `<s>`/`</s>` where missing and
/// scores every pending n-gram.
pub fn score_final(model: &dyn LanguageModel, state: &NgramState, cache: &mut LmCache) -> f32 {
    let mut items = Vec::with_capacity(3);
    if !state.anchored {
        items.push(LmItem::Word(Symbol::BOS));
    }
    items.push(LmItem::State(state));
    if state.right.last() != Some(&Symbol::EOS) {
        items.push(LmItem::Word(Symbol::EOS));
    }
    score_items(model, &items, cache).0
}

/// Context-free estimate of a rule's target terminals: each contiguous run
/// of words is scored with whatever context the run itself provides.
pub fn estimate_target(model: &dyn LanguageModel, target: &[TargetSymbol]) -> f32 {
    let n1 = model.order().saturating_sub(1);
    let mut total = 0.0;
    let mut run: Vec<Symbol> = Vec::new();
    for sym in target {
        match *sym {
            TargetSymbol::Word(w) => {
                if w != Symbol::BOS {
                    let start = run.len().saturating_sub(n1);
                    total += model.logprob(&run[start..], w);
                }
                run.push(w);
            }
            TargetSymbol::Slot(_) => run.clear(),
        }
    }
    total
}

/// Lower-order estimate for the pending left words of a state.
pub fn estimate_left(model: &dyn LanguageModel, state: &NgramState) -> f32 {
    if state.anchored {
        return 0.0;
    }
    let n1 = model.order().saturating_sub(1);
    (0..state.left.len())
        .map(|k| {
            let start = k.saturating_sub(n1);
            model.logprob(&state.left[start..k], state.left[k])
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Vocabulary;

    /// Bigram model with fixed probabilities over a tiny vocabulary.
    fn bigram(vocab: &Vocabulary) -> NgramModel {
        let mut lm = NgramModel::new(2);
        let s = |w: &str| vocab.id(w);
        for (w, p) in [("a", -1.0), ("b", -1.5), ("</s>", -2.0), ("<s>", -99.0)] {
            lm.insert(&[s(w)], p, -0.5);
        }
        lm.insert(&[s("<s>"), s("a")], -0.2, 0.0);
        lm.insert(&[s("a"), s("b")], -0.3, 0.0);
        lm.insert(&[s("b"), s("</s>")], -0.1, 0.0);
        lm
    }

    fn words(vocab: &Vocabulary, text: &str) -> Vec<Symbol> {
        vocab.ids(text)
    }

    fn score_flat(lm: &dyn LanguageModel, syms: &[Symbol]) -> f32 {
        let mut total = 0.0;
        for k in 1..syms.len() {
            total += lm.logprob(&syms[..k], syms[k]);
        }
        total
    }

    #[test]
    fn split_scoring_matches_flat_scoring() {
        let vocab = Vocabulary::new();
        let lm = bigram(&vocab);
        let mut cache = LmCache::default();

        let a = words(&vocab, "a");
        let (s1, st_a) = score_items(&lm, &[LmItem::Word(a[0])], &mut cache);
        assert_eq!(s1, 0.0);
        assert_eq!(st_a.left, a);

        let b = words(&vocab, "b");
        let (s2, st_ab) = score_items(
            &lm,
            &[LmItem::State(&st_a), LmItem::Word(b[0])],
            &mut cache,
        );
        assert!((s2 - -0.3).abs() < 1e-6);
        let fin = score_final(&lm, &st_ab, &mut cache);

        let whole = words(&vocab, "<s> a b </s>");
        let flat = score_flat(&lm, &whole);
        assert!((s1 + s2 + fin - flat).abs() < 1e-5);
    }

    #[test]
    fn anchored_state_has_no_pending_words() {
        let vocab = Vocabulary::new();
        let lm = bigram(&vocab);
        let mut cache = LmCache::default();
        let syms = words(&vocab, "<s> a");
        let (score, st) = score_items(
            &lm,
            &[LmItem::Word(syms[0]), LmItem::Word(syms[1])],
            &mut cache,
        );
        assert!(st.anchored);
        assert!(st.left.is_empty());
        assert!((score - -0.2).abs() < 1e-6);
        assert_eq!(estimate_left(&lm, &st), 0.0);
    }

    #[test]
    fn equal_boundaries_recombine() {
        let vocab = Vocabulary::new();
        let mut lm = NgramModel::new(2);
        lm.insert(&[vocab.id("x")], -1.0, 0.0);
        let mut cache = LmCache::default();
        let long = words(&vocab, "a x b");
        let other = words(&vocab, "a y b");
        let items = |syms: &[Symbol]| {
            syms.iter()
                .map(|&w| LmItem::Word(w))
                .collect::<Vec<_>>()
        };
        let (_, s1) = score_items(&lm, &items(&long), &mut cache);
        let (_, s2) = score_items(&lm, &items(&other), &mut cache);
        assert_eq!(s1, s2);
    }

    #[test]
    fn pools_are_per_sentence() {
        let pools = LmPools::default();
        pools.acquire(3);
        pools.acquire(4);
        assert_eq!(pools.active(), 2);
        pools.release(3);
        assert_eq!(pools.active(), 1);
        pools.release(4);
        assert_eq!(pools.active(), 0);
    }
}
