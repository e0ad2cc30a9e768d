use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use crate::context::{Context, OwnerId};
use crate::feature::FeatureVector;
use crate::vocab::Symbol;

use super::GrammarError;

/// One element of a rule's target side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSymbol {
    Word(Symbol),
    /// The k-th (0-based) nonterminal of the source side.
    Slot(usize),
}

/// A synchronous rule `lhs → source / target`.
///
/// Equality and hashing look at `(lhs, source, target)` only; two rules
/// that differ just in scores or owner are the same rule.
#[derive(Debug)]
pub struct Rule {
    lhs: Symbol,
    source: Vec<Symbol>,
    target: Vec<TargetSymbol>,
    arity: usize,
    features: FeatureVector,
    /// `(source position, target position)` pairs over the full rule sides.
    alignment: Vec<(usize, usize)>,
    owner: OwnerId,
    estimated: OnceLock<f32>,
}

impl Rule {
    pub fn new(
        lhs: Symbol,
        source: Vec<Symbol>,
        target: Vec<TargetSymbol>,
        features: FeatureVector,
        alignment: Vec<(usize, usize)>,
        owner: OwnerId,
    ) -> Result<Self, GrammarError> {
        let arity = source.iter().filter(|s| s.is_nonterminal()).count();
        let mut seen = vec![false; arity];
        for t in &target {
            match *t {
                TargetSymbol::Slot(k) if k >= arity => {
                    return Err(GrammarError::Slot(format!(
                        "target slot {} but source has {arity} nonterminals",
                        k + 1
                    )));
                }
                TargetSymbol::Slot(k) if seen[k] => {
                    return Err(GrammarError::Slot(format!(
                        "slot {} used twice on the target side",
                        k + 1
                    )));
                }
                TargetSymbol::Slot(k) => seen[k] = true,
                TargetSymbol::Word(w) if w.is_nonterminal() => {
                    return Err(GrammarError::Slot(
                        "bare nonterminal symbol on the target side".to_string(),
                    ));
                }
                TargetSymbol::Word(_) => {}
            }
        }
        if let Some(k) = seen.iter().position(|s| !s) {
            return Err(GrammarError::Slot(format!(
                "source nonterminal {} missing from the target side",
                k + 1
            )));
        }
        for &(s, t) in &alignment {
            if s >= source.len() || t >= target.len() {
                return Err(GrammarError::Slot(format!(
                    "alignment point {s}-{t} outside the rule"
                )));
            }
        }
        Ok(Self {
            lhs,
            source,
            target,
            arity,
            features,
            alignment,
            owner,
            estimated: OnceLock::new(),
        })
    }

    #[inline]
    pub fn lhs(&self) -> Symbol {
        self.lhs
    }

    #[inline]
    pub fn source(&self) -> &[Symbol] {
        &self.source
    }

    #[inline]
    pub fn target(&self) -> &[TargetSymbol] {
        &self.target
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn alignment(&self) -> &[(usize, usize)] {
        &self.alignment
    }

    #[inline]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Labels of the source nonterminals, in slot order.
    pub fn nonterminals(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.source.iter().copied().filter(|s| s.is_nonterminal())
    }

    /// Target terminals, boundary markers excluded.
    pub fn target_word_count(&self) -> usize {
        self.target
            .iter()
            .filter(|t| matches!(t, TargetSymbol::Word(w) if !w.is_boundary()))
            .count()
    }

    /// True when the target side visits the slots out of source order.
    pub fn is_inverting(&self) -> bool {
        let slots: Vec<usize> = self
            .target
            .iter()
            .filter_map(|t| match *t {
                TargetSymbol::Slot(k) => Some(k),
                TargetSymbol::Word(_) => None,
            })
            .collect();
        slots.windows(2).any(|w| w[0] > w[1])
    }

    /// Target position → source positions aligned to it.
    pub fn alignment_map(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut map: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(s, t) in &self.alignment {
            map.entry(t).or_default().push(s);
        }
        map
    }

    /// Memoised context-free estimate, if already computed.
    pub fn estimated_cost(&self) -> Option<f32> {
        self.estimated.get().copied()
    }

    /// Returns the memoised estimate, computing it with `f` on first use.
    pub fn estimated_cost_or_init(&self, f: impl FnOnce() -> f32) -> f32 {
        *self.estimated.get_or_init(f)
    }

    /// `[X] ||| src ||| tgt` rendering for diagnostics.
    pub fn to_text(&self, ctx: &Context) -> String {
        let vocab = &ctx.vocab;
        let mut out = vocab.word(self.lhs);
        out.push_str(" |||");
        let mut slot = 0;
        for &s in &self.source {
            if s.is_nonterminal() {
                slot += 1;
                let label = vocab.word(s);
                let _ = write!(out, " {},{slot}]", label.trim_end_matches(']'));
            } else {
                let _ = write!(out, " {}", vocab.word(s));
            }
        }
        out.push_str(" |||");
        let labels: Vec<Symbol> = self.nonterminals().collect();
        for t in &self.target {
            match *t {
                TargetSymbol::Word(w) => {
                    let _ = write!(out, " {}", vocab.word(w));
                }
                TargetSymbol::Slot(k) => {
                    let label = labels.get(k).map(|&l| vocab.word(l)).unwrap_or_default();
                    let _ = write!(out, " {},{}]", label.trim_end_matches(']'), k + 1);
                }
            }
        }
        out
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.lhs == other.lhs && self.source == other.source && self.target == other.target
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lhs.hash(state);
        self.source.hash(state);
        self.target.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn words(ctx: &Context, text: &str) -> Vec<Symbol> {
        ctx.vocab.ids(text)
    }

    #[test]
    fn arity_and_inversion() {
        let ctx = Context::new();
        let mut source = vec![Symbol::X];
        source.extend(words(&ctx, "de"));
        source.push(Symbol::X);
        let rule = Rule::new(
            Symbol::X,
            source,
            vec![TargetSymbol::Slot(1), TargetSymbol::Word(ctx.vocab.id("of")), TargetSymbol::Slot(0)],
            FeatureVector::new(),
            vec![(1, 1)],
            OwnerId::GLUE,
        )
        .unwrap();
        assert_eq!(rule.arity(), 2);
        assert!(rule.is_inverting());
        assert_eq!(rule.target_word_count(), 1);
        assert_eq!(rule.alignment_map()[&1], vec![1]);
        assert_eq!(rule.to_text(&ctx), "[X] ||| [X,1] de [X,2] ||| [X,2] of [X,1]");
    }

    #[test]
    fn rejects_unknown_slot() {
        let ctx = Context::new();
        let err = Rule::new(
            Symbol::X,
            words(&ctx, "a"),
            vec![TargetSymbol::Slot(0)],
            FeatureVector::new(),
            Vec::new(),
            OwnerId::GLUE,
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::Slot(_)));
    }

    #[test]
    fn equality_ignores_scores() {
        let ctx = Context::new();
        let f = FeatureVector::from_named(&ctx.features, [("tm_pt_0", -1.0)]);
        let mk = |features: FeatureVector, owner| {
            Rule::new(
                Symbol::X,
                words(&ctx, "a"),
                vec![TargetSymbol::Word(ctx.vocab.id("x"))],
                features,
                Vec::new(),
                owner,
            )
            .unwrap()
        };
        assert_eq!(mk(f, OwnerId::GLUE), mk(FeatureVector::new(), OwnerId::OOV));
    }

    #[test]
    fn estimate_is_memoised() {
        let ctx = Context::new();
        let rule = Rule::new(
            Symbol::X,
            words(&ctx, "a"),
            vec![TargetSymbol::Word(ctx.vocab.id("x"))],
            FeatureVector::new(),
            Vec::new(),
            OwnerId::GLUE,
        )
        .unwrap();
        assert_eq!(rule.estimated_cost(), None);
        assert_eq!(rule.estimated_cost_or_init(|| 1.5), 1.5);
        assert_eq!(rule.estimated_cost_or_init(|| 9.0), 1.5);
    }
}
