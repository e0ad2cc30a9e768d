//! Small hand-built grammars and feature sets shared by unit and scenario
//! tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::SearchAlgorithm;
use crate::context::Context;
use crate::feature::{
    Accumulator, FeatureFunction, FeatureRegistry, FeatureSet, FeatureVector, Transition,
};
use crate::grammar::{cky_glue_grammar, parse_rule, Grammar, MemoryGrammar, Rule};
use crate::hypergraph::HGNode;
use crate::sentence::{SearchOptions, Sentence};
use crate::vocab::Symbol;

pub(crate) fn options(algorithm: SearchAlgorithm) -> SearchOptions {
    SearchOptions {
        algorithm,
        ..SearchOptions::default()
    }
}

pub(crate) fn sentence(ctx: &Context, text: &str) -> Sentence {
    sentence_with(ctx, text, SearchOptions::default())
}

pub(crate) fn sentence_with(ctx: &Context, text: &str, options: SearchOptions) -> Sentence {
    Sentence::parse(ctx, 0, text, options).unwrap()
}

/// A transition applying `rule` with no tails over `[i, j)`.
pub(crate) fn leaf_transition<'a>(
    rule: &'a Rule,
    sentence: &'a Sentence,
    i: usize,
    j: usize,
) -> Transition<'a> {
    Transition {
        rule,
        tails: &[],
        i,
        j,
        sentence,
    }
}

/// A grammar of `owner` from rule lines; unlimited span.
pub(crate) fn grammar(ctx: &Context, owner: &str, rules: &[&str]) -> Arc<dyn Grammar> {
    let owner = ctx.owners.id(owner);
    let rules = rules.iter().map(|l| parse_rule(l, ctx, owner).unwrap());
    Arc::new(MemoryGrammar::from_rules(owner, None, rules))
}

/// `grammars` plus the chart glue over all their labels and `[X]`.
pub(crate) fn with_cky_glue(
    ctx: &Context,
    grammars: Vec<Arc<dyn Grammar>>,
) -> Vec<Arc<dyn Grammar>> {
    let mut labels: Vec<Symbol> = grammars.iter().flat_map(|g| g.lhs_labels()).collect();
    labels.push(Symbol::X);
    labels.sort();
    labels.dedup();
    let glue = cky_glue_grammar(ctx, Symbol::GOAL, &labels).unwrap();
    let mut all = grammars;
    all.push(Arc::new(glue));
    all
}

/// Builtin features from registry lines, with `(name, weight)` weights.
pub(crate) fn feature_set(
    ctx: &Arc<Context>,
    lines: &[&str],
    weights: &[(&str, f32)],
) -> FeatureSet {
    let registry = FeatureRegistry::with_builtins();
    let functions = lines
        .iter()
        .map(|l| registry.create(l, ctx).unwrap())
        .collect();
    let weights = FeatureVector::from_named(&ctx.features, weights.iter().copied());
    FeatureSet::new(functions, weights)
}

/// Stateless feature counting how often it is consulted.
pub(crate) struct CountingFeature {
    pub calls: Arc<AtomicUsize>,
}

impl FeatureFunction for CountingFeature {
    fn name(&self) -> &str {
        "Counting"
    }

    fn estimate_cost(&self, _rule: &Rule, _weights: &FeatureVector) -> f32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        0.0
    }

    fn compute(
        &self,
        _t: &Transition<'_>,
        _acc: &mut dyn Accumulator,
    ) -> Option<crate::feature::DpState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn compute_final(
        &self,
        _tail: &HGNode,
        _sentence: &Sentence,
        _acc: &mut dyn Accumulator,
    ) -> Option<crate::feature::DpState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn acquire(&self, _sentence_id: usize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
