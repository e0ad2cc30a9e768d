use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug_span;

use crate::feature::{FeatureSet, Transition};
use crate::grammar::{Grammar, Rule};
use crate::hypergraph::{HyperEdge, HyperGraph, NodeId};
use crate::search::{check_budget, SearchError};
use crate::sentence::Sentence;

/// Translation options of every source span, as scored leaf nodes.
///
/// Options of a span are merged across grammars, capped at
/// `num_translation_options` by estimated score, and then kept best-first
/// by their real score.
pub struct PhraseChart {
    max_len: usize,
    spans: HashMap<(usize, usize), Vec<NodeId>>,
}

impl PhraseChart {
    pub fn build(
        sentence: &Sentence,
        grammars: &[Arc<dyn Grammar>],
        features: &FeatureSet,
        hg: &mut HyperGraph,
    ) -> Result<Self, SearchError> {
        let _span = debug_span!("phrase_chart", words = sentence.len()).entered();
        let opts = sentence.options();
        let n = sentence.len();
        let max_len = grammars
            .iter()
            .map(|g| g.max_source_phrase_length())
            .max()
            .unwrap_or(0);
        let mut spans = HashMap::new();
        for b in 0..n {
            for e in b + 1..=n.min(b + max_len) {
                let source = &sentence.words()[b..e];
                let mut rules: Vec<&Arc<Rule>> = grammars
                    .iter()
                    .filter(|g| e - b <= g.max_source_phrase_length())
                    .filter_map(|g| g.rules_for(source))
                    .flat_map(|c| c.sorted_rules(features).iter())
                    .filter(|r| r.arity() == 0)
                    .collect();
                if rules.is_empty() {
                    continue;
                }
                rules.sort_by(|x, y| {
                    features
                        .estimate_rule(y)
                        .total_cmp(&features.estimate_rule(x))
                });
                rules.truncate(opts.num_translation_options);

                let mut nodes = Vec::with_capacity(rules.len());
                for rule in rules {
                    let result = features.compute(&Transition {
                        rule,
                        tails: &[],
                        i: b,
                        j: e,
                        sentence,
                    });
                    let edge = HyperEdge {
                        rule: Some(Arc::clone(rule)),
                        tails: Vec::new(),
                        score: result.viterbi,
                        transition: result.transition,
                    };
                    nodes.push(hg.add_node(b, e, rule.lhs(), result.states, edge));
                    check_budget(hg, opts.max_nodes)?;
                }
                nodes.sort_by(|x, y| {
                    hg.node(*y)
                        .score()
                        .total_cmp(&hg.node(*x).score())
                        .then_with(|| x.cmp(y))
                });
                spans.insert((b, e), nodes);
            }
        }
        Ok(Self { max_len, spans })
    }

    /// Options over `[begin, end)`, best first.
    pub fn options(&self, begin: usize, end: usize) -> &[NodeId] {
        self.spans
            .get(&(begin, end))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Score of the best option over `[begin, end)`.
    pub fn best_score(&self, hg: &HyperGraph, begin: usize, end: usize) -> Option<f32> {
        self.options(begin, end).first().map(|&n| hg.node(n).score())
    }

    pub fn max_source_phrase_length(&self) -> usize {
        self.max_len
    }
}
