//! Lazy k-best derivation extraction (Huang & Chiang, algorithm 3).
//!
//! Each node gets a virtual node holding its derivations found so far, best
//! first, plus a frontier of candidate (edge, tail ranks) combinations.
//! The (k+1)-th derivation of a node is only computed when someone asks for
//! it, so extracting N derivations touches O(N · |path|) items.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;
use tracing::{debug, debug_span};

use super::{EdgeId, HGNode, HyperGraph, NodeId};
use crate::feature::{FeatureSet, FeatureVector, Transition};
use crate::grammar::TargetSymbol;
use crate::sentence::Sentence;
use crate::vocab::Symbol;

/// One entry of a node's k-best list: an incoming edge and, for each of its
/// tails, which of that tail's derivations is used.
#[derive(Debug, Clone)]
struct Derivation {
    edge: EdgeId,
    ranks: Vec<usize>,
    score: f32,
}

struct Frontier(Derivation);

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.0.score)
            .cmp(&OrderedFloat(other.0.score))
            // Deterministic ties: earlier edges and lower ranks first.
            .then_with(|| other.0.edge.cmp(&self.0.edge))
            .then_with(|| other.0.ranks.cmp(&self.0.ranks))
    }
}

#[derive(Default)]
struct VirtualNode {
    nbest: Vec<Derivation>,
    /// Output yield of each `nbest` entry, boundary markers included.
    yields: Vec<Vec<Symbol>>,
    frontier: BinaryHeap<Frontier>,
    seen: HashSet<(EdgeId, Vec<usize>)>,
    distinct: HashSet<Vec<Symbol>>,
    started: bool,
}

/// One extracted derivation of the goal node.
#[derive(Debug, Clone)]
pub struct KBestItem {
    pub rank: usize,
    pub score: f32,
    /// Output words, boundary markers removed.
    pub words: Vec<Symbol>,
    /// For each output word, the 0-based source positions aligned to it.
    pub alignment: Vec<Vec<usize>>,
    /// Unweighted feature values, when requested.
    pub features: Option<FeatureVector>,
}

pub struct KBestExtractor<'g> {
    hg: &'g HyperGraph,
    unique: bool,
    nodes: HashMap<NodeId, VirtualNode>,
}

impl<'g> KBestExtractor<'g> {
    /// With `unique`, derivations whose output string was already produced
    /// at the same node are skipped.
    pub fn new(hg: &'g HyperGraph, unique: bool) -> Self {
        Self {
            hg,
            unique,
            nodes: HashMap::new(),
        }
    }

    /// Up to `n` best derivations of the goal node, best first. `scoring`
    /// recomputes per-derivation feature vectors.
    pub fn extract(
        &mut self,
        n: usize,
        scoring: Option<(&FeatureSet, &Sentence)>,
    ) -> Vec<KBestItem> {
        let Some(goal) = self.hg.goal() else {
            return Vec::new();
        };
        let _span = debug_span!("kbest", n, unique = self.unique).entered();
        let mut out = Vec::new();
        for k in 0..n {
            if !self.ensure(goal, k) {
                break;
            }
            let mut aligned = Vec::new();
            self.align(goal, k, &mut aligned);
            let (words, alignment) = aligned
                .into_iter()
                .filter(|(w, _)| !w.is_boundary())
                .unzip();
            let features = scoring.map(|(fs, sentence)| {
                let mut v = FeatureVector::new();
                self.features_of(goal, k, fs, sentence, &mut v);
                v
            });
            out.push(KBestItem {
                rank: k,
                score: self.nodes[&goal].nbest[k].score,
                words,
                alignment,
                features,
            });
        }
        debug!(found = out.len(), "kbest extracted");
        out
    }

    /// Makes sure `node` has at least `k + 1` derivations; false when it has
    /// fewer in total.
    fn ensure(&mut self, node: NodeId, k: usize) -> bool {
        if self.nodes.get(&node).is_some_and(|v| v.nbest.len() > k) {
            return true;
        }
        let hg = self.hg;
        let mut vn = self.nodes.remove(&node).unwrap_or_default();
        if !vn.started {
            vn.started = true;
            for &e in hg.node(node).edges() {
                let ranks = vec![0; hg.edge(e).tails.len()];
                if let Some(score) = self.candidate_score(e, &ranks) {
                    vn.seen.insert((e, ranks.clone()));
                    vn.frontier.push(Frontier(Derivation {
                        edge: e,
                        ranks,
                        score,
                    }));
                }
            }
        }

        while vn.nbest.len() <= k {
            let Some(Frontier(cand)) = vn.frontier.pop() else {
                break;
            };
            for t in 0..cand.ranks.len() {
                let mut ranks = cand.ranks.clone();
                ranks[t] += 1;
                if !vn.seen.insert((cand.edge, ranks.clone())) {
                    continue;
                }
                if let Some(score) = self.candidate_score(cand.edge, &ranks) {
                    vn.frontier.push(Frontier(Derivation {
                        edge: cand.edge,
                        ranks,
                        score,
                    }));
                }
            }
            let words = self.candidate_yield(&cand);
            if self.unique && !vn.distinct.insert(words.clone()) {
                continue;
            }
            vn.nbest.push(cand);
            vn.yields.push(words);
        }

        let found = vn.nbest.len() > k;
        self.nodes.insert(node, vn);
        found
    }

    fn candidate_score(&mut self, edge: EdgeId, ranks: &[usize]) -> Option<f32> {
        let hg = self.hg;
        let e = hg.edge(edge);
        let mut score = e.transition;
        for (&tail, &r) in e.tails.iter().zip(ranks) {
            if !self.ensure(tail, r) {
                return None;
            }
            score += self.nodes[&tail].nbest[r].score;
        }
        Some(score)
    }

    fn candidate_yield(&self, cand: &Derivation) -> Vec<Symbol> {
        let e = self.hg.edge(cand.edge);
        let tail_yield = |k: usize| -> &[Symbol] {
            match (e.tails.get(k), cand.ranks.get(k)) {
                (Some(t), Some(&r)) => &self.nodes[t].yields[r],
                _ => &[],
            }
        };
        let mut out = Vec::new();
        match &e.rule {
            None => {
                for k in 0..e.tails.len() {
                    out.extend_from_slice(tail_yield(k));
                }
            }
            Some(rule) => {
                for sym in rule.target() {
                    match *sym {
                        TargetSymbol::Word(w) => out.push(w),
                        TargetSymbol::Slot(k) => out.extend_from_slice(tail_yield(k)),
                    }
                }
            }
        }
        out
    }

    fn align(&self, node: NodeId, k: usize, out: &mut Vec<(Symbol, Vec<usize>)>) {
        let hg = self.hg;
        let d = &self.nodes[&node].nbest[k];
        let e = hg.edge(d.edge);
        let Some(rule) = &e.rule else {
            for (&t, &r) in e.tails.iter().zip(&d.ranks) {
                self.align(t, r, out);
            }
            return;
        };

        // Input position of every source terminal of the rule.
        let n = hg.node(node);
        let mut positions = vec![None; rule.source().len()];
        let mut pos = n.i;
        let mut slot = 0;
        for (idx, s) in rule.source().iter().enumerate() {
            if s.is_nonterminal() {
                if let Some(&t) = e.tails.get(slot) {
                    pos = hg.node(t).j;
                }
                slot += 1;
            } else {
                positions[idx] = Some(pos.saturating_sub(hg.source_offset()));
                pos += 1;
            }
        }

        let links = rule.alignment_map();
        for (ti, sym) in rule.target().iter().enumerate() {
            match *sym {
                TargetSymbol::Word(w) => {
                    let src = links
                        .get(&ti)
                        .map(|ss| {
                            ss.iter()
                                .filter_map(|&s| positions.get(s).copied().flatten())
                                .collect()
                        })
                        .unwrap_or_default();
                    out.push((w, src));
                }
                TargetSymbol::Slot(s) => {
                    if let (Some(&t), Some(&r)) = (e.tails.get(s), d.ranks.get(s)) {
                        self.align(t, r, out);
                    }
                }
            }
        }
    }

    fn features_of(
        &self,
        node: NodeId,
        k: usize,
        fs: &FeatureSet,
        sentence: &Sentence,
        acc: &mut FeatureVector,
    ) {
        let hg = self.hg;
        let d = &self.nodes[&node].nbest[k];
        let e = hg.edge(d.edge);
        match &e.rule {
            None => {
                if let Some(&t) = e.tails.first() {
                    acc.add_all(&fs.final_features(hg.node(t), sentence));
                }
            }
            Some(rule) => {
                let n = hg.node(node);
                let tails: Vec<&HGNode> = e.tails.iter().map(|&t| hg.node(t)).collect();
                acc.add_all(&fs.transition_features(&Transition {
                    rule,
                    tails: &tails,
                    i: n.i,
                    j: n.j,
                    sentence,
                }));
            }
        }
        for (&t, &r) in e.tails.iter().zip(&d.ranks) {
            self.features_of(t, r, fs, sentence, acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::Context;
    use crate::feature::StateTuple;
    use crate::grammar::parse_rule;
    use crate::hypergraph::HyperEdge;

    /// Two independent spans with two translations each, joined under a goal.
    fn toy(ctx: &Context, a_second: &str) -> HyperGraph {
        let pt = ctx.owners.id("pt");
        let rule = |text: &str| Arc::new(parse_rule(text, ctx, pt).unwrap());
        let leaf = |text: &str, score: f32| HyperEdge {
            rule: Some(rule(text)),
            tails: Vec::new(),
            score,
            transition: score,
        };
        let mut hg = HyperGraph::new(0);
        let a = hg.add_node(0, 1, Symbol::X, StateTuple::empty(), leaf("[X] ||| a ||| x ||| ||| 0-0", -1.0));
        hg.add_edge(a, leaf(a_second, -2.0));
        let b = hg.add_node(1, 2, Symbol::X, StateTuple::empty(), leaf("[X] ||| b ||| z ||| ||| 0-0", -1.0));
        hg.add_edge(b, leaf("[X] ||| b ||| w ||| ||| 0-0", -3.0));
        let join = hg.add_node(
            0,
            2,
            Symbol::GOAL,
            StateTuple::empty(),
            HyperEdge {
                rule: Some(rule("[GOAL] ||| [X,1] [X,2] ||| [X,1] [X,2]")),
                tails: vec![a, b],
                score: -2.0,
                transition: 0.0,
            },
        );
        let root = hg.add_node(
            0,
            2,
            Symbol::GOAL,
            StateTuple::empty(),
            HyperEdge {
                rule: None,
                tails: vec![join],
                score: -2.0,
                transition: 0.0,
            },
        );
        hg.set_goal(root);
        hg
    }

    #[test]
    fn enumerates_in_score_order() {
        let ctx = Context::new();
        let hg = toy(&ctx, "[X] ||| a ||| y ||| ||| 0-0");
        let items = KBestExtractor::new(&hg, false).extract(10, None);
        let scores: Vec<f32> = items.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![-2.0, -3.0, -4.0, -5.0]);
        assert_eq!(ctx.vocab.words(&items[0].words), "x z");
        assert_eq!(ctx.vocab.words(&items[1].words), "y z");
        assert_eq!(items[0].alignment, vec![vec![0], vec![1]]);
    }

    #[test]
    fn truncates_to_n() {
        let ctx = Context::new();
        let hg = toy(&ctx, "[X] ||| a ||| y");
        assert_eq!(KBestExtractor::new(&hg, false).extract(2, None).len(), 2);
    }

    #[test]
    fn unique_mode_drops_repeated_strings() {
        let ctx = Context::new();
        // Both edges into the first node yield "x".
        let hg = toy(&ctx, "[X] ||| a ||| x");
        let all = KBestExtractor::new(&hg, false).extract(10, None);
        assert_eq!(all.len(), 4);
        let unique = KBestExtractor::new(&hg, true).extract(10, None);
        assert_eq!(unique.len(), 2);
        assert_eq!(ctx.vocab.words(&unique[0].words), "x z");
        assert_eq!(ctx.vocab.words(&unique[1].words), "x w");
    }

    #[test]
    fn empty_graph_has_no_derivations() {
        let hg = HyperGraph::new(0);
        assert!(KBestExtractor::new(&hg, false).extract(3, None).is_empty());
    }
}
