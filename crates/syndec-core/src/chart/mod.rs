//! CKY chart search with cube pruning, for hierarchical grammars.
//!
//! The input is wrapped as `<s> w1 … wn </s>` and spans are filled by
//! increasing width, so every antecedent of `[i, j)` lives in a strictly
//! smaller cell. Rule matching runs over a dot chart per grammar; each
//! finished match yields a cube whose axes are the sorted rules and the
//! sorted antecedent nodes of each nonterminal. Cube pruning pops at most
//! `pop_limit` items per cell.

mod cell;
mod dot;

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, debug_span, trace};

use crate::feature::{FeatureSet, NodeResult, StateTuple, Transition};
use crate::grammar::{Grammar, Rule};
use crate::hypergraph::{HGNode, HyperEdge, HyperGraph, NodeId, SearchStats};
use crate::search::{check_budget, Queued, SearchError};
use crate::sentence::Sentence;
use crate::vocab::Symbol;

use cell::Cell;
use dot::DotChart;

/// Builds the hypergraph of `sentence` under `grammars`, which must include
/// a glue grammar deriving `goal` over `<s> … </s>`.
///
/// A sentence nothing covers yields a hypergraph without a goal.
pub fn chart_search(
    sentence: &Sentence,
    grammars: &[Arc<dyn Grammar>],
    features: &FeatureSet,
    goal: Symbol,
) -> Result<(HyperGraph, SearchStats), SearchError> {
    let _span = debug_span!("chart_search", sentence_id = sentence.id(), words = sentence.len())
        .entered();
    let mut chart = Chart::new(sentence, grammars, features, goal);
    let n = chart.input.len();
    for width in 1..=n {
        for i in 0..=n - width {
            chart.fill(i, i + width)?;
        }
    }
    let (hg, stats) = chart.finish();
    debug!(
        nodes = stats.nodes,
        edges = stats.edges,
        max_pops = stats.max_pops,
        best_score = hg.viterbi_score(),
        "chart search done"
    );
    Ok((hg, stats))
}

/// One matched rule collection over a span, with the best-first antecedent
/// list of each of its nonterminals.
struct CubeSource<'a> {
    rules: &'a [Arc<Rule>],
    tails: Vec<Vec<NodeId>>,
}

impl CubeSource<'_> {
    /// Sizes of the cube axes: rules, then each antecedent list.
    fn dims(&self) -> Vec<usize> {
        std::iter::once(self.rules.len())
            .chain(self.tails.iter().map(Vec::len))
            .collect()
    }
}

struct Chart<'a> {
    sentence: &'a Sentence,
    input: Vec<Symbol>,
    features: &'a FeatureSet,
    goal: Symbol,
    dots: Vec<DotChart<'a>>,
    cells: HashMap<(usize, usize), Cell>,
    hg: HyperGraph,
    stats: SearchStats,
}

impl<'a> Chart<'a> {
    fn new(
        sentence: &'a Sentence,
        grammars: &'a [Arc<dyn Grammar>],
        features: &'a FeatureSet,
        goal: Symbol,
    ) -> Self {
        let mut input = Vec::with_capacity(sentence.len() + 2);
        input.push(Symbol::BOS);
        input.extend_from_slice(sentence.words());
        input.push(Symbol::EOS);
        let dots = grammars
            .iter()
            .map(|g| DotChart::new(g.as_ref(), input.len()))
            .collect();
        Self {
            sentence,
            input,
            features,
            goal,
            dots,
            cells: HashMap::new(),
            hg: HyperGraph::new(1),
            stats: SearchStats::default(),
        }
    }

    fn fill(&mut self, i: usize, j: usize) -> Result<(), SearchError> {
        let width = j - i;
        let mut sources = Vec::new();
        for dots in &mut self.dots {
            if !dots.allows(width) {
                continue;
            }
            dots.expand(i, j, &self.input, &self.cells);
            for item in dots.completed(i, j) {
                let Some(collection) = item.node.rule_collection() else {
                    continue;
                };
                let tails = item
                    .tails
                    .iter()
                    .map(|t| {
                        self.cells
                            .get(&(t.i, t.j))
                            .map(|c| c.nodes_with(t.label).to_vec())
                            .unwrap_or_default()
                    })
                    .collect();
                sources.push(CubeSource {
                    rules: collection.sorted_rules(self.features),
                    tails,
                });
            }
        }

        let mut cell = Cell::default();
        if !sources.is_empty() {
            if self.sentence.options().cube_pruning {
                self.cube_prune(&sources, i, j, &mut cell)?;
            } else {
                self.exhaustive(&sources, i, j, &mut cell)?;
            }
        }
        cell.finish(&self.hg);
        trace!(i, j, sources = sources.len(), nodes = cell.len(), "cell filled");
        if cell.is_empty() {
            return Ok(());
        }

        for dots in &mut self.dots {
            if dots.allows(width) {
                dots.extend_seed(i, j, &cell);
            }
        }
        self.cells.insert((i, j), cell);
        Ok(())
    }

    fn score(&self, src: &CubeSource<'_>, ranks: &[usize], i: usize, j: usize) -> NodeResult {
        let rule = &src.rules[ranks[0]];
        let tails: Vec<&HGNode> = src
            .tails
            .iter()
            .zip(&ranks[1..])
            .map(|(list, &r)| self.hg.node(list[r]))
            .collect();
        self.features.compute(&Transition {
            rule,
            tails: &tails,
            i,
            j,
            sentence: self.sentence,
        })
    }

    fn add_item(
        &mut self,
        cell: &mut Cell,
        src: &CubeSource<'_>,
        ranks: &[usize],
        result: NodeResult,
        i: usize,
        j: usize,
    ) -> Result<(), SearchError> {
        let rule = &src.rules[ranks[0]];
        let tails = src
            .tails
            .iter()
            .zip(&ranks[1..])
            .map(|(list, &r)| list[r])
            .collect();
        let edge = HyperEdge {
            rule: Some(Arc::clone(rule)),
            tails,
            score: result.viterbi,
            transition: result.transition,
        };
        if cell.insert(&mut self.hg, i, j, rule.lhs(), result.states, edge) {
            self.stats.recombined += 1;
        }
        check_budget(&self.hg, self.sentence.options().max_nodes)
    }

    /// Pops up to `pop_limit` candidates, best estimate first, pushing the
    /// neighbours of each popped one along every axis.
    fn cube_prune(
        &mut self,
        sources: &[CubeSource<'_>],
        i: usize,
        j: usize,
        cell: &mut Cell,
    ) -> Result<(), SearchError> {
        let mut heap = BinaryHeap::new();
        let mut visited: HashSet<(usize, Vec<usize>)> = HashSet::new();
        let mut seq = 0;
        for (s, src) in sources.iter().enumerate() {
            if src.dims().contains(&0) {
                continue;
            }
            let ranks = vec![0; src.tails.len() + 1];
            visited.insert((s, ranks.clone()));
            heap.push(Queued::new(self.score(src, &ranks, i, j), (s, ranks), seq));
            seq += 1;
        }

        let pop_limit = self.sentence.options().pop_limit;
        let mut pops = 0;
        while pops < pop_limit {
            let Some(q) = heap.pop() else {
                break;
            };
            pops += 1;
            let (s, ranks) = q.cand;
            let src = &sources[s];
            self.add_item(cell, src, &ranks, q.result, i, j)?;

            let dims = src.dims();
            for d in 0..ranks.len() {
                let mut next = ranks.clone();
                next[d] += 1;
                if next[d] >= dims[d] || !visited.insert((s, next.clone())) {
                    continue;
                }
                heap.push(Queued::new(self.score(src, &next, i, j), (s, next), seq));
                seq += 1;
            }
        }
        self.stats.candidates += seq;
        self.stats.max_pops = self.stats.max_pops.max(pops);
        Ok(())
    }

    /// Scores every rule against every antecedent combination.
    fn exhaustive(
        &mut self,
        sources: &[CubeSource<'_>],
        i: usize,
        j: usize,
        cell: &mut Cell,
    ) -> Result<(), SearchError> {
        let mut scored = 0;
        for src in sources {
            let dims = src.dims();
            if dims.contains(&0) {
                continue;
            }
            let mut ranks = vec![0; dims.len()];
            loop {
                let result = self.score(src, &ranks, i, j);
                self.add_item(cell, src, &ranks, result, i, j)?;
                scored += 1;
                if !next_combination(&mut ranks, &dims) {
                    break;
                }
            }
        }
        self.stats.candidates += scored;
        self.stats.max_pops = self.stats.max_pops.max(scored);
        Ok(())
    }

    /// Adds a goal root with one edge per goal-labelled item spanning the
    /// whole input, scored by the final transition.
    fn finish(mut self) -> (HyperGraph, SearchStats) {
        let n = self.input.len();
        let finals = self
            .cells
            .get(&(0, n))
            .map(|c| c.nodes_with(self.goal).to_vec())
            .unwrap_or_default();
        let mut root: Option<NodeId> = None;
        for node in finals {
            let tail = self.hg.node(node);
            let transition = self.features.compute_final(tail, self.sentence);
            let edge = HyperEdge {
                rule: None,
                tails: vec![node],
                score: tail.score() + transition,
                transition,
            };
            match root {
                Some(r) => {
                    self.hg.add_edge(r, edge);
                }
                None => {
                    root = Some(
                        self.hg
                            .add_node(0, n, self.goal, StateTuple::empty(), edge),
                    );
                }
            }
        }
        if let Some(r) = root {
            self.hg.set_goal(r);
        }
        self.stats.nodes = self.hg.num_nodes();
        self.stats.edges = self.hg.num_edges();
        (self.hg, self.stats)
    }
}

/// Advances `ranks` like an odometer over `dims`; false after the last
/// combination.
fn next_combination(ranks: &mut [usize], dims: &[usize]) -> bool {
    for d in 0..ranks.len() {
        ranks[d] += 1;
        if ranks[d] < dims[d] {
            return true;
        }
        ranks[d] = 0;
    }
    false
}
