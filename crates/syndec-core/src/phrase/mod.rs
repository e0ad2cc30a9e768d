//! Coverage-stack search with cube pruning, for phrase grammars.
//!
//! Stack `k` holds hypotheses covering `k` source words. A hypothesis is a
//! `[GOAL]` node built from a shorter hypothesis and one phrase option by a
//! straight or inverted glue rule. Stacks are filled in order of coverage;
//! each one runs cube pruning over (hypothesis rank, phrase rank) cubes,
//! prioritised by score plus the future-cost estimate of what is left.

mod coverage;
mod future;
mod options;

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, debug_span, trace};

use crate::context::Context;
use crate::feature::{FeatureSet, NodeResult, StateTuple, Transition};
use crate::grammar::{Grammar, PhraseGlue, TargetSymbol};
use crate::hypergraph::{HGNode, HyperEdge, HyperGraph, NodeId, SearchStats};
use crate::search::{check_budget, Queued, SearchError};
use crate::sentence::Sentence;
use crate::vocab::Symbol;

pub use coverage::Coverage;
pub use future::FutureCosts;
pub use options::PhraseChart;

/// Builds the hypergraph of `sentence` over phrase `grammars`.
///
/// A sentence some word of which nothing translates yields a hypergraph
/// without a goal.
pub fn stack_search(
    ctx: &Context,
    sentence: &Sentence,
    grammars: &[Arc<dyn Grammar>],
    glue: &PhraseGlue,
    features: &FeatureSet,
) -> Result<(HyperGraph, SearchStats), SearchError> {
    let _span = debug_span!("stack_search", sentence_id = sentence.id(), words = sentence.len())
        .entered();
    let n = sentence.len();
    let mut hg = HyperGraph::new(0);
    let chart = PhraseChart::build(sentence, grammars, features, &mut hg)?;
    let future = FutureCosts::new(n, |b, e| chart.best_score(&hg, b, e));

    let mut search = StackSearch {
        ctx,
        sentence,
        glue,
        features,
        chart: &chart,
        future: &future,
        hg,
        stacks: (0..=n).map(|_| Stack::default()).collect(),
        stats: SearchStats::default(),
    };
    search.start()?;
    for covered in 1..=n {
        search.fill(covered)?;
    }
    let (hg, stats) = search.finish();
    debug!(
        nodes = stats.nodes,
        edges = stats.edges,
        max_pops = stats.max_pops,
        best_score = hg.viterbi_score(),
        "stack search done"
    );
    Ok((hg, stats))
}

/// A stack entry: a `[GOAL]` node plus what extension needs to know.
#[derive(Debug, Clone)]
struct Hypothesis {
    node: NodeId,
    coverage: Coverage,
    /// End of the most recently translated phrase.
    last_end: usize,
    /// Node of the most recently translated phrase; `None` for the empty
    /// hypothesis, whose own node holds `<s>`.
    last_phrase: Option<NodeId>,
}

/// Hypotheses with the same number of covered words, merged on
/// (coverage, last end, state tuple) and grouped by coverage.
#[derive(Debug, Default)]
struct Stack {
    hyps: Vec<Hypothesis>,
    index: HashMap<(Coverage, usize, StateTuple), usize>,
    groups: Vec<(Coverage, Vec<usize>)>,
    group_of: HashMap<Coverage, usize>,
}

impl Stack {
    /// Adds a new hypothesis or merges `edge` into an equivalent one.
    /// Returns true when merged.
    fn insert(&mut self, hg: &mut HyperGraph, hyp: PendingHypothesis, edge: HyperEdge) -> bool {
        let key = (hyp.coverage.clone(), hyp.last_end, hyp.states.clone());
        if let Some(&h) = self.index.get(&key) {
            hg.add_edge(self.hyps[h].node, edge);
            return true;
        }
        let node = hg.add_node(hyp.i, hyp.last_end, hyp.lhs, hyp.states, edge);
        let h = self.hyps.len();
        self.hyps.push(Hypothesis {
            node,
            coverage: hyp.coverage.clone(),
            last_end: hyp.last_end,
            last_phrase: hyp.last_phrase,
        });
        self.index.insert(key, h);
        let g = match self.group_of.get(&hyp.coverage) {
            Some(&g) => g,
            None => {
                self.groups.push((hyp.coverage.clone(), Vec::new()));
                self.group_of.insert(hyp.coverage, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[g].1.push(h);
        false
    }

    /// Sorts every coverage group best-first.
    fn finish(&mut self, hg: &HyperGraph) {
        let hyps = &self.hyps;
        for (_, members) in &mut self.groups {
            members.sort_by(|&a, &b| {
                hg.node(hyps[b].node)
                    .score()
                    .total_cmp(&hg.node(hyps[a].node).score())
                    .then_with(|| a.cmp(&b))
            });
        }
    }
}

struct PendingHypothesis {
    i: usize,
    lhs: Symbol,
    coverage: Coverage,
    last_end: usize,
    last_phrase: Option<NodeId>,
    states: StateTuple,
}

/// One cube: the sorted hypotheses of a coverage group in stack `from`
/// against the options of span `[begin, end)`.
struct Cube {
    from: usize,
    group: usize,
    begin: usize,
    end: usize,
}

/// (cube, hypothesis rank, phrase rank)
type Candidate = (usize, usize, usize);

#[derive(Default)]
struct Frontier {
    heap: BinaryHeap<Queued<Candidate>>,
    visited: HashSet<Candidate>,
    seq: usize,
}

struct StackSearch<'a> {
    ctx: &'a Context,
    sentence: &'a Sentence,
    glue: &'a PhraseGlue,
    features: &'a FeatureSet,
    chart: &'a PhraseChart,
    future: &'a FutureCosts,
    hg: HyperGraph,
    stacks: Vec<Stack>,
    stats: SearchStats,
}

impl StackSearch<'_> {
    /// Seeds stack 0 with the empty hypothesis `[GOAL] → <s>`.
    fn start(&mut self) -> Result<(), SearchError> {
        let rule = &self.glue.begin;
        let result = self.features.compute(&Transition {
            rule,
            tails: &[],
            i: 0,
            j: 0,
            sentence: self.sentence,
        });
        let edge = HyperEdge {
            rule: Some(Arc::clone(rule)),
            tails: Vec::new(),
            score: result.viterbi,
            transition: result.transition,
        };
        let pending = PendingHypothesis {
            i: 0,
            lhs: rule.lhs(),
            coverage: Coverage::new(self.sentence.len()),
            last_end: 0,
            last_phrase: None,
            states: result.states,
        };
        let mut stack = Stack::default();
        stack.insert(&mut self.hg, pending, edge);
        self.stacks[0] = stack;
        check_budget(&self.hg, self.sentence.options().max_nodes)
    }

    /// Fills the stack of hypotheses covering `covered` words.
    fn fill(&mut self, covered: usize) -> Result<(), SearchError> {
        let opts = self.sentence.options();
        let n = self.sentence.len();
        let max_len = self.chart.max_source_phrase_length();

        let mut cubes = Vec::new();
        for len in 1..=covered.min(max_len) {
            let from = covered - len;
            for (g, (coverage, _)) in self.stacks[from].groups.iter().enumerate() {
                let first = coverage.first_uncovered();
                let last_begin = (first + opts.reordering_limit).min(n.saturating_sub(len));
                for begin in first..=last_begin {
                    let end = begin + len;
                    let fits = coverage.compatible(begin, end);
                    if !fits || self.chart.options(begin, end).is_empty() {
                        continue;
                    }
                    cubes.push(Cube {
                        from,
                        group: g,
                        begin,
                        end,
                    });
                }
            }
        }

        let mut frontier = Frontier::default();
        for c in 0..cubes.len() {
            self.push_candidate(&cubes, c, 0, 0, &mut frontier);
        }

        let mut stack = Stack::default();
        let mut pops = 0;
        while pops < opts.pop_limit {
            let Some(q) = frontier.heap.pop() else {
                break;
            };
            pops += 1;
            let (c, hyp_rank, phrase_rank) = q.cand;
            self.accept(&cubes[c], hyp_rank, phrase_rank, q.result, &mut stack)?;
            self.push_candidate(&cubes, c, hyp_rank + 1, phrase_rank, &mut frontier);
            self.push_candidate(&cubes, c, hyp_rank, phrase_rank + 1, &mut frontier);
        }
        stack.finish(&self.hg);
        trace!(covered, cubes = cubes.len(), pops, hyps = stack.hyps.len(), "stack filled");
        self.stats.candidates += frontier.seq;
        self.stats.max_pops = self.stats.max_pops.max(pops);
        self.stacks[covered] = stack;
        Ok(())
    }

    fn hypothesis(&self, cube: &Cube, rank: usize) -> Option<&Hypothesis> {
        let (_, members) = &self.stacks[cube.from].groups[cube.group];
        members.get(rank).map(|&h| &self.stacks[cube.from].hyps[h])
    }

    /// Scores candidate (`hyp_rank`, `phrase_rank`) of cube `c` and queues
    /// it. A candidate whose output leaves the target constraint is
    /// skipped in favour of the next phrase option.
    fn push_candidate(
        &self,
        cubes: &[Cube],
        c: usize,
        hyp_rank: usize,
        mut phrase_rank: usize,
        frontier: &mut Frontier,
    ) {
        let cube = &cubes[c];
        let phrases = self.chart.options(cube.begin, cube.end);
        loop {
            let Some(hyp) = self.hypothesis(cube, hyp_rank) else {
                return;
            };
            let Some(&phrase) = phrases.get(phrase_rank) else {
                return;
            };
            if !frontier.visited.insert((c, hyp_rank, phrase_rank)) {
                return;
            }
            if !self.extends_target(hyp, phrase) {
                phrase_rank += 1;
                continue;
            }
            let result = self.score(cube, hyp, phrase);
            let seq = frontier.seq;
            frontier
                .heap
                .push(Queued::new(result, (c, hyp_rank, phrase_rank), seq));
            frontier.seq += 1;
            return;
        }
    }

    /// Constrained decoding: the words of the hypothesis's last phrase
    /// followed by the new phrase's words must occur in the target.
    fn extends_target(&self, hyp: &Hypothesis, phrase: NodeId) -> bool {
        let Some(target) = self.sentence.target() else {
            return true;
        };
        let mut words = self.phrase_words(hyp.last_phrase.unwrap_or(hyp.node));
        words.extend(self.phrase_words(phrase));
        target.allows(&self.ctx.vocab, &words)
    }

    fn phrase_words(&self, node: NodeId) -> Vec<Symbol> {
        let edge = self.hg.edge(self.hg.node(node).best_edge());
        edge.rule
            .iter()
            .flat_map(|r| r.target())
            .filter_map(|t| match *t {
                TargetSymbol::Word(w) => Some(w),
                TargetSymbol::Slot(_) => None,
            })
            .collect()
    }

    /// Straight when the phrase ends after the hypothesis's last phrase,
    /// inverted otherwise.
    fn score(&self, cube: &Cube, hyp: &Hypothesis, phrase: NodeId) -> NodeResult {
        let straight = hyp.last_end < cube.end;
        let hyp_node = self.hg.node(hyp.node);
        let phrase_node = self.hg.node(phrase);
        let (rule, tails): (_, [&HGNode; 2]) = if straight {
            (&self.glue.straight, [hyp_node, phrase_node])
        } else {
            (&self.glue.inverted, [phrase_node, hyp_node])
        };
        let mut result = self.features.compute(&Transition {
            rule,
            tails: &tails,
            i: cube.begin,
            j: cube.end,
            sentence: self.sentence,
        });
        let coverage = hyp.coverage.with_span(cube.begin, cube.end);
        result.future += self.future.estimate(&coverage);
        result
    }

    fn accept(
        &mut self,
        cube: &Cube,
        hyp_rank: usize,
        phrase_rank: usize,
        result: NodeResult,
        stack: &mut Stack,
    ) -> Result<(), SearchError> {
        let Some(hyp) = self.hypothesis(cube, hyp_rank).cloned() else {
            return Ok(());
        };
        let phrase = self.chart.options(cube.begin, cube.end)[phrase_rank];
        let straight = hyp.last_end < cube.end;
        let (rule, tails) = if straight {
            (&self.glue.straight, vec![hyp.node, phrase])
        } else {
            (&self.glue.inverted, vec![phrase, hyp.node])
        };
        let edge = HyperEdge {
            rule: Some(Arc::clone(rule)),
            tails,
            score: result.viterbi,
            transition: result.transition,
        };
        let pending = PendingHypothesis {
            i: cube.begin,
            lhs: rule.lhs(),
            coverage: hyp.coverage.with_span(cube.begin, cube.end),
            last_end: cube.end,
            last_phrase: Some(phrase),
            states: result.states,
        };
        if stack.insert(&mut self.hg, pending, edge) {
            self.stats.recombined += 1;
        }
        check_budget(&self.hg, self.sentence.options().max_nodes)
    }

    /// Adds a goal root over every complete hypothesis, scored by the
    /// final transition.
    fn finish(mut self) -> (HyperGraph, SearchStats) {
        let n = self.sentence.len();
        let finals: Vec<NodeId> = self.stacks[n].hyps.iter().map(|h| h.node).collect();
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
            let goal = tail.lhs;
            match root {
                Some(r) => {
                    self.hg.add_edge(r, edge);
                }
                None => {
                    root = Some(self.hg.add_node(0, n, goal, StateTuple::empty(), edge));
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
