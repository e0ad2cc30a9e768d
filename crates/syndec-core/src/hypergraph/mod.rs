//! Packed search space: an arena of nodes and hyperedges.
//!
//! Nodes are addressed by [`NodeId`] and edges by [`EdgeId`]; tails refer to
//! nodes by id, so the graph has no owning cycles and is freed in one drop.
//! A node keeps every incoming edge plus a pointer to its best one; merging
//! an equivalent item into an existing node (recombination) is just
//! [`HyperGraph::add_edge`].

mod kbest;

use std::sync::Arc;

use serde::Serialize;

use crate::feature::StateTuple;
use crate::grammar::{Rule, TargetSymbol};
use crate::vocab::Symbol;

pub use kbest::{KBestExtractor, KBestItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One way of building a node: a rule applied to tail nodes.
#[derive(Debug, Clone)]
pub struct HyperEdge {
    /// `None` only for edges into the goal root.
    pub rule: Option<Arc<Rule>>,
    /// Tail nodes in source-nonterminal order.
    pub tails: Vec<NodeId>,
    /// Best derivation score through this edge.
    pub score: f32,
    /// Score added by this edge alone.
    pub transition: f32,
}

#[derive(Debug)]
pub struct HGNode {
    pub i: usize,
    pub j: usize,
    pub lhs: Symbol,
    pub states: StateTuple,
    edges: Vec<EdgeId>,
    best: EdgeId,
    score: f32,
}

impl HGNode {
    /// Viterbi (best inside) score.
    #[inline]
    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn best_edge(&self) -> EdgeId {
        self.best
    }
}

/// Size summary of a finished search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub nodes: usize,
    pub edges: usize,
    /// Largest number of pops spent on any single cell or stack.
    pub max_pops: usize,
    /// Candidates scored (pushed onto a frontier).
    pub candidates: usize,
    /// Items merged into an existing node.
    pub recombined: usize,
}

#[derive(Debug, Default)]
pub struct HyperGraph {
    nodes: Vec<HGNode>,
    edges: Vec<HyperEdge>,
    goal: Option<NodeId>,
    source_offset: usize,
}

impl HyperGraph {
    /// `source_offset` is subtracted from node spans when reporting source
    /// positions (1 when the input was wrapped in `<s> … </s>`).
    pub fn new(source_offset: usize) -> Self {
        Self {
            source_offset,
            ..Self::default()
        }
    }

    pub fn add_node(
        &mut self,
        i: usize,
        j: usize,
        lhs: Symbol,
        states: StateTuple,
        edge: HyperEdge,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let edge_id = EdgeId(self.edges.len() as u32);
        let score = edge.score;
        self.edges.push(edge);
        self.nodes.push(HGNode {
            i,
            j,
            lhs,
            states,
            edges: vec![edge_id],
            best: edge_id,
            score,
        });
        id
    }

    /// Adds an incoming edge to `node`, promoting it to best edge when it
    /// scores strictly higher.
    pub fn add_edge(&mut self, node: NodeId, edge: HyperEdge) -> EdgeId {
        let edge_id = EdgeId(self.edges.len() as u32);
        let score = edge.score;
        self.edges.push(edge);
        let n = &mut self.nodes[node.index()];
        n.edges.push(edge_id);
        if score > n.score {
            n.score = score;
            n.best = edge_id;
        }
        edge_id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &HGNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> &HyperEdge {
        &self.edges[id.index()]
    }

    /// Every node with its id, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &HGNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(k, n)| (NodeId(k as u32), n))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn goal(&self) -> Option<NodeId> {
        self.goal
    }

    pub fn set_goal(&mut self, goal: NodeId) {
        self.goal = Some(goal);
    }

    pub fn source_offset(&self) -> usize {
        self.source_offset
    }

    /// Score of the best complete derivation.
    pub fn viterbi_score(&self) -> Option<f32> {
        self.goal.map(|g| self.node(g).score)
    }

    /// Output words of the best derivation, boundary markers removed.
    pub fn viterbi_words(&self) -> Option<Vec<Symbol>> {
        let goal = self.goal?;
        let mut out = Vec::new();
        self.best_yield(goal, &mut out);
        out.retain(|w| !w.is_boundary());
        Some(out)
    }

    fn best_yield(&self, node: NodeId, out: &mut Vec<Symbol>) {
        let edge = self.edge(self.node(node).best);
        match &edge.rule {
            None => {
                for &t in &edge.tails {
                    self.best_yield(t, out);
                }
            }
            Some(rule) => {
                for sym in rule.target() {
                    match *sym {
                        TargetSymbol::Word(w) => out.push(w),
                        TargetSymbol::Slot(k) => {
                            if let Some(&t) = edge.tails.get(k) {
                                self.best_yield(t, out);
                            }
                        }
                    }
                }
            }
        }
    }
}
