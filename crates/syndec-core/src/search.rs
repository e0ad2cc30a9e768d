//! Pieces shared by the chart and stack searches.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::feature::NodeResult;
use crate::hypergraph::HyperGraph;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("search abandoned after {nodes} nodes (limit {limit})")]
    ResourceExhausted { nodes: usize, limit: usize },
}

/// Fails once the hypergraph holds more than `limit` nodes.
pub(crate) fn check_budget(hg: &HyperGraph, limit: usize) -> Result<(), SearchError> {
    let nodes = hg.num_nodes();
    if nodes > limit {
        return Err(SearchError::ResourceExhausted { nodes, limit });
    }
    Ok(())
}

/// A scored cube-pruning candidate on a max-heap.
///
/// Ordered by pruning estimate; ties go to the candidate pushed first so
/// that results do not depend on heap internals.
pub(crate) struct Queued<C> {
    pub priority: OrderedFloat<f32>,
    pub seq: usize,
    pub result: NodeResult,
    pub cand: C,
}

impl<C> Queued<C> {
    pub fn new(result: NodeResult, cand: C, seq: usize) -> Self {
        Self {
            priority: OrderedFloat(result.pruning_estimate()),
            seq,
            result,
            cand,
        }
    }
}

impl<C> PartialEq for Queued<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C> Eq for Queued<C> {}

impl<C> PartialOrd for Queued<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Queued<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;
    use crate::feature::StateTuple;
    use crate::hypergraph::HyperEdge;
    use crate::vocab::Symbol;

    fn result(viterbi: f32, future: f32) -> NodeResult {
        NodeResult {
            transition: viterbi,
            viterbi,
            future,
            states: StateTuple::empty(),
        }
    }

    #[test]
    fn heap_pops_best_estimate_then_oldest() {
        let mut heap = BinaryHeap::new();
        heap.push(Queued::new(result(-2.0, 0.0), "b", 0));
        heap.push(Queued::new(result(-1.0, -0.5), "a", 1));
        heap.push(Queued::new(result(-3.0, 1.0), "c", 2));
        heap.push(Queued::new(result(-5.0, 0.0), "d", 3));
        let order: Vec<&str> = std::iter::from_fn(|| heap.pop().map(|q| q.cand)).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn budget() {
        let mut hg = HyperGraph::new(0);
        let edge = HyperEdge {
            rule: None,
            tails: Vec::new(),
            score: 0.0,
            transition: 0.0,
        };
        hg.add_node(0, 1, Symbol::X, StateTuple::empty(), edge.clone());
        assert!(check_budget(&hg, 1).is_ok());
        hg.add_node(1, 2, Symbol::X, StateTuple::empty(), edge);
        assert_eq!(
            check_budget(&hg, 1),
            Err(SearchError::ResourceExhausted { nodes: 2, limit: 1 })
        );
    }
}
