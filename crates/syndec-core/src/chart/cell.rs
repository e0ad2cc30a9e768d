use std::collections::HashMap;

use crate::feature::StateTuple;
use crate::hypergraph::{HyperEdge, HyperGraph, NodeId};
use crate::vocab::Symbol;

/// Nodes built over one span `[i, j)`.
///
/// While the span is being filled, items with the same label and state
/// tuple are merged into one node. Once finished, nodes are grouped by label
/// and sorted best-first for use as antecedents of larger spans.
#[derive(Debug, Default)]
pub(crate) struct Cell {
    index: HashMap<(Symbol, StateTuple), NodeId>,
    by_label: HashMap<Symbol, Vec<NodeId>>,
}

impl Cell {
    /// Adds `edge` as a new node or as another way of building an existing
    /// one. Returns true when it was merged.
    pub fn insert(
        &mut self,
        hg: &mut HyperGraph,
        i: usize,
        j: usize,
        lhs: Symbol,
        states: StateTuple,
        edge: HyperEdge,
    ) -> bool {
        if let Some(&node) = self.index.get(&(lhs, states.clone())) {
            hg.add_edge(node, edge);
            return true;
        }
        let node = hg.add_node(i, j, lhs, states.clone(), edge);
        self.index.insert((lhs, states), node);
        self.by_label.entry(lhs).or_default().push(node);
        false
    }

    /// Sorts each label's nodes best-first; ties keep creation order.
    pub fn finish(&mut self, hg: &HyperGraph) {
        for nodes in self.by_label.values_mut() {
            nodes.sort_by(|a, b| {
                hg.node(*b)
                    .score()
                    .total_cmp(&hg.node(*a).score())
                    .then_with(|| a.cmp(b))
            });
        }
    }

    pub fn nodes_with(&self, label: Symbol) -> &[NodeId] {
        self.by_label.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_label(&self, label: Symbol) -> bool {
        self.by_label.contains_key(&label)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(score: f32) -> HyperEdge {
        HyperEdge {
            rule: None,
            tails: Vec::new(),
            score,
            transition: score,
        }
    }

    #[test]
    fn merges_equal_signatures_and_sorts() {
        let mut hg = HyperGraph::new(0);
        let mut cell = Cell::default();
        assert!(!cell.insert(&mut hg, 0, 2, Symbol::X, StateTuple::empty(), edge(-4.0)));
        assert!(!cell.insert(&mut hg, 0, 2, Symbol::GOAL, StateTuple::empty(), edge(-1.0)));
        assert!(cell.insert(&mut hg, 0, 2, Symbol::X, StateTuple::empty(), edge(-2.0)));
        cell.finish(&hg);

        assert_eq!(cell.len(), 2);
        let xs = cell.nodes_with(Symbol::X);
        assert_eq!(xs.len(), 1);
        assert_eq!(hg.node(xs[0]).score(), -2.0);
        assert_eq!(hg.node(xs[0]).edges().len(), 2);
        assert!(cell.has_label(Symbol::GOAL));
    }
}
