use std::collections::HashMap;

use crate::grammar::{Grammar, TrieNode};
use crate::vocab::Symbol;

use super::cell::Cell;

/// A nonterminal of a partially matched rule, bound to the cell `[i, j)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SuperRef {
    pub i: usize,
    pub j: usize,
    pub label: Symbol,
}

/// A rule prefix matched over some span: where it stands in the trie and
/// which cells its nonterminals were matched against.
#[derive(Debug, Clone)]
pub(crate) struct DotItem<'g> {
    pub node: &'g TrieNode,
    pub tails: Vec<SuperRef>,
}

/// Partial matches of one grammar's rules, by span.
pub(crate) struct DotChart<'g> {
    root: &'g TrieNode,
    span_limit: Option<usize>,
    items: HashMap<(usize, usize), Vec<DotItem<'g>>>,
}

impl<'g> DotChart<'g> {
    /// Seeds an empty match at every start position of an input of `len`
    /// symbols.
    pub fn new(grammar: &'g dyn Grammar, len: usize) -> Self {
        let root = grammar.root();
        let items = (0..len)
            .map(|i| {
                let seed = DotItem {
                    node: root,
                    tails: Vec::new(),
                };
                ((i, i), vec![seed])
            })
            .collect();
        Self {
            root,
            span_limit: grammar.span_limit(),
            items,
        }
    }

    /// Whether rules of this grammar may cover a span of `width` words.
    pub fn allows(&self, width: usize) -> bool {
        self.span_limit.map_or(true, |limit| width <= limit)
    }

    /// Builds the matches over `[i, j)` from shorter ones: a terminal
    /// `input[j - 1]` after a match over `[i, j - 1)`, or a finished cell
    /// `[k, j)` after a match over `[i, k)` with `i < k`.
    pub fn expand(
        &mut self,
        i: usize,
        j: usize,
        input: &[Symbol],
        cells: &HashMap<(usize, usize), Cell>,
    ) {
        let mut found = Vec::new();
        if let Some(prev) = self.items.get(&(i, j - 1)) {
            for d in prev {
                if let Some(child) = d.node.child(input[j - 1]) {
                    found.push(DotItem {
                        node: child,
                        tails: d.tails.clone(),
                    });
                }
            }
        }
        for k in i + 1..j {
            let (Some(prev), Some(cell)) = (self.items.get(&(i, k)), cells.get(&(k, j))) else {
                continue;
            };
            for d in prev {
                extend_over(d, cell, k, j, &mut found);
            }
        }
        if !found.is_empty() {
            self.items.entry((i, j)).or_default().extend(found);
        }
    }

    /// Starts matches whose first symbol is a nonterminal covering the
    /// freshly finished cell `[i, j)`.
    pub fn extend_seed(&mut self, i: usize, j: usize, cell: &Cell) {
        let seed = DotItem {
            node: self.root,
            tails: Vec::new(),
        };
        let mut found = Vec::new();
        extend_over(&seed, cell, i, j, &mut found);
        if !found.is_empty() {
            self.items.entry((i, j)).or_default().extend(found);
        }
    }

    /// Trie nodes reached over `[i, j)` that carry rules, with their
    /// antecedent cells. Only matches ending in a terminal or a shorter
    /// nonterminal are complete here; prefixes started by `extend_seed`
    /// are added after the span is filled.
    pub fn completed(&self, i: usize, j: usize) -> impl Iterator<Item = &DotItem<'g>> {
        self.items
            .get(&(i, j))
            .into_iter()
            .flatten()
            .filter(|d| d.node.has_rules())
    }
}

fn extend_over<'g>(
    d: &DotItem<'g>,
    cell: &Cell,
    k: usize,
    j: usize,
    out: &mut Vec<DotItem<'g>>,
) {
    for (label, child) in d.node.nonterminal_children() {
        if !cell.has_label(label) {
            continue;
        }
        let mut tails = d.tails.clone();
        tails.push(SuperRef { i: k, j, label });
        out.push(DotItem { node: child, tails });
    }
}
