use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use ordered_float::OrderedFloat;
use tracing::trace;

use crate::feature::FeatureSet;
use crate::vocab::Symbol;

use super::Rule;

/// All rules sharing one source side.
///
/// Rules are kept in insertion order; the score-sorted view is built on the
/// first request and then reused, so concurrent sentences sort at most once.
#[derive(Debug, Default)]
pub struct RuleCollection {
    rules: Vec<Arc<Rule>>,
    sorted: OnceLock<Vec<Arc<Rule>>>,
}

impl RuleCollection {
    pub fn push(&mut self, rule: Arc<Rule>) {
        self.rules.push(rule);
        // A new rule invalidates any earlier sort.
        self.sorted = OnceLock::new();
    }

    /// Rules in insertion order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Rules best-first by estimated score. Ties keep insertion order.
    pub fn sorted_rules(&self, features: &FeatureSet) -> &[Arc<Rule>] {
        self.sorted.get_or_init(|| {
            let mut sorted = self.rules.clone();
            sorted.sort_by_cached_key(|r| Reverse(OrderedFloat(features.estimate_rule(r))));
            trace!(rules = sorted.len(), "rule collection sorted");
            sorted
        })
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted.get().is_some()
    }

    /// Number of nonterminals on the shared source side.
    pub fn arity(&self) -> usize {
        self.rules.first().map(|r| r.arity()).unwrap_or(0)
    }

    pub fn source(&self) -> &[Symbol] {
        self.rules.first().map(|r| r.source()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Prefix tree over source sides; terminals and nonterminals both label edges.
#[derive(Debug, Default)]
pub struct TrieNode {
    children: HashMap<Symbol, TrieNode>,
    rules: RuleCollection,
}

impl TrieNode {
    pub fn child(&self, sym: Symbol) -> Option<&TrieNode> {
        self.children.get(&sym)
    }

    /// Nonterminal-labelled children, the ones matched against chart cells.
    pub fn nonterminal_children(&self) -> impl Iterator<Item = (Symbol, &TrieNode)> {
        self.children
            .iter()
            .filter(|(s, _)| s.is_nonterminal())
            .map(|(&s, n)| (s, n))
    }

    pub fn rule_collection(&self) -> Option<&RuleCollection> {
        if self.rules.is_empty() {
            None
        } else {
            Some(&self.rules)
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    pub(crate) fn insert(&mut self, rule: Arc<Rule>) {
        let mut node = self;
        for &sym in rule.source() {
            node = node.children.entry(sym).or_default();
        }
        node.rules.push(rule);
    }

    /// Follows `path` from this node.
    pub fn walk(&self, path: &[Symbol]) -> Option<&TrieNode> {
        let mut node = self;
        for &sym in path {
            node = node.child(sym)?;
        }
        Some(node)
    }

    /// Visits every non-empty collection below (and including) this node.
    pub fn for_each_collection(&self, f: &mut dyn FnMut(&RuleCollection)) {
        if self.has_rules() {
            f(&self.rules);
        }
        for child in self.children.values() {
            child.for_each_collection(f);
        }
    }
}
