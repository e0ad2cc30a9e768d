use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::OwnerId;
use crate::vocab::Symbol;

use super::{Grammar, Rule, TrieNode};

/// Grammar held entirely in a hash trie.
#[derive(Debug)]
pub struct MemoryGrammar {
    root: TrieNode,
    owner: OwnerId,
    span_limit: Option<usize>,
    max_phrase_len: usize,
    num_rules: usize,
    labels: BTreeSet<Symbol>,
}

impl MemoryGrammar {
    pub fn new(owner: OwnerId, span_limit: Option<usize>) -> Self {
        Self {
            root: TrieNode::default(),
            owner,
            span_limit,
            max_phrase_len: 0,
            num_rules: 0,
            labels: BTreeSet::new(),
        }
    }

    pub fn from_rules(
        owner: OwnerId,
        span_limit: Option<usize>,
        rules: impl IntoIterator<Item = Rule>,
    ) -> Self {
        let mut grammar = Self::new(owner, span_limit);
        for rule in rules {
            grammar.add_rule(rule);
        }
        grammar
    }

    pub fn add_rule(&mut self, rule: Rule) {
        if rule.arity() == 0 {
            self.max_phrase_len = self.max_phrase_len.max(rule.source().len());
        }
        self.labels.insert(rule.lhs());
        self.num_rules += 1;
        self.root.insert(Arc::new(rule));
    }
}

impl Grammar for MemoryGrammar {
    fn root(&self) -> &TrieNode {
        &self.root
    }

    fn owner(&self) -> OwnerId {
        self.owner
    }

    fn span_limit(&self) -> Option<usize> {
        self.span_limit
    }

    fn max_source_phrase_length(&self) -> usize {
        self.max_phrase_len
    }

    fn num_rules(&self) -> usize {
        self.num_rules
    }

    fn lhs_labels(&self) -> Vec<Symbol> {
        self.labels.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::grammar::parse_rule;

    #[test]
    fn lookup_by_source_side() {
        let ctx = Context::new();
        let pt = ctx.owners.id("pt");
        let rules = [
            "[X] ||| a b ||| x y ||| -1",
            "[X] ||| a b ||| y x ||| -2",
            "[X] ||| a ||| x ||| -1",
            "[X] ||| [X,1] c ||| [X,1] z ||| -1",
        ]
        .iter()
        .map(|l| parse_rule(l, &ctx, pt).unwrap());
        let g = MemoryGrammar::from_rules(pt, Some(10), rules);

        assert_eq!(g.num_rules(), 4);
        assert_eq!(g.max_source_phrase_length(), 2);
        assert_eq!(g.lhs_labels(), vec![Symbol::X]);
        let ab = ctx.vocab.ids("a b");
        assert_eq!(g.rules_for(&ab).map(|c| c.len()), Some(2));
        assert!(g.rules_for(&ctx.vocab.ids("b")).is_none());
        assert!(g.root().child(Symbol::X).is_some());
        assert_eq!(g.root().nonterminal_children().count(), 1);
    }
}
