//! Synchronous grammars: rules, the source-side trie, readers, and the
//! per-sentence glue and OOV grammars.

mod glue;
mod hiero;
mod memory;
mod oov;
mod rule;
mod trie;

use tracing::debug_span;

use crate::context::OwnerId;
use crate::feature::FeatureSet;
use crate::vocab::Symbol;

pub use glue::{cky_glue_grammar, PhraseGlue};
pub use hiero::{parse_rule, read_hiero};
pub use memory::MemoryGrammar;
pub use oov::{has_single_word_rule, oov_grammar, segment_oovs};
pub use rule::{Rule, TargetSymbol};
pub use trie::{RuleCollection, TrieNode};

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("malformed rule: {0}")]
    Slot(String),
}

/// A rule source the decoder can match spans against.
pub trait Grammar: Send + Sync {
    fn root(&self) -> &TrieNode;

    fn owner(&self) -> OwnerId;

    /// Longest input span a rule of this grammar may cover in chart
    /// search; `None` means unlimited.
    fn span_limit(&self) -> Option<usize>;

    /// Longest all-terminal source side, bounding phrase lookups.
    fn max_source_phrase_length(&self) -> usize;

    fn num_rules(&self) -> usize;

    /// Left-hand-side labels used by the grammar's rules.
    fn lhs_labels(&self) -> Vec<Symbol>;

    /// Rules whose source side is exactly `source`.
    fn rules_for(&self, source: &[Symbol]) -> Option<&RuleCollection> {
        self.root().walk(source)?.rule_collection()
    }

    /// Eagerly sorts every rule collection.
    fn sort_all(&self, features: &FeatureSet) {
        let _span = debug_span!("sort_grammar", rules = self.num_rules()).entered();
        self.root().for_each_collection(&mut |c| {
            c.sorted_rules(features);
        });
    }
}
