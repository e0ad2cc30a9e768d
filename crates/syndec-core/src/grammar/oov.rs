use std::sync::Arc;

use tracing::warn;

use crate::context::{Context, OwnerId};
use crate::feature::FeatureVector;
use crate::vocab::Symbol;

use super::{Grammar, GrammarError, MemoryGrammar, Rule, TargetSymbol};

/// True when some grammar can translate `word` on its own.
pub fn has_single_word_rule(grammars: &[Arc<dyn Grammar>], word: Symbol) -> bool {
    grammars
        .iter()
        .any(|g| g.rules_for(&[word]).is_some_and(|c| !c.is_empty()))
}

/// Per-sentence pass-through grammar `[label] → w / w`, owned by `oov`.
///
/// With `true_oovs_only`, only words no grammar covers get a rule. A word
/// that cannot form a rule is skipped; the other words keep theirs.
pub fn oov_grammar(
    words: &[Symbol],
    grammars: &[Arc<dyn Grammar>],
    label: Symbol,
    true_oovs_only: bool,
) -> MemoryGrammar {
    let mut grammar = MemoryGrammar::new(OwnerId::OOV, Some(1));
    let mut seen = Vec::new();
    for &w in words {
        if w.is_boundary() || seen.contains(&w) {
            continue;
        }
        seen.push(w);
        if true_oovs_only && has_single_word_rule(grammars, w) {
            continue;
        }
        match pass_through(label, w) {
            Ok(rule) => grammar.add_rule(rule),
            Err(e) => warn!(word = %w, error = %e, "no pass-through rule"),
        }
    }
    grammar
}

fn pass_through(label: Symbol, word: Symbol) -> Result<Rule, GrammarError> {
    Rule::new(
        label,
        vec![word],
        vec![TargetSymbol::Word(word)],
        FeatureVector::new(),
        vec![(0, 0)],
        OwnerId::OOV,
    )
}

/// Splits uncovered words into characters when every character is
/// translatable on its own; other words pass through untouched.
pub fn segment_oovs(ctx: &Context, words: &[Symbol], grammars: &[Arc<dyn Grammar>]) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(words.len());
    for &w in words {
        if w.is_boundary() || has_single_word_rule(grammars, w) {
            out.push(w);
            continue;
        }
        let surface = ctx.vocab.word(w);
        if surface.chars().count() < 2 {
            out.push(w);
            continue;
        }
        let pieces: Vec<Symbol> = surface
            .chars()
            .map(|c| ctx.vocab.terminal(c.encode_utf8(&mut [0; 4])))
            .collect();
        if pieces.iter().all(|&p| has_single_word_rule(grammars, p)) {
            out.extend(pieces);
        } else {
            out.push(w);
        }
    }
    out
}
