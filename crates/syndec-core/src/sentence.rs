//! Input sentences and their per-sentence search options.

use serde::Serialize;

use crate::config::SearchAlgorithm;
use crate::context::Context;
use crate::vocab::{Symbol, Vocabulary};

/// Separator between source text and a target constraint on one input line.
pub const CONSTRAINT_SEPARATOR: &str = "|||";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SentenceError {
    #[error("invalid value for {field}: {reason}")]
    InvalidOption { field: &'static str, reason: String },
    #[error("conflicting options: {0}")]
    Conflict(String),
}

/// Knobs that may differ from one sentence to the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOptions {
    pub algorithm: SearchAlgorithm,
    /// Candidates popped per chart cell or stack.
    pub pop_limit: usize,
    /// Phrase options kept per source span in stack search.
    pub num_translation_options: usize,
    /// Furthest a phrase may start past the first uncovered word.
    pub reordering_limit: usize,
    pub cube_pruning: bool,
    /// Node budget; exceeding it abandons the sentence.
    pub max_nodes: usize,
    pub inject_oovs: bool,
    pub segment_oovs: bool,
    pub true_oovs_only: bool,
    pub top_n: usize,
    pub unique_hypotheses: bool,
    pub include_features: bool,
    pub include_alignment: bool,
}

impl SearchOptions {
    /// Rejects malformed or contradictory options before any search starts.
    pub fn validate(&self, constrained: bool) -> Result<(), SentenceError> {
        macro_rules! check_positive {
            ($field:ident) => {
                if self.$field == 0 {
                    return Err(SentenceError::InvalidOption {
                        field: stringify!($field),
                        reason: "must be positive".to_string(),
                    });
                }
            };
        }
        check_positive!(pop_limit);
        check_positive!(num_translation_options);
        check_positive!(max_nodes);
        check_positive!(top_n);

        if self.algorithm == SearchAlgorithm::Stack && !self.cube_pruning {
            return Err(SentenceError::Conflict(
                "stack search always uses cube pruning".to_string(),
            ));
        }
        if constrained && self.algorithm != SearchAlgorithm::Stack {
            return Err(SentenceError::Conflict(
                "a target constraint requires stack search".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        crate::config::DecoderConfig::default().search_options()
    }
}

/// Target words a constrained decode must reproduce, kept both as symbols
/// and as the surface string `<s> … </s>` that candidates are matched in.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConstraint {
    words: Vec<Symbol>,
    surface: String,
}

impl TargetConstraint {
    pub fn new(vocab: &Vocabulary, words: Vec<Symbol>) -> Self {
        let mut surface = String::from("<s>");
        if !words.is_empty() {
            surface.push(' ');
            surface.push_str(&vocab.words(&words));
        }
        surface.push_str(" </s>");
        Self { words, surface }
    }

    pub fn words(&self) -> &[Symbol] {
        &self.words
    }

    /// True when the surface of `words` is a substring of `<s> target </s>`.
    ///
    /// This is plain string containment, so a partial word also matches
    /// (`the cat` is accepted for `the cats`). It can keep a hypothesis that
    /// never completes the target but never rejects one that does.
    pub fn allows(&self, vocab: &Vocabulary, words: &[Symbol]) -> bool {
        words.is_empty() || self.surface.contains(&vocab.words(words))
    }
}

/// One input sentence: source words, an optional target constraint, and the
/// options it is decoded with. Options are validated on construction.
#[derive(Debug, Clone)]
pub struct Sentence {
    id: usize,
    words: Vec<Symbol>,
    target: Option<TargetConstraint>,
    options: SearchOptions,
}

impl Sentence {
    pub fn new(
        id: usize,
        words: Vec<Symbol>,
        target: Option<TargetConstraint>,
        options: SearchOptions,
    ) -> Result<Self, SentenceError> {
        options.validate(target.is_some())?;
        Ok(Self {
            id,
            words,
            target,
            options,
        })
    }

    /// Parses `source words` or `source words ||| target words`. Every
    /// token is a word, even one written like `[X]`.
    pub fn parse(
        ctx: &Context,
        id: usize,
        line: &str,
        options: SearchOptions,
    ) -> Result<Self, SentenceError> {
        let (source, target) = match line.split_once(CONSTRAINT_SEPARATOR) {
            Some((s, t)) => {
                let target = TargetConstraint::new(&ctx.vocab, ctx.vocab.terminal_ids(t));
                (s, Some(target))
            }
            None => (line, None),
        };
        Self::new(id, ctx.vocab.terminal_ids(source), target, options)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn words(&self) -> &[Symbol] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn target(&self) -> Option<&TargetConstraint> {
        self.target.as_ref()
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// The same sentence over different source words (after OOV
    /// segmentation).
    pub(crate) fn with_words(&self, words: Vec<Symbol>) -> Self {
        Self {
            id: self.id,
            words,
            target: self.target.clone(),
            options: self.options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_options() -> SearchOptions {
        SearchOptions {
            algorithm: SearchAlgorithm::Stack,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn parse_plain_sentence() {
        let ctx = Context::new();
        let s = Sentence::parse(&ctx, 7, "le chat", SearchOptions::default()).unwrap();
        assert_eq!(s.id(), 7);
        assert_eq!(s.len(), 2);
        assert!(s.target().is_none());
    }

    #[test]
    fn parse_constrained_sentence() {
        let ctx = Context::new();
        let s = Sentence::parse(&ctx, 0, "le chat ||| the cat", stack_options()).unwrap();
        assert_eq!(ctx.vocab.words(s.words()), "le chat");
        let target = s.target().unwrap();
        assert_eq!(ctx.vocab.words(target.words()), "the cat");
        let allows = |words: &[Symbol]| target.allows(&ctx.vocab, words);
        assert!(allows(&ctx.vocab.ids("the cat")));
        assert!(allows(&ctx.vocab.ids("cat")));
        assert!(!allows(&ctx.vocab.ids("cat the")));
        assert!(!allows(&ctx.vocab.ids("the dog")));
        assert!(allows(&[Symbol::BOS, ctx.vocab.id("the")]));
        assert!(!allows(&[Symbol::BOS, ctx.vocab.id("cat")]));
        assert!(allows(&[ctx.vocab.id("cat"), Symbol::EOS]));
    }

    #[test]
    fn constraint_matches_inside_words() {
        let ctx = Context::new();
        let s = Sentence::parse(&ctx, 0, "les chats ||| the cats", stack_options()).unwrap();
        let target = s.target().unwrap();
        assert!(target.allows(&ctx.vocab, &ctx.vocab.ids("the cat")));
        assert!(target.allows(&ctx.vocab, &ctx.vocab.ids("he ca")));
        assert!(!target.allows(&ctx.vocab, &ctx.vocab.ids("cats the")));
    }

    #[test]
    fn bracketed_tokens_are_words() {
        let ctx = Context::new();
        let s = Sentence::parse(&ctx, 0, "a [1] [X]", SearchOptions::default()).unwrap();
        assert!(s.words().iter().all(|w| !w.is_nonterminal()));
        assert_ne!(s.words()[2], Symbol::X);
        assert_eq!(ctx.vocab.words(s.words()), "a [1] [X]");
    }

    #[test]
    fn constraint_requires_stack_search() {
        let ctx = Context::new();
        let err = Sentence::parse(&ctx, 0, "a ||| b", SearchOptions::default()).unwrap_err();
        assert!(matches!(err, SentenceError::Conflict(_)));
    }

    #[test]
    fn malformed_options_fail_fast() {
        let opts = SearchOptions {
            pop_limit: 0,
            ..SearchOptions::default()
        };
        let err = Sentence::new(0, Vec::new(), None, opts).unwrap_err();
        assert_eq!(
            err,
            SentenceError::InvalidOption {
                field: "pop_limit",
                reason: "must be positive".to_string()
            }
        );

        let opts = SearchOptions {
            cube_pruning: false,
            ..stack_options()
        };
        assert!(Sentence::new(0, Vec::new(), None, opts).is_err());
    }

    #[test]
    fn empty_sentence_is_valid() {
        let s = Sentence::new(3, Vec::new(), None, SearchOptions::default()).unwrap();
        assert!(s.is_empty());
    }
}
