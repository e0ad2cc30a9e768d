//! Per-sentence driver: OOV handling, search, extraction.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, debug_span, info, warn};

use crate::config::{ConfigError, DecoderConfig, RuleSorting, SearchAlgorithm};
use crate::context::Context;
use crate::feature::{FeatureError, FeatureRegistry, FeatureSet, FeatureVector};
use crate::grammar::{
    cky_glue_grammar, oov_grammar, read_hiero, segment_oovs, Grammar, GrammarError, PhraseGlue,
};
use crate::hypergraph::{HyperGraph, KBestExtractor, SearchStats};
use crate::search::SearchError;
use crate::sentence::{SearchOptions, Sentence, SentenceError};
use crate::translation::{Derivation, Translation};
use crate::vocab::Symbol;
use crate::{chart, phrase};

#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("grammar {path}: {source}")]
    Grammar {
        path: PathBuf,
        source: GrammarError,
    },
    #[error("feature: {0}")]
    Feature(#[from] FeatureError),
}

/// Grammars, features and default options, shared read-only by every
/// sentence decoded with them.
pub struct Decoder {
    ctx: Arc<Context>,
    grammars: Vec<Arc<dyn Grammar>>,
    cky_glue: Arc<dyn Grammar>,
    phrase_glue: PhraseGlue,
    features: FeatureSet,
    goal: Symbol,
    default_nonterminal: Symbol,
    options: SearchOptions,
}

impl Decoder {
    pub fn new(
        ctx: Arc<Context>,
        config: &DecoderConfig,
        grammars: Vec<Arc<dyn Grammar>>,
        features: FeatureSet,
    ) -> Result<Self, DecoderError> {
        let goal = ctx.vocab.id(&config.search.goal_symbol);
        let default_nonterminal = ctx.vocab.id(&config.search.default_nonterminal);

        let mut labels: Vec<Symbol> = grammars.iter().flat_map(|g| g.lhs_labels()).collect();
        labels.push(default_nonterminal);
        labels.sort();
        labels.dedup();
        let cky_glue = cky_glue_grammar(&ctx, goal, &labels).map_err(|source| {
            DecoderError::Grammar {
                path: PathBuf::from("<glue>"),
                source,
            }
        })?;
        let phrase_glue = PhraseGlue::new(goal).map_err(|source| DecoderError::Grammar {
            path: PathBuf::from("<glue>"),
            source,
        })?;
        let cky_glue: Arc<dyn Grammar> = Arc::new(cky_glue);

        if config.runtime.rule_sorting == RuleSorting::Eager {
            let _span = debug_span!("eager_sort", grammars = grammars.len()).entered();
            for g in grammars.iter().chain(std::iter::once(&cky_glue)) {
                g.sort_all(&features);
            }
        }
        info!(
            grammars = grammars.len(),
            features = features.len(),
            labels = labels.len(),
            "decoder ready"
        );
        Ok(Self {
            ctx,
            grammars,
            cky_glue,
            phrase_glue,
            features,
            goal,
            default_nonterminal,
            options: config.search_options(),
        })
    }

    /// Loads the configured grammars and builds the configured features.
    pub fn from_config(
        config: &DecoderConfig,
        registry: &FeatureRegistry,
    ) -> Result<Self, DecoderError> {
        let ctx = Context::new();
        let mut grammars: Vec<Arc<dyn Grammar>> = Vec::with_capacity(config.grammars.len());
        for g in &config.grammars {
            let owner = ctx.owners.id(&g.owner);
            let grammar = File::open(&g.path)
                .map_err(GrammarError::from)
                .and_then(|f| read_hiero(BufReader::new(f), &ctx, owner, g.span_limit))
                .map_err(|source| DecoderError::Grammar {
                    path: g.path.clone(),
                    source,
                })?;
            info!(
                path = %g.path.display(),
                owner = %g.owner,
                rules = grammar.num_rules(),
                "grammar loaded"
            );
            grammars.push(Arc::new(grammar));
        }
        let functions = registry.create_all(&config.features, &ctx)?;
        let weights = FeatureVector::from_named(
            &ctx.features,
            config.weights.iter().map(|(name, w)| (name.as_str(), *w)),
        );
        let features = FeatureSet::new(functions, weights);
        Self::new(ctx, config, grammars, features)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn grammars(&self) -> &[Arc<dyn Grammar>] {
        &self.grammars
    }

    /// Options sentences get unless they override them.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Parses one input line with the default options.
    pub fn sentence(&self, id: usize, line: &str) -> Result<Sentence, SentenceError> {
        Sentence::parse(&self.ctx, id, line, self.options.clone())
    }

    /// Decodes one sentence. Never fails: a sentence with no derivation, or
    /// whose search was abandoned, gives a translation without derivations.
    pub fn decode(&self, sentence: &Sentence) -> Translation {
        let _span = debug_span!("decode", sentence_id = sentence.id()).entered();
        let source = self.ctx.vocab.words(sentence.words());
        if sentence.is_empty() {
            return Translation::empty(sentence.id(), source);
        }
        match self.search(sentence) {
            Ok(translation) => translation,
            Err(e) => {
                warn!(sentence_id = sentence.id(), error = %e, "search abandoned");
                Translation::failed(sentence.id(), source, e.to_string())
            }
        }
    }

    /// Builds the hypergraph of a non-empty sentence and extracts its
    /// derivations. Per-sentence feature resources live exactly as long as
    /// this call.
    fn search(&self, sentence: &Sentence) -> Result<Translation, SearchError> {
        let opts = sentence.options();
        let sentence = if opts.segment_oovs {
            let words = segment_oovs(&self.ctx, sentence.words(), &self.grammars);
            Cow::Owned(sentence.with_words(words))
        } else {
            Cow::Borrowed(sentence)
        };
        let sentence = sentence.as_ref();

        let mut grammars = self.grammars.clone();
        if opts.inject_oovs {
            grammars.push(Arc::new(oov_grammar(
                sentence.words(),
                &self.grammars,
                self.default_nonterminal,
                opts.true_oovs_only,
            )));
        }

        let _guard = self.features.acquire(sentence.id());
        let (hg, stats) = match opts.algorithm {
            SearchAlgorithm::Cky => {
                grammars.push(Arc::clone(&self.cky_glue));
                chart::chart_search(sentence, &grammars, &self.features, self.goal)?
            }
            SearchAlgorithm::Stack => {
                phrase::stack_search(
                    &self.ctx,
                    sentence,
                    &grammars,
                    &self.phrase_glue,
                    &self.features,
                )?
            }
        };
        Ok(self.extract(sentence, &hg, stats))
    }

    fn extract(&self, sentence: &Sentence, hg: &HyperGraph, stats: SearchStats) -> Translation {
        let opts = sentence.options();
        let source = self.ctx.vocab.words(sentence.words());
        let viterbi_only = opts.top_n == 1 && !opts.include_features && !opts.include_alignment;
        let derivations = if viterbi_only {
            match (hg.viterbi_words(), hg.viterbi_score()) {
                (Some(words), Some(score)) => vec![Derivation {
                    rank: 0,
                    text: self.ctx.vocab.words(&words),
                    words,
                    score,
                    features: None,
                    alignment: None,
                }],
                _ => Vec::new(),
            }
        } else {
            let scoring = opts.include_features.then_some((&self.features, sentence));
            KBestExtractor::new(hg, opts.unique_hypotheses)
                .extract(opts.top_n, scoring)
                .into_iter()
                .map(|item| Derivation {
                    rank: item.rank,
                    text: self.ctx.vocab.words(&item.words),
                    words: item.words,
                    score: item.score,
                    features: item.features.map(|f| f.named(&self.ctx.features)),
                    alignment: opts.include_alignment.then_some(item.alignment),
                })
                .collect()
        };
        debug!(
            sentence_id = sentence.id(),
            derivations = derivations.len(),
            best_score = derivations.first().map(|d| d.score),
            "sentence decoded"
        );
        Translation {
            sentence_id: sentence.id(),
            source,
            derivations,
            stats,
            failure: None,
        }
    }
}
