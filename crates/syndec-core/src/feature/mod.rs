//! Feature functions and the scoring protocol.
//!
//! Every feature sees a [`Transition`] (rule + tail nodes + span) and reports
//! its values into an [`Accumulator`]. Stateful features additionally return
//! a [`DpState`] summarising what they need to know about the new node when
//! it is used as a tail later; stateless ones return `None`.

mod accumulator;
mod distortion;
mod lm;
mod phrase_model;
mod registry;
mod scorer;
mod state;
mod target_bigram;
mod vector;
mod word_penalty;

use crate::grammar::Rule;
use crate::hypergraph::HGNode;
use crate::sentence::Sentence;

pub use accumulator::{Accumulator, FeatureAccumulator, ScoreAccumulator};
pub use distortion::Distortion;
pub use lm::LanguageModelFeature;
pub use phrase_model::{PhraseModel, PhrasePenalty};
pub use registry::{FeatureError, FeatureRegistry};
pub use scorer::{FeatureSet, NodeResult, SentenceGuard};
pub use state::{BigramState, DpState, StateTuple};
pub use target_bigram::TargetBigram;
pub use vector::FeatureVector;
pub use word_penalty::{OovPenalty, WordPenalty};

/// One hyperedge application being scored.
pub struct Transition<'a> {
    pub rule: &'a Rule,
    /// Tail nodes in source-nonterminal order.
    pub tails: &'a [&'a HGNode],
    /// Source span `[i, j)` covered by the new node.
    pub i: usize,
    pub j: usize,
    pub sentence: &'a Sentence,
}

/// A model component contributing to edge scores.
pub trait FeatureFunction: Send + Sync {
    fn name(&self) -> &str;

    fn is_stateful(&self) -> bool {
        false
    }

    /// Assigns the index of this feature's entry in every node's state
    /// tuple. Called once, before decoding, for stateful features only.
    fn bind_state_slot(&mut self, _slot: usize) {}

    /// Context-free score estimate of `rule`, used for sorting and pruning.
    fn estimate_cost(&self, rule: &Rule, weights: &FeatureVector) -> f32;

    /// Estimate of the score still to come for a node with `state`, added to
    /// its pruning priority only.
    fn estimate_future_cost(
        &self,
        _rule: &Rule,
        _state: Option<&DpState>,
        _weights: &FeatureVector,
    ) -> f32 {
        0.0
    }

    fn compute(&self, t: &Transition<'_>, acc: &mut dyn Accumulator) -> Option<DpState>;

    /// Contribution of the goal transition over a complete item.
    fn compute_final(
        &self,
        _tail: &HGNode,
        _sentence: &Sentence,
        _acc: &mut dyn Accumulator,
    ) -> Option<DpState> {
        None
    }

    /// Sentence-scoped resources; paired with `release`.
    fn acquire(&self, _sentence_id: usize) {}

    fn release(&self, _sentence_id: usize) {}
}
