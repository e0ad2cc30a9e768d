//! Synchronous-grammar translation decoder: chart and stack search over a
//! packed hypergraph, pluggable feature scoring, and lazy k-best
//! extraction.

pub mod chart;
pub mod config;
pub mod context;
pub mod decoder;
pub mod feature;
pub mod grammar;
pub mod hypergraph;
pub mod lm;
pub mod phrase;
pub mod search;
pub mod sentence;
pub mod translation;
pub mod vocab;

#[cfg(test)]
pub(crate) mod testutil;
#[cfg(test)]
mod tests;

pub use config::{DecoderConfig, SearchAlgorithm};
pub use context::Context;
pub use decoder::{Decoder, DecoderError};
pub use sentence::{SearchOptions, Sentence, SentenceError, TargetConstraint};
pub use translation::{Derivation, Translation};
