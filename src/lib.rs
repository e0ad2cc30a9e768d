//! Synchronous-grammar translation decoder.
//!
//! Re-exports [`syndec_core`] and adds [`DecoderPool`], which decodes a
//! stream of sentences on a fixed set of worker threads.

pub mod pool;
pub mod trace_init;

pub use pool::{DecoderPool, PoolError, TranslationStream};
pub use syndec_core::*;
pub use trace_init::{init_tracing, TraceDetail};
