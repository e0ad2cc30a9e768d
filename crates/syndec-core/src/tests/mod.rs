//! Search scenarios over small hand-built grammars.

mod cky;
mod decoding;
