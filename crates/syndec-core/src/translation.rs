use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::hypergraph::SearchStats;
use crate::vocab::Symbol;

/// One ranked output of a sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Derivation {
    pub rank: usize,
    #[serde(skip)]
    pub words: Vec<Symbol>,
    pub text: String,
    pub score: f32,
    /// Unweighted feature values whose weighted sum is `score`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, f32>>,
    /// For each output word, the source positions aligned to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Vec<Vec<usize>>>,
}

/// Result of decoding one sentence.
///
/// A sentence without any derivation is a normal outcome; `failure` is set
/// only when the search was abandoned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub sentence_id: usize,
    pub source: String,
    pub derivations: Vec<Derivation>,
    pub stats: SearchStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Translation {
    pub fn empty(sentence_id: usize, source: String) -> Self {
        Self {
            sentence_id,
            source,
            derivations: Vec::new(),
            stats: SearchStats::default(),
            failure: None,
        }
    }

    pub fn failed(sentence_id: usize, source: String, reason: String) -> Self {
        Self {
            failure: Some(reason),
            ..Self::empty(sentence_id, source)
        }
    }

    pub fn best(&self) -> Option<&Derivation> {
        self.derivations.first()
    }

    pub fn is_empty(&self) -> bool {
        self.derivations.is_empty()
    }

    /// n-best lines `id ||| text ||| name=value ... ||| score`. A sentence
    /// without derivations still produces one (empty) line.
    pub fn to_text(&self) -> String {
        if self.derivations.is_empty() {
            return format!("{} |||  |||  ||| 0.000", self.sentence_id);
        }
        let mut out = String::new();
        for (k, d) in self.derivations.iter().enumerate() {
            if k > 0 {
                out.push('\n');
            }
            let features = d
                .features
                .as_ref()
                .map(|f| {
                    f.iter()
                        .map(|(name, value)| format!("{name}={value:.3}"))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            let _ = write!(
                out,
                "{} ||| {} ||| {} ||| {:.3}",
                self.sentence_id, d.text, features, d.score
            );
        }
        out
    }
}
