//! Decoder configuration loaded from TOML.
//!
//! - `DecoderConfig::from_toml(text)` parses and validates a full config
//! - `DecoderConfig::default()` is the embedded `default_config.toml`
//! - `search_options()` derives the per-sentence [`SearchOptions`]
//!
//! The config is a plain value handed to the decoder; nothing here is global.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sentence::SearchOptions;
use crate::vocab::is_nonterminal_token;

pub const DEFAULT_CONFIG_TOML: &str = include_str!("default_config.toml");

/// Returns the embedded default config TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_CONFIG_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAlgorithm {
    /// Chart search over spans, for hierarchical grammars.
    Cky,
    /// Coverage-stack search, for phrase grammars.
    Stack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSorting {
    /// Sort every rule collection before the first sentence.
    Eager,
    /// Sort each collection the first time a search touches it.
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecoderConfig {
    pub search: SearchSettings,
    pub oov: OovSettings,
    pub output: OutputSettings,
    pub runtime: RuntimeSettings,
    /// Feature lines resolved through the feature registry.
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub grammars: Vec<GrammarSettings>,
    #[serde(default)]
    pub weights: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchSettings {
    pub algorithm: SearchAlgorithm,
    pub pop_limit: usize,
    pub num_translation_options: usize,
    pub reordering_limit: usize,
    pub cube_pruning: bool,
    pub max_nodes: usize,
    pub goal_symbol: String,
    pub default_nonterminal: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OovSettings {
    pub inject: bool,
    pub segment: bool,
    pub true_oovs_only: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputSettings {
    pub top_n: usize,
    pub unique_hypotheses: bool,
    pub include_features: bool,
    pub include_alignment: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuntimeSettings {
    pub num_threads: usize,
    pub rule_sorting: RuleSorting,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrammarSettings {
    pub path: PathBuf,
    pub owner: String,
    /// Longest span a rule may cover in chart search; unlimited if absent.
    #[serde(default)]
    pub span_limit: Option<usize>,
}

impl DecoderConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: DecoderConfig =
            toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate(&config)?;
        Ok(config)
    }

    /// Reads a config file. Relative grammar paths are resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        if let Some(dir) = path.parent() {
            for g in &mut config.grammars {
                if g.path.is_relative() {
                    g.path = dir.join(&g.path);
                }
            }
        }
        Ok(config)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            algorithm: self.search.algorithm,
            pop_limit: self.search.pop_limit,
            num_translation_options: self.search.num_translation_options,
            reordering_limit: self.search.reordering_limit,
            cube_pruning: self.search.cube_pruning,
            max_nodes: self.search.max_nodes,
            inject_oovs: self.oov.inject,
            segment_oovs: self.oov.segment,
            true_oovs_only: self.oov.true_oovs_only,
            top_n: self.output.top_n,
            unique_hypotheses: self.output.unique_hypotheses,
            include_features: self.output.include_features,
            include_alignment: self.output.include_alignment,
        }
    }
}

impl Default for DecoderConfig {
    /// Same values as `default_config.toml`.
    fn default() -> Self {
        Self {
            search: SearchSettings {
                algorithm: SearchAlgorithm::Cky,
                pop_limit: 100,
                num_translation_options: 20,
                reordering_limit: 8,
                cube_pruning: true,
                max_nodes: 1_000_000,
                goal_symbol: "[GOAL]".to_string(),
                default_nonterminal: "[X]".to_string(),
            },
            oov: OovSettings {
                inject: true,
                segment: false,
                true_oovs_only: false,
            },
            output: OutputSettings {
                top_n: 1,
                unique_hypotheses: false,
                include_features: false,
                include_alignment: false,
            },
            runtime: RuntimeSettings {
                num_threads: 1,
                rule_sorting: RuleSorting::Lazy,
            },
            features: ["WordPenalty", "OOVPenalty", "PhraseModel -owner glue"]
                .into_iter()
                .map(String::from)
                .collect(),
            grammars: Vec::new(),
            weights: [("WordPenalty", 1.0), ("OOVPenalty", 1.0), ("tm_glue_0", 0.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

fn validate(c: &DecoderConfig) -> Result<(), ConfigError> {
    macro_rules! check_positive_usize {
        ($section:ident . $field:ident) => {
            if c.$section.$field == 0 {
                return Err(ConfigError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_nonterminal {
        ($section:ident . $field:ident) => {
            if !is_nonterminal_token(&c.$section.$field) {
                return Err(ConfigError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be a bracketed nonterminal like [X]".to_string(),
                });
            }
        };
    }

    check_positive_usize!(search.pop_limit);
    check_positive_usize!(search.num_translation_options);
    check_positive_usize!(search.max_nodes);
    check_nonterminal!(search.goal_symbol);
    check_nonterminal!(search.default_nonterminal);
    if c.search.goal_symbol == c.search.default_nonterminal {
        return Err(ConfigError::InvalidValue {
            field: "search.goal_symbol".to_string(),
            reason: "must differ from search.default_nonterminal".to_string(),
        });
    }
    if c.search.algorithm == SearchAlgorithm::Stack && !c.search.cube_pruning {
        return Err(ConfigError::InvalidValue {
            field: "search.cube_pruning".to_string(),
            reason: "stack search always uses cube pruning".to_string(),
        });
    }

    check_positive_usize!(output.top_n);
    check_positive_usize!(runtime.num_threads);

    for (k, g) in c.grammars.iter().enumerate() {
        if g.owner.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("grammars[{k}].owner"),
                reason: "must not be empty".to_string(),
            });
        }
        if g.span_limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: format!("grammars[{k}].span_limit"),
                reason: "must be positive".to_string(),
            });
        }
    }
    for (name, w) in &c.weights {
        if !w.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: format!("weights.{name}"),
                reason: "must be finite".to_string(),
            });
        }
    }

    Ok(())
}
