use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::lm::{LmError, NgramModel};

use super::word_penalty::DEFAULT_WORD_PENALTY;
use super::{
    Distortion, FeatureFunction, LanguageModelFeature, OovPenalty, PhraseModel, PhrasePenalty,
    TargetBigram, WordPenalty,
};

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("unknown feature {0:?}")]
    UnknownTag(String),
    #[error("{tag}: missing argument -{arg}")]
    MissingArgument { tag: String, arg: String },
    #[error("{tag}: bad argument -{arg}: {reason}")]
    BadArgument {
        tag: String,
        arg: String,
        reason: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("language model: {0}")]
    Lm(#[from] LmError),
}

/// A parsed `Tag -key value -key value` feature line.
#[derive(Debug)]
pub struct FeatureArgs {
    tag: String,
    args: HashMap<String, String>,
}

impl FeatureArgs {
    pub fn parse(line: &str) -> Result<Self, FeatureError> {
        let mut tokens = line.split_whitespace();
        let tag = tokens
            .next()
            .ok_or_else(|| FeatureError::UnknownTag(String::new()))?
            .to_string();
        let mut args = HashMap::new();
        while let Some(key) = tokens.next() {
            let Some(key) = key.strip_prefix('-') else {
                return Err(FeatureError::BadArgument {
                    tag,
                    arg: key.to_string(),
                    reason: "expected -key value".to_string(),
                });
            };
            let value = tokens.next().ok_or_else(|| FeatureError::MissingArgument {
                tag: tag.clone(),
                arg: key.to_string(),
            })?;
            args.insert(key.to_string(), value.to_string());
        }
        Ok(Self { tag, args })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, FeatureError> {
        self.get(key).ok_or_else(|| FeatureError::MissingArgument {
            tag: self.tag.clone(),
            arg: key.to_string(),
        })
    }

    pub fn get_f32(&self, key: &str, default: f32) -> Result<f32, FeatureError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| FeatureError::BadArgument {
                tag: self.tag.clone(),
                arg: key.to_string(),
                reason: format!("{v:?} is not a number"),
            }),
        }
    }
}

pub type FeatureFactory =
    fn(&FeatureArgs, &Arc<Context>) -> Result<Box<dyn FeatureFunction>, FeatureError>;

/// Maps feature tags to constructors. Resolved once when a decoder is built.
pub struct FeatureRegistry {
    factories: HashMap<String, FeatureFactory>,
}

impl FeatureRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut r = Self::empty();
        r.register("WordPenalty", |args, ctx| {
            let value = args.get_f32("value", DEFAULT_WORD_PENALTY)?;
            Ok(Box::new(WordPenalty::new(ctx, value)))
        });
        r.register("OOVPenalty", |args, ctx| {
            let value = args.get_f32("value", OovPenalty::DEFAULT_VALUE)?;
            Ok(Box::new(OovPenalty::new(ctx, value)))
        });
        r.register("PhraseModel", |args, ctx| {
            Ok(Box::new(PhraseModel::new(ctx, args.require("owner")?)))
        });
        r.register("PhrasePenalty", |args, ctx| {
            Ok(Box::new(PhrasePenalty::new(ctx, args.require("owner")?)))
        });
        r.register("Distortion", |_, ctx| Ok(Box::new(Distortion::new(ctx))));
        r.register("TargetBigram", |args, ctx| {
            let vocab = match args.get("vocab") {
                Some(path) => Some(read_vocab(Path::new(path), ctx)?),
                None => None,
            };
            Ok(Box::new(TargetBigram::new(Arc::clone(ctx), vocab)))
        });
        r.register("LanguageModel", |args, ctx| {
            let path = args.require("path")?;
            let name = args.get("name").unwrap_or("lm_0");
            let model = NgramModel::open(Path::new(path), &ctx.vocab)?;
            Ok(Box::new(LanguageModelFeature::new(ctx, name, Arc::new(model))))
        });
        r
    }

    pub fn register(&mut self, tag: &str, factory: FeatureFactory) {
        self.factories.insert(tag.to_string(), factory);
    }

    pub fn create(
        &self,
        line: &str,
        ctx: &Arc<Context>,
    ) -> Result<Box<dyn FeatureFunction>, FeatureError> {
        let args = FeatureArgs::parse(line)?;
        let factory = self
            .factories
            .get(args.tag())
            .ok_or_else(|| FeatureError::UnknownTag(args.tag().to_string()))?;
        let feature = factory(&args, ctx)?;
        debug!(feature = feature.name(), "feature created");
        Ok(feature)
    }

    pub fn create_all(
        &self,
        lines: &[String],
        ctx: &Arc<Context>,
    ) -> Result<Vec<Box<dyn FeatureFunction>>, FeatureError> {
        lines.iter().map(|l| self.create(l, ctx)).collect()
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn read_vocab(path: &Path, ctx: &Context) -> Result<HashSet<crate::vocab::Symbol>, FeatureError> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .map(|w| ctx.vocab.terminal(w))
        .collect())
}
