use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, debug_span};

use super::{LanguageModel, LmError};
use crate::vocab::{Symbol, Vocabulary};

/// log10 probability assigned to words the model has never seen.
const DEFAULT_UNK_LOGPROB: f32 = -100.0;

#[derive(Debug, Clone, Copy)]
struct Entry {
    logprob: f32,
    backoff: f32,
}

/// In-memory back-off n-gram model.
pub struct NgramModel {
    order: usize,
    entries: HashMap<Vec<Symbol>, Entry>,
    unk_logprob: f32,
}

impl NgramModel {
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(1),
            entries: HashMap::new(),
            unk_logprob: DEFAULT_UNK_LOGPROB,
        }
    }

    pub fn insert(&mut self, ngram: &[Symbol], logprob: f32, backoff: f32) {
        if ngram == [Symbol::UNK] {
            self.unk_logprob = logprob;
        }
        self.entries
            .insert(ngram.to_vec(), Entry { logprob, backoff });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn open(path: &Path, vocab: &Vocabulary) -> Result<Self, LmError> {
        let file = File::open(path)?;
        Self::from_arpa(BufReader::new(file), vocab)
    }

    /// Reads an ARPA-format model. The order is the highest `\N-grams:`
    /// section present.
    pub fn from_arpa(reader: impl BufRead, vocab: &Vocabulary) -> Result<Self, LmError> {
        let _span = debug_span!("arpa_load").entered();
        let mut model = NgramModel::new(1);
        let mut section: Option<usize> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "\\data\\" || trimmed.starts_with("ngram ") {
                section = None;
                continue;
            }
            if trimmed == "\\end\\" {
                break;
            }
            if let Some(header) = trimmed
                .strip_prefix('\\')
                .and_then(|rest| rest.strip_suffix("-grams:"))
            {
                let n: usize = header.parse().map_err(|_| LmError::Parse {
                    line: line_no,
                    reason: format!("bad section header {trimmed:?}"),
                })?;
                model.order = model.order.max(n);
                section = Some(n);
                continue;
            }
            let Some(n) = section else {
                continue;
            };

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() < n + 1 || fields.len() > n + 2 {
                return Err(LmError::Parse {
                    line: line_no,
                    reason: format!("expected {n} words, found {} fields", fields.len()),
                });
            }
            let parse = |s: &str| -> Result<f32, LmError> {
                s.parse().map_err(|_| LmError::Parse {
                    line: line_no,
                    reason: format!("bad number {s:?}"),
                })
            };
            let logprob = parse(fields[0])?;
            let backoff = match fields.get(n + 1) {
                Some(b) => parse(b)?,
                None => 0.0,
            };
            let ngram: Vec<Symbol> = fields[1..=n].iter().map(|w| vocab.terminal(w)).collect();
            model.insert(&ngram, logprob, backoff);
        }

        debug!(order = model.order, entries = model.entries.len(), "arpa loaded");
        Ok(model)
    }
}

impl LanguageModel for NgramModel {
    fn order(&self) -> usize {
        self.order
    }

    fn logprob(&self, context: &[Symbol], word: Symbol) -> f32 {
        let keep = context.len().min(self.order - 1);
        let context = &context[context.len() - keep..];
        let mut backoff = 0.0;
        let mut key = Vec::with_capacity(keep + 1);
        for start in 0..=context.len() {
            key.clear();
            key.extend_from_slice(&context[start..]);
            key.push(word);
            if let Some(e) = self.entries.get(&key) {
                return e.logprob + backoff;
            }
            if start < context.len() {
                if let Some(h) = self.entries.get(&context[start..]) {
                    backoff += h.backoff;
                }
            }
        }
        self.unk_logprob + backoff
    }
}
