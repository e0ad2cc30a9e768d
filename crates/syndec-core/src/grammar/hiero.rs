use std::collections::HashMap;
use std::io::BufRead;

use tracing::{debug, debug_span};

use crate::context::{Context, OwnerId};
use crate::feature::FeatureVector;
use crate::vocab::{is_nonterminal_token, slot_index, strip_slot_index};

use super::{Grammar, GrammarError, MemoryGrammar, Rule, TargetSymbol};

const FIELD_SEP: &str = "|||";

/// Parses one rule line:
///
/// ```text
/// [X] ||| source words [X,1] ||| target [X,1] words ||| 0.5 -1 name=2 ||| 0-0 1-2
/// ```
///
/// Unnamed scores become dense features `tm_<owner>_<k>`; `name=value`
/// entries are kept as sparse features. The alignment field is optional.
pub fn parse_rule(line: &str, ctx: &Context, owner: OwnerId) -> Result<Rule, GrammarError> {
    let fields: Vec<&str> = line.split(FIELD_SEP).map(str::trim).collect();
    if fields.len() < 3 {
        return Err(GrammarError::Slot(format!(
            "expected at least 3 fields, found {}",
            fields.len()
        )));
    }

    let lhs_token = fields[0];
    if !is_nonterminal_token(lhs_token) {
        return Err(GrammarError::Slot(format!("bad left-hand side {lhs_token:?}")));
    }
    let lhs = ctx.vocab.id(&strip_slot_index(lhs_token));

    // Written slot index ([X,k]) → position among the source nonterminals.
    let mut slot_of_index: HashMap<usize, usize> = HashMap::new();
    let mut source = Vec::new();
    for token in fields[1].split_whitespace() {
        if is_nonterminal_token(token) {
            let position = slot_of_index.len();
            let written = slot_index(token).unwrap_or(position + 1);
            if slot_of_index.insert(written, position).is_some() {
                return Err(GrammarError::Slot(format!(
                    "source index {written} used twice"
                )));
            }
            source.push(ctx.vocab.id(&strip_slot_index(token)));
        } else {
            source.push(ctx.vocab.id(token));
        }
    }

    let mut target = Vec::new();
    let mut bare = 0;
    for token in fields[2].split_whitespace() {
        if is_nonterminal_token(token) {
            bare += 1;
            let written = slot_index(token).unwrap_or(bare);
            let slot = slot_of_index.get(&written).copied().ok_or_else(|| {
                GrammarError::Slot(format!("target index {written} has no source match"))
            })?;
            target.push(TargetSymbol::Slot(slot));
        } else {
            target.push(TargetSymbol::Word(ctx.vocab.id(token)));
        }
    }

    let owner_name = ctx.owners.name(owner);
    let mut features = FeatureVector::new();
    if let Some(scores) = fields.get(3) {
        let mut dense = 0;
        for token in scores.split_whitespace() {
            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name.to_string(), value),
                None => {
                    let name = format!("tm_{owner_name}_{dense}");
                    dense += 1;
                    (name, token)
                }
            };
            let value: f32 = value
                .parse()
                .map_err(|_| GrammarError::Slot(format!("bad feature value {token:?}")))?;
            features.add(ctx.features.id(&name), value);
        }
    }

    let mut alignment = Vec::new();
    if let Some(points) = fields.get(4) {
        for point in points.split_whitespace() {
            let parsed = point
                .split_once('-')
                .and_then(|(s, t)| Some((s.parse().ok()?, t.parse().ok()?)));
            match parsed {
                Some(p) => alignment.push(p),
                None => {
                    return Err(GrammarError::Slot(format!("bad alignment point {point:?}")));
                }
            }
        }
    }

    Rule::new(lhs, source, target, features, alignment, owner)
}

/// Reads a grammar file in the `|||`-separated text format. Blank lines and
/// lines starting with `#` are skipped.
pub fn read_hiero(
    reader: impl BufRead,
    ctx: &Context,
    owner: OwnerId,
    span_limit: Option<usize>,
) -> Result<MemoryGrammar, GrammarError> {
    let _span = debug_span!("read_hiero", owner = %ctx.owners.name(owner)).entered();
    let mut grammar = MemoryGrammar::new(owner, span_limit);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let rule = parse_rule(trimmed, ctx, owner).map_err(|e| match e {
            GrammarError::Slot(reason) => GrammarError::Parse {
                line: idx + 1,
                reason,
            },
            other => other,
        })?;
        grammar.add_rule(rule);
    }
    debug!(rules = grammar.num_rules(), "grammar loaded");
    Ok(grammar)
}
