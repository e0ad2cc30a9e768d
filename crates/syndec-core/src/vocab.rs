//! Word and nonterminal symbol table.
//!
//! Terminals and nonterminals share one `u32` id space; nonterminals carry
//! the high bit so a symbol's kind can be read without a table lookup.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

const NONTERMINAL_BIT: u32 = 1 << 31;

/// An interned terminal or nonterminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    /// Sentence start marker `<s>`.
    pub const BOS: Symbol = Symbol(0);
    /// Sentence end marker `</s>`.
    pub const EOS: Symbol = Symbol(1);
    pub const UNK: Symbol = Symbol(2);
    /// `[GOAL]`
    pub const GOAL: Symbol = Symbol(NONTERMINAL_BIT);
    /// `[X]`
    pub const X: Symbol = Symbol(NONTERMINAL_BIT | 1);

    #[inline]
    pub fn is_nonterminal(self) -> bool {
        self.0 & NONTERMINAL_BIT != 0
    }

    /// Sentence boundary markers are never counted as output words.
    #[inline]
    pub fn is_boundary(self) -> bool {
        self == Symbol::BOS || self == Symbol::EOS
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nonterminal() {
            write!(f, "NT#{}", self.0 & !NONTERMINAL_BIT)
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Returns true for tokens written as `[LABEL]` or `[LABEL,k]`.
pub fn is_nonterminal_token(token: &str) -> bool {
    token.len() > 2 && token.starts_with('[') && token.ends_with(']')
}

/// Strips a `,k` slot index from a nonterminal token: `[X,1]` → `[X]`.
pub fn strip_slot_index(token: &str) -> Cow<'_, str> {
    match token.rfind(',') {
        Some(comma) if is_nonterminal_token(token) => Cow::Owned(format!("{}]", &token[..comma])),
        _ => Cow::Borrowed(token),
    }
}

/// Parses the 1-based slot index of `[X,k]`, if present.
pub fn slot_index(token: &str) -> Option<usize> {
    if !is_nonterminal_token(token) {
        return None;
    }
    let comma = token.rfind(',')?;
    token[comma + 1..token.len() - 1].trim().parse().ok()
}

/// Terminals and nonterminals are indexed separately, so an input word
/// spelled `[X]` and the nonterminal `[X]` are different symbols.
#[derive(Default)]
struct Table {
    terminals: Vec<String>,
    nonterminals: Vec<String>,
    terminal_index: HashMap<String, Symbol>,
    nonterminal_index: HashMap<String, Symbol>,
}

impl Table {
    fn index(&self, nonterminal: bool) -> &HashMap<String, Symbol> {
        if nonterminal {
            &self.nonterminal_index
        } else {
            &self.terminal_index
        }
    }

    fn insert(&mut self, word: &str, nonterminal: bool) -> Symbol {
        if let Some(&sym) = self.index(nonterminal).get(word) {
            return sym;
        }
        let (sym, index) = if nonterminal {
            let sym = Symbol(NONTERMINAL_BIT | self.nonterminals.len() as u32);
            self.nonterminals.push(word.to_string());
            (sym, &mut self.nonterminal_index)
        } else {
            let sym = Symbol(self.terminals.len() as u32);
            self.terminals.push(word.to_string());
            (sym, &mut self.terminal_index)
        };
        index.insert(word.to_string(), sym);
        sym
    }

    fn word(&self, sym: Symbol) -> Option<&str> {
        let idx = (sym.0 & !NONTERMINAL_BIT) as usize;
        if sym.is_nonterminal() {
            self.nonterminals.get(idx).map(String::as_str)
        } else {
            self.terminals.get(idx).map(String::as_str)
        }
    }
}

/// Thread-safe word ↔ symbol table.
///
/// Input sentences add unseen words while other sentences are decoding, so
/// the table sits behind a `RwLock`; lookups of known words take the read
/// lock only.
pub struct Vocabulary {
    table: RwLock<Table>,
}

impl Vocabulary {
    pub fn new() -> Self {
        let mut table = Table::default();
        // Registration order fixes the reserved constants on `Symbol`.
        for word in ["<s>", "</s>", "<unk>", "[GOAL]", "[X]"] {
            table.insert(word, is_nonterminal_token(word));
        }
        Self {
            table: RwLock::new(table),
        }
    }

    /// Interns `word`, returning its symbol. Tokens written `[LABEL]` are
    /// nonterminals.
    pub fn id(&self, word: &str) -> Symbol {
        self.intern(word, is_nonterminal_token(word))
    }

    /// Interns `word` as a terminal whatever its spelling. Used for input
    /// text, LM vocabularies and other word lists.
    pub fn terminal(&self, word: &str) -> Symbol {
        self.intern(word, false)
    }

    fn intern(&self, word: &str, nonterminal: bool) -> Symbol {
        if let Some(sym) = self.lookup(word, nonterminal) {
            return sym;
        }
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(word, nonterminal)
    }

    fn lookup(&self, word: &str, nonterminal: bool) -> Option<Symbol> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index(nonterminal)
            .get(word)
            .copied()
    }

    /// Looks up `word` without interning it.
    pub fn get(&self, word: &str) -> Option<Symbol> {
        self.lookup(word, is_nonterminal_token(word))
    }

    pub fn word(&self, sym: Symbol) -> String {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .word(sym)
            .map(str::to_string)
            .unwrap_or_else(|| sym.to_string())
    }

    /// Space-joined surface of a symbol sequence.
    pub fn words(&self, syms: &[Symbol]) -> String {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for (k, &sym) in syms.iter().enumerate() {
            if k > 0 {
                out.push(' ');
            }
            match table.word(sym) {
                Some(w) => out.push_str(w),
                None => out.push_str(&sym.to_string()),
            }
        }
        out
    }

    /// Interns every whitespace-separated token of `text`.
    pub fn ids(&self, text: &str) -> Vec<Symbol> {
        text.split_whitespace().map(|w| self.id(w)).collect()
    }

    /// Interns every token of `text` as a terminal.
    pub fn terminal_ids(&self, text: &str) -> Vec<Symbol> {
        text.split_whitespace().map(|w| self.terminal(w)).collect()
    }

    /// Number of interned terminals and nonterminals.
    pub fn len(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.terminals.len() + table.nonterminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}
