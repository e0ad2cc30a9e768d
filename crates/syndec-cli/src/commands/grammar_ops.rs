use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use serde::Serialize;

use syndec::context::Context;
use syndec::grammar::{cky_glue_grammar, read_hiero, Grammar, MemoryGrammar};

fn open_grammar(ctx: &Context, file: &str, owner: &str) -> MemoryGrammar {
    let f = die!(File::open(file), "Error opening {file}: {}");
    let owner = ctx.owners.id(owner);
    die!(
        read_hiero(BufReader::new(f), ctx, owner, None),
        "Error reading grammar: {}"
    )
}

fn print_rules(ctx: &Context, grammar: &dyn Grammar) {
    grammar.root().for_each_collection(&mut |c| {
        for rule in c.rules() {
            println!("{}", rule.to_text(ctx));
        }
    });
}

/// Prints the chart glue grammar covering every left-hand side of `file`.
pub fn glue(file: &str, owner: &str, goal: &str, default_nonterminal: &str) {
    let ctx = Context::new();
    let grammar = open_grammar(&ctx, file, owner);
    let mut labels = grammar.lhs_labels();
    labels.push(ctx.vocab.id(default_nonterminal));
    labels.sort();
    labels.dedup();
    let goal = ctx.vocab.id(goal);
    let glue = die!(cky_glue_grammar(&ctx, goal, &labels), "Error: {}");
    print_rules(&ctx, &glue);
}

#[derive(Debug, Serialize)]
struct GrammarStats {
    rules: usize,
    collections: usize,
    largest_collection: usize,
    max_source_phrase_length: usize,
    /// Rule count by number of nonterminals.
    by_arity: BTreeMap<usize, usize>,
    /// Rule count by left-hand side.
    by_lhs: BTreeMap<String, usize>,
}

fn collect_stats(ctx: &Context, grammar: &dyn Grammar) -> GrammarStats {
    let mut stats = GrammarStats {
        rules: grammar.num_rules(),
        collections: 0,
        largest_collection: 0,
        max_source_phrase_length: grammar.max_source_phrase_length(),
        by_arity: BTreeMap::new(),
        by_lhs: BTreeMap::new(),
    };
    grammar.root().for_each_collection(&mut |c| {
        stats.collections += 1;
        stats.largest_collection = stats.largest_collection.max(c.len());
        *stats.by_arity.entry(c.arity()).or_default() += c.len();
        for rule in c.rules() {
            *stats.by_lhs.entry(ctx.vocab.word(rule.lhs())).or_default() += 1;
        }
    });
    stats
}

pub fn stats(file: &str, owner: &str, json: bool) {
    let ctx = Context::new();
    let grammar = open_grammar(&ctx, file, owner);
    let stats = collect_stats(&ctx, &grammar);
    if json {
        println!(
            "{}",
            die!(serde_json::to_string_pretty(&stats), "Error: {}")
        );
        return;
    }
    println!("rules:                    {}", stats.rules);
    println!("source sides:             {}", stats.collections);
    println!("largest collection:       {}", stats.largest_collection);
    println!("max source phrase length: {}", stats.max_source_phrase_length);
    for (arity, count) in &stats.by_arity {
        println!("arity {arity}:                  {count}");
    }
    for (lhs, count) in &stats.by_lhs {
        println!("{lhs}: {count}");
    }
}
