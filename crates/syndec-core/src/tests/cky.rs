use std::sync::Arc;

use proptest::prelude::*;

use crate::chart::chart_search;
use crate::context::Context;
use crate::hypergraph::{HyperGraph, KBestExtractor, SearchStats};
use crate::search::SearchError;
use crate::sentence::SearchOptions;
use crate::testutil::{feature_set, grammar, sentence_with, with_cky_glue};
use crate::vocab::Symbol;

const FEATURES: &[&str] = &["PhraseModel -owner pt", "PhraseModel -owner glue"];

fn search(
    ctx: &Arc<Context>,
    rules: &[&str],
    text: &str,
    weights: &[(&str, f32)],
    options: SearchOptions,
) -> Result<(HyperGraph, SearchStats), SearchError> {
    let grammars = with_cky_glue(ctx, vec![grammar(ctx, "pt", rules)]);
    let features = feature_set(ctx, FEATURES, weights);
    let sentence = sentence_with(ctx, text, options);
    chart_search(&sentence, &grammars, &features, Symbol::GOAL)
}

fn best_text(ctx: &Context, hg: &HyperGraph) -> String {
    ctx.vocab.words(&hg.viterbi_words().unwrap())
}

#[test]
fn single_rule_covers_whole_input() {
    let ctx = Context::new();
    let (hg, stats) = search(
        &ctx,
        &["[X] ||| a b ||| x y ||| 1.0"],
        "a b",
        &[("tm_pt_0", -1.0), ("tm_glue_0", -0.5)],
        SearchOptions::default(),
    )
    .unwrap();
    assert_eq!(best_text(&ctx, &hg), "x y");
    assert!((hg.viterbi_score().unwrap() - -1.5).abs() < 1e-6);
    assert_eq!(stats.nodes, hg.num_nodes());

    let items = KBestExtractor::new(&hg, false).extract(5, None);
    assert_eq!(items.len(), 1);
    assert!((items[0].score - -1.5).abs() < 1e-6);
}

#[test]
fn uncovered_word_leaves_no_goal() {
    let ctx = Context::new();
    let (hg, _) = search(
        &ctx,
        &["[X] ||| a ||| x"],
        "a q",
        &[],
        SearchOptions::default(),
    )
    .unwrap();
    assert!(hg.goal().is_none());
    assert!(hg.viterbi_words().is_none());
    assert!(KBestExtractor::new(&hg, false).extract(3, None).is_empty());
}

#[test]
fn same_signature_merges_into_one_node() {
    let ctx = Context::new();
    let (hg, stats) = search(
        &ctx,
        &["[X] ||| a ||| x ||| 1.0", "[X] ||| a ||| y ||| 2.0"],
        "a",
        &[("tm_pt_0", -1.0)],
        SearchOptions::default(),
    )
    .unwrap();
    let merged: Vec<_> = hg
        .nodes()
        .filter(|(_, n)| n.i == 1 && n.j == 2 && n.lhs == Symbol::X)
        .collect();
    assert_eq!(merged.len(), 1);
    let node = merged[0].1;
    assert_eq!(node.edges().len(), 2);
    assert_eq!(node.score(), -1.0);
    assert!(stats.recombined >= 1);
    assert_eq!(best_text(&ctx, &hg), "x");
}

#[test]
fn antecedents_live_in_smaller_spans() {
    let ctx = Context::new();
    let (hg, _) = search(
        &ctx,
        &[
            "[X] ||| a ||| x",
            "[X] ||| b ||| y",
            "[X] ||| c ||| z",
            "[X] ||| [X,1] b ||| [X,1] y",
            "[X] ||| a [X,1] ||| [X,1] x",
            "[X] ||| [X,1] [X,2] ||| [X,2] [X,1]",
        ],
        "a b c",
        &[],
        SearchOptions::default(),
    )
    .unwrap();
    assert!(hg.goal().is_some());
    for (_, node) in hg.nodes() {
        for &e in node.edges() {
            let edge = hg.edge(e);
            if edge.rule.is_none() {
                continue;
            }
            for &t in &edge.tails {
                let tail = hg.node(t);
                assert!(node.i <= tail.i && tail.j <= node.j);
                assert!(tail.j - tail.i < node.j - node.i);
            }
        }
    }
}

fn wide_grammar() -> Vec<&'static str> {
    vec![
        "[X] ||| a ||| a1 ||| 0.1",
        "[X] ||| a ||| a2 ||| 0.2",
        "[X] ||| a ||| a3 ||| 0.3",
        "[X] ||| b ||| b1 ||| 0.1",
        "[X] ||| b ||| b2 ||| 0.5",
        "[X] ||| b ||| b3 ||| 0.2",
        "[X] ||| c ||| c1 ||| 0.4",
        "[X] ||| c ||| c2 ||| 0.3",
        "[X] ||| [X,1] [X,2] ||| [X,2] [X,1] ||| 0.05",
        "[X] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| 0.0",
    ]
}

#[test]
fn pops_never_exceed_limit() {
    let ctx = Context::new();
    let options = SearchOptions {
        pop_limit: 3,
        ..SearchOptions::default()
    };
    let (hg, stats) = search(&ctx, &wide_grammar(), "a b c", &[("tm_pt_0", 1.0)], options)
        .unwrap();
    assert!(hg.goal().is_some());
    assert!(stats.max_pops <= 3);
    assert!(stats.candidates > stats.max_pops);
}

#[test]
fn exhaustive_search_matches_unbounded_cube_pruning() {
    let ctx = Context::new();
    let weights = [("tm_pt_0", 1.0), ("tm_glue_0", -0.1)];
    let cube = SearchOptions {
        pop_limit: 100_000,
        ..SearchOptions::default()
    };
    let exhaustive = SearchOptions {
        cube_pruning: false,
        ..cube.clone()
    };
    let (pruned, _) = search(&ctx, &wide_grammar(), "a b c", &weights, cube).unwrap();
    let (full, stats) = search(&ctx, &wide_grammar(), "a b c", &weights, exhaustive).unwrap();
    let (a, b) = (pruned.viterbi_score().unwrap(), full.viterbi_score().unwrap());
    assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    assert_eq!(best_text(&ctx, &pruned), best_text(&ctx, &full));
    assert!(stats.max_pops > 3);
}

#[test]
fn node_budget_abandons_search() {
    let ctx = Context::new();
    let options = SearchOptions {
        max_nodes: 3,
        ..SearchOptions::default()
    };
    let err = search(&ctx, &wide_grammar(), "a b c", &[], options).unwrap_err();
    assert!(matches!(err, SearchError::ResourceExhausted { limit: 3, .. }));
}

proptest! {
    #[test]
    fn kbest_scores_never_increase(
        scores in prop::collection::vec(-3.0f32..0.0, 10),
        glue in -1.0f32..1.0,
    ) {
        let ctx = Context::new();
        let rules: Vec<String> = wide_grammar()
            .iter()
            .zip(&scores)
            .map(|(r, s)| {
                let base = r.rsplit_once("|||").map_or(*r, |(head, _)| head);
                format!("{base}||| {s}")
            })
            .collect();
        let rules: Vec<&str> = rules.iter().map(String::as_str).collect();
        let (hg, _) = search(
            &ctx,
            &rules,
            "a b c",
            &[("tm_pt_0", 1.0), ("tm_glue_0", glue)],
            SearchOptions::default(),
        )
        .unwrap();

        for (_, node) in hg.nodes() {
            let best = node
                .edges()
                .iter()
                .map(|&e| hg.edge(e).score)
                .fold(f32::NEG_INFINITY, f32::max);
            prop_assert_eq!(node.score(), best);
        }

        let items = KBestExtractor::new(&hg, false).extract(20, None);
        prop_assert!(!items.is_empty());
        prop_assert!((items[0].score - hg.viterbi_score().unwrap()).abs() < 1e-4);
        for pair in items.windows(2) {
            prop_assert!(pair[0].score + 1e-5 >= pair[1].score);
        }
    }
}
