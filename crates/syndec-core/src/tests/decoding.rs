use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{DecoderConfig, GrammarSettings, RuleSorting, SearchAlgorithm};
use crate::context::Context;
use crate::decoder::Decoder;
use crate::feature::{FeatureFunction, FeatureRegistry, FeatureSet, FeatureVector};
use crate::grammar::TargetSymbol;
use crate::lm::{score_items, LanguageModel, LmCache, LmItem, NgramModel};
use crate::sentence::{SearchOptions, Sentence};
use crate::testutil::{feature_set, grammar, CountingFeature};
use crate::vocab::Symbol;

const RULES: &[&str] = &[
    "[X] ||| a b ||| x y ||| -1",
    "[X] ||| a ||| x ||| -0.2",
    "[X] ||| b ||| y ||| -0.2",
];

fn decoder(rules: &[&str], lines: &[&str], weights: &[(&str, f32)]) -> Decoder {
    let ctx = Context::new();
    let grammars = vec![grammar(&ctx, "pt", rules)];
    let features = feature_set(&ctx, lines, weights);
    Decoder::new(ctx, &DecoderConfig::default(), grammars, features).unwrap()
}

fn sentence(decoder: &Decoder, text: &str, options: SearchOptions) -> Sentence {
    Sentence::parse(decoder.context(), 0, text, options).unwrap()
}

fn no_oovs(decoder: &Decoder) -> SearchOptions {
    SearchOptions {
        inject_oovs: false,
        ..decoder.options().clone()
    }
}

#[test]
fn empty_sentence_touches_no_feature() {
    let ctx = Context::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let functions: Vec<Box<dyn FeatureFunction>> = vec![Box::new(CountingFeature {
        calls: Arc::clone(&calls),
    })];
    let features = FeatureSet::new(functions, FeatureVector::new());
    let grammars = vec![grammar(&ctx, "pt", &["[X] ||| a ||| x"])];
    let decoder = Decoder::new(ctx, &DecoderConfig::default(), grammars, features).unwrap();

    let t = decoder.decode(&decoder.sentence(0, "").unwrap());
    assert!(t.is_empty());
    assert!(t.failure.is_none());
    assert_eq!(t.to_text(), "0 |||  |||  ||| 0.000");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let t = decoder.decode(&decoder.sentence(1, "a").unwrap());
    assert_eq!(t.best().unwrap().text, "x");
    assert!(calls.load(Ordering::SeqCst) > 0);
}

#[test]
fn unique_extraction_collapses_equal_strings() {
    let d = decoder(RULES, &["PhraseModel -owner pt"], &[("tm_pt_0", 1.0)]);

    let all = SearchOptions {
        top_n: 2,
        ..no_oovs(&d)
    };
    let t = d.decode(&sentence(&d, "a b", all.clone()));
    let texts: Vec<&str> = t.derivations.iter().map(|x| x.text.as_str()).collect();
    assert_eq!(texts, ["x y", "x y"]);
    assert!((t.derivations[0].score - -0.4).abs() < 1e-6);
    assert!((t.derivations[1].score - -1.0).abs() < 1e-6);

    let unique = SearchOptions {
        unique_hypotheses: true,
        ..all
    };
    let t = d.decode(&sentence(&d, "a b", unique));
    assert_eq!(t.derivations.len(), 1);
    assert_eq!(t.derivations[0].text, "x y");
}

#[test]
fn reported_features_sum_to_score() {
    let weights: [(&str, f32); 4] = [
        ("tm_pt_0", 1.0),
        ("tm_glue_0", -0.3),
        ("WordPenalty", 0.2),
        ("TargetBigram_x_y", 0.7),
    ];
    let d = decoder(
        RULES,
        &[
            "PhraseModel -owner pt",
            "PhraseModel -owner glue",
            "WordPenalty",
            "TargetBigram",
        ],
        &weights,
    );
    let opts = SearchOptions {
        top_n: 3,
        include_features: true,
        include_alignment: true,
        ..no_oovs(&d)
    };
    let t = d.decode(&sentence(&d, "a b", opts));
    assert!(!t.derivations.is_empty());
    let weights: BTreeMap<&str, f32> = weights.into_iter().collect();
    for derivation in &t.derivations {
        let features = derivation.features.as_ref().unwrap();
        let total: f32 = features
            .iter()
            .map(|(name, v)| v * weights.get(name.as_str()).copied().unwrap_or(0.0))
            .sum();
        assert!((total - derivation.score).abs() < 1e-4, "{total} vs {}", derivation.score);
        let alignment = derivation.alignment.as_ref().unwrap();
        assert_eq!(alignment.len(), derivation.words.len());
    }
    assert!(t.to_text().contains("tm_pt_0="));
}

#[test]
fn exhausted_budget_fails_only_that_sentence() {
    let d = decoder(
        RULES,
        &["PhraseModel -owner pt", "OOVPenalty"],
        &[("tm_pt_0", 1.0), ("OOVPenalty", 1.0)],
    );
    let tight = SearchOptions {
        max_nodes: 2,
        ..d.options().clone()
    };
    let t = d.decode(&sentence(&d, "a b", tight));
    assert!(t.is_empty());
    assert!(t.failure.as_deref().unwrap().contains("limit 2"));

    let t = d.decode(&d.sentence(1, "a b").unwrap());
    assert_eq!(t.best().unwrap().text, "x y");
    assert!(t.failure.is_none());
}

#[test]
fn unknown_words_pass_through() {
    let d = decoder(
        RULES,
        &["PhraseModel -owner pt", "OOVPenalty"],
        &[("tm_pt_0", 1.0), ("OOVPenalty", 1.0)],
    );
    let t = d.decode(&d.sentence(0, "a zz b").unwrap());
    assert_eq!(t.best().unwrap().text, "x zz y");

    let t = d.decode(&d.sentence(1, "a [1] b [X]").unwrap());
    assert!(t.failure.is_none());
    assert_eq!(t.best().unwrap().text, "x [1] y [X]");

    let t = d.decode(&sentence(&d, "a zz", no_oovs(&d)));
    assert!(t.is_empty());
    assert!(t.failure.is_none());
}

#[test]
fn stack_search_through_decoder() {
    let d = decoder(RULES, &["PhraseModel -owner pt"], &[("tm_pt_0", 1.0)]);
    let opts = SearchOptions {
        algorithm: SearchAlgorithm::Stack,
        ..no_oovs(&d)
    };
    let t = d.decode(&sentence(&d, "a b", opts));
    assert_eq!(t.best().unwrap().text, "x y");
    assert!((t.best().unwrap().score - -0.4).abs() < 1e-6);
}

#[test]
fn sorting_happens_once_per_collection() {
    let ctx = Context::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = FeatureRegistry::with_builtins();
    let functions: Vec<Box<dyn FeatureFunction>> = vec![
        Box::new(CountingFeature {
            calls: Arc::clone(&calls),
        }),
        registry.create("PhraseModel -owner pt", &ctx).unwrap(),
    ];
    let weights = FeatureVector::from_named(&ctx.features, [("tm_pt_0", 1.0f32)]);
    let features = FeatureSet::new(functions, weights);
    let g = grammar(
        &ctx,
        "pt",
        &[
            "[X] ||| a ||| x ||| -1",
            "[X] ||| a ||| z ||| -0.2",
            "[X] ||| a ||| w ||| -0.5",
        ],
    );
    let a = ctx.vocab.id("a");
    let collection = g.rules_for(&[a]).unwrap();
    assert!(!collection.is_sorted());

    let first: Vec<_> = collection.sorted_rules(&features).to_vec();
    let after_first = calls.load(Ordering::SeqCst);
    assert!(after_first > 0);
    let best = [TargetSymbol::Word(ctx.vocab.id("z"))];
    assert_eq!(first[0].target(), &best[..]);

    let second = collection.sorted_rules(&features);
    assert_eq!(second.len(), first.len());
    assert!(first.iter().zip(second).all(|(x, y)| Arc::ptr_eq(x, y)));
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
    assert!(collection.is_sorted());
}

#[test]
fn eager_sorting_sorts_before_first_sentence() {
    let ctx = Context::new();
    let grammars = vec![grammar(&ctx, "pt", RULES)];
    let features = feature_set(&ctx, &["PhraseModel -owner pt"], &[("tm_pt_0", 1.0)]);
    let mut config = DecoderConfig::default();
    config.runtime.rule_sorting = RuleSorting::Eager;
    let a = ctx.vocab.id("a");
    let d = Decoder::new(ctx, &config, grammars, features).unwrap();
    assert!(d.grammars()[0].rules_for(&[a]).unwrap().is_sorted());
}

fn write_file(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

const ARPA: &str = "\\data\\
ngram 1=5
ngram 2=4

\\1-grams:
-1.0 <s> -0.5
-1.0 </s>
-0.7 x -0.3
-0.9 y -0.2
-1.2 z

\\2-grams:
-0.2 <s> x
-0.1 x y
-0.3 y </s>
-0.4 z </s>

\\end\\
";

#[test]
fn language_model_scores_the_whole_output() {
    let dir = tempfile::tempdir().unwrap();
    let grammar_path = write_file(
        dir.path(),
        "grammar.txt",
        "[X] ||| a ||| x ||| 0\n[X] ||| b ||| y ||| 0\n[X] ||| b ||| z ||| 0\n",
    );
    let lm_path = write_file(dir.path(), "lm.arpa", ARPA);

    let mut config = DecoderConfig::default();
    config.oov.inject = false;
    config.output.include_features = true;
    config.features = vec![
        "PhraseModel -owner pt".to_string(),
        format!("LanguageModel -path {}", lm_path.display()),
    ];
    config.grammars.push(GrammarSettings {
        path: grammar_path,
        owner: "pt".to_string(),
        span_limit: None,
    });
    config.weights.insert("lm_0".to_string(), 1.0);
    let d = Decoder::from_config(&config, &FeatureRegistry::default()).unwrap();

    let t = d.decode(&d.sentence(0, "a b").unwrap());
    let best = t.best().unwrap();
    assert_eq!(best.text, "x y");

    let ctx = d.context();
    let model = NgramModel::open(&lm_path, &ctx.vocab).unwrap();
    assert_eq!(model.order(), 2);
    let mut items = vec![LmItem::Word(Symbol::BOS)];
    items.extend(best.words.iter().map(|&w| LmItem::Word(w)));
    items.push(LmItem::Word(Symbol::EOS));
    let (flat, _) = score_items(&model, &items, &mut LmCache::default());
    let reported = best.features.as_ref().unwrap()["lm_0"];
    assert!((reported - flat).abs() < 1e-4, "{reported} vs {flat}");
    assert!((best.score - flat).abs() < 1e-4);
}

#[test]
fn missing_grammar_file_is_reported() {
    let mut config = DecoderConfig::default();
    config.grammars.push(GrammarSettings {
        path: "/nonexistent/grammar.txt".into(),
        owner: "pt".to_string(),
        span_limit: None,
    });
    let err = Decoder::from_config(&config, &FeatureRegistry::default())
        .err()
        .unwrap();
    assert!(err.to_string().contains("/nonexistent/grammar.txt"));
}
