use std::sync::Arc;

use crate::context::{Context, OwnerId};
use crate::feature::FeatureVector;
use crate::vocab::Symbol;

use super::{GrammarError, MemoryGrammar, Rule, TargetSymbol};

/// Feature counting applications of the left-branching glue rule.
pub const GLUE_FEATURE: &str = "tm_glue_0";

/// Glue grammar for chart search over `<s> w1 … wn </s>`:
///
/// ```text
/// [GOAL] ||| <s>            ||| <s>
/// [GOAL] ||| [GOAL,1] [N,2] ||| [GOAL,1] [N,2]   (one per label N)
/// [GOAL] ||| [GOAL,1] </s>  ||| [GOAL,1] </s>
/// ```
pub fn cky_glue_grammar(
    ctx: &Context,
    goal: Symbol,
    labels: &[Symbol],
) -> Result<MemoryGrammar, GrammarError> {
    let mut grammar = MemoryGrammar::new(OwnerId::GLUE, None);
    grammar.add_rule(Rule::new(
        goal,
        vec![Symbol::BOS],
        vec![TargetSymbol::Word(Symbol::BOS)],
        FeatureVector::new(),
        vec![(0, 0)],
        OwnerId::GLUE,
    )?);
    let glue = ctx.features.id(GLUE_FEATURE);
    for &label in labels.iter().filter(|&&l| l != goal) {
        let mut features = FeatureVector::new();
        features.add(glue, 1.0);
        grammar.add_rule(Rule::new(
            goal,
            vec![goal, label],
            vec![TargetSymbol::Slot(0), TargetSymbol::Slot(1)],
            features,
            Vec::new(),
            OwnerId::GLUE,
        )?);
    }
    grammar.add_rule(Rule::new(
        goal,
        vec![goal, Symbol::EOS],
        vec![TargetSymbol::Slot(0), TargetSymbol::Word(Symbol::EOS)],
        FeatureVector::new(),
        vec![(1, 1)],
        OwnerId::GLUE,
    )?);
    Ok(grammar)
}

/// The fixed rules stack search uses to chain phrases into hypotheses.
#[derive(Debug, Clone)]
pub struct PhraseGlue {
    /// `[GOAL] → <s>`: the empty hypothesis.
    pub begin: Arc<Rule>,
    /// `[GOAL] → [GOAL,1] [X,2] / [GOAL,1] [X,2]`
    pub straight: Arc<Rule>,
    /// `[GOAL] → [X,1] [GOAL,2] / [GOAL,2] [X,1]`
    pub inverted: Arc<Rule>,
}

impl PhraseGlue {
    pub fn new(goal: Symbol) -> Result<Self, GrammarError> {
        let begin = Rule::new(
            goal,
            vec![Symbol::BOS],
            vec![TargetSymbol::Word(Symbol::BOS)],
            FeatureVector::new(),
            vec![(0, 0)],
            OwnerId::GLUE,
        )?;
        let straight = Rule::new(
            goal,
            vec![goal, Symbol::X],
            vec![TargetSymbol::Slot(0), TargetSymbol::Slot(1)],
            FeatureVector::new(),
            vec![(0, 0), (1, 1)],
            OwnerId::GLUE,
        )?;
        let inverted = Rule::new(
            goal,
            vec![Symbol::X, goal],
            vec![TargetSymbol::Slot(1), TargetSymbol::Slot(0)],
            FeatureVector::new(),
            vec![(0, 1), (1, 0)],
            OwnerId::GLUE,
        )?;
        Ok(Self {
            begin: Arc::new(begin),
            straight: Arc::new(straight),
            inverted: Arc::new(inverted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    #[test]
    fn cky_glue_has_one_rule_per_label() {
        let ctx = Context::new();
        let np = ctx.vocab.id("[NP]");
        let g = cky_glue_grammar(&ctx, Symbol::GOAL, &[Symbol::X, np, Symbol::GOAL]).unwrap();
        // start + two labels + end
        assert_eq!(g.num_rules(), 4);
        assert!(g.rules_for(&[Symbol::BOS]).is_some());
        assert!(g.rules_for(&[Symbol::GOAL, np]).is_some());
        assert!(g.rules_for(&[Symbol::GOAL, Symbol::GOAL]).is_none());
        assert_eq!(g.span_limit(), None);
    }

    #[test]
    fn phrase_glue_orientation() {
        let glue = PhraseGlue::new(Symbol::GOAL).unwrap();
        assert!(!glue.straight.is_inverting());
        assert!(glue.inverted.is_inverting());
        assert_eq!(glue.begin.arity(), 0);
    }
}
