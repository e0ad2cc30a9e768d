use crate::lm::NgramState;
use crate::vocab::Symbol;

/// First and last target word of a yield, `None` for an empty yield.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigramState {
    pub left: Option<Symbol>,
    pub right: Option<Symbol>,
}

/// Dynamic-programming state carried by a stateful feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DpState {
    Ngram(NgramState),
    Bigram(BigramState),
}

/// The states of all stateful features for one node, indexed by slot.
/// Two nodes may be merged only when their tuples are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StateTuple(Box<[Option<DpState>]>);

impl StateTuple {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: Vec<Option<DpState>>) -> Self {
        Self(slots.into_boxed_slice())
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&DpState> {
        self.0.get(slot).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
