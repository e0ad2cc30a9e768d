use tracing::debug_span;

use super::coverage::Coverage;

/// Best achievable score for translating each source span, used to rank
/// hypotheses that cover different words.
///
/// `entry(b, e)` is the best of the best single phrase over `[b, e)` and
/// every split `entry(b, k) + entry(k, e)`. Spans nothing can translate
/// are `-inf`.
#[derive(Debug)]
pub struct FutureCosts {
    len: usize,
    table: Vec<f32>,
}

impl FutureCosts {
    /// `best_phrase(b, e)` gives the score of the best option over `[b, e)`.
    pub fn new(len: usize, best_phrase: impl Fn(usize, usize) -> Option<f32>) -> Self {
        let _span = debug_span!("future_costs", len).entered();
        let mut costs = Self {
            len,
            table: vec![f32::NEG_INFINITY; (len + 1) * (len + 1)],
        };
        for b in 0..=len {
            costs.set(b, b, 0.0);
        }
        for width in 1..=len {
            for b in 0..=len - width {
                let e = b + width;
                let mut best = best_phrase(b, e).unwrap_or(f32::NEG_INFINITY);
                for k in b + 1..e {
                    best = best.max(costs.entry(b, k) + costs.entry(k, e));
                }
                costs.set(b, e, best);
            }
        }
        costs
    }

    #[inline]
    pub fn entry(&self, begin: usize, end: usize) -> f32 {
        self.table[begin * (self.len + 1) + end]
    }

    fn set(&mut self, begin: usize, end: usize, value: f32) {
        self.table[begin * (self.len + 1) + end] = value;
    }

    /// Estimated score of translating everything `coverage` leaves open.
    pub fn estimate(&self, coverage: &Coverage) -> f32 {
        coverage.gaps().iter().map(|&(b, e)| self.entry(b, e)).sum()
    }
}
