use std::collections::{BTreeMap, HashMap};

use crate::context::{FeatureId, FeatureMap};

/// Sparse feature vector keyed by interned feature name.
///
/// Used both for rule-attached scores and for the decoder's weight vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    values: HashMap<FeatureId, f32>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `id`, zero when absent.
    #[inline]
    pub fn get(&self, id: FeatureId) -> f32 {
        self.values.get(&id).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, id: FeatureId, value: f32) {
        self.values.insert(id, value);
    }

    /// Adds `value` to the entry for `id`.
    pub fn add(&mut self, id: FeatureId, value: f32) {
        *self.values.entry(id).or_insert(0.0) += value;
    }

    /// Adds every entry of `other` into `self`.
    pub fn add_all(&mut self, other: &FeatureVector) {
        for (&id, &value) in &other.values {
            self.add(id, value);
        }
    }

    /// Σ self[k] · weights[k]
    pub fn dot(&self, weights: &FeatureVector) -> f32 {
        self.values
            .iter()
            .map(|(&id, &value)| value * weights.get(id))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, f32)> + '_ {
        self.values.iter().map(|(&id, &v)| (id, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolves ids to names, sorted by name for stable output.
    pub fn named(&self, names: &FeatureMap) -> BTreeMap<String, f32> {
        self.values
            .iter()
            .map(|(&id, &value)| (names.name(id), value))
            .collect()
    }

    /// Builds a vector from `(name, value)` pairs, interning each name.
    pub fn from_named<'a>(
        names: &FeatureMap,
        entries: impl IntoIterator<Item = (&'a str, f32)>,
    ) -> Self {
        let mut v = Self::new();
        for (name, value) in entries {
            v.add(names.id(name), value);
        }
        v
    }

    /// Renders `name=value` pairs sorted by name, the n-best list format.
    pub fn to_text(&self, names: &FeatureMap) -> String {
        self.named(names)
            .iter()
            .map(|(name, value)| format!("{name}={value:.3}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn add_and_dot() {
        let ctx = Context::new();
        let a = ctx.features.id("a");
        let b = ctx.features.id("b");
        let mut v = FeatureVector::new();
        v.add(a, 1.0);
        v.add(a, 2.0);
        v.add(b, -1.0);
        let weights = FeatureVector::from_named(&ctx.features, [("a", 0.5), ("c", 9.0)]);
        assert_eq!(v.get(a), 3.0);
        assert!((v.dot(&weights) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn text_is_sorted_by_name() {
        let ctx = Context::new();
        let v = FeatureVector::from_named(&ctx.features, [("zeta", 1.0), ("alpha", -2.5)]);
        assert_eq!(v.to_text(&ctx.features), "alpha=-2.500 zeta=1.000");
    }
}
