//! Per-decoder registries: vocabulary, grammar owners, feature names.
//!
//! One `Context` is built per decoder instance and shared through `Arc`;
//! nothing here is process-global, so two decoders with different
//! vocabularies can live side by side (e.g. in tests).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::vocab::Vocabulary;

/// Identifies the grammar a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OwnerId(u16);

impl OwnerId {
    /// Owner of the glue rules.
    pub const GLUE: OwnerId = OwnerId(0);
    /// Owner of per-sentence pass-through rules for unknown words.
    pub const OOV: OwnerId = OwnerId(1);
}

/// Identifies a feature (dense or sparse) by interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FeatureId(u32);

/// Generic interned-name registry shared by owners and features.
struct NameTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl NameTable {
    fn with(preset: &[&str]) -> Self {
        let mut table = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };
        for name in preset {
            table.insert(name);
        }
        table
    }

    fn insert(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }
}

pub struct OwnerMap {
    table: RwLock<NameTable>,
}

impl OwnerMap {
    fn new() -> Self {
        Self {
            table: RwLock::new(NameTable::with(&["glue", "oov"])),
        }
    }

    pub fn id(&self, name: &str) -> OwnerId {
        if let Some(&idx) = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .get(name)
        {
            return OwnerId(idx as u16);
        }
        let idx = self
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name);
        OwnerId(idx as u16)
    }

    pub fn name(&self, owner: OwnerId) -> String {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(owner.0 as usize)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct FeatureMap {
    table: RwLock<NameTable>,
}

impl FeatureMap {
    fn new() -> Self {
        Self {
            table: RwLock::new(NameTable::with(&[])),
        }
    }

    pub fn id(&self, name: &str) -> FeatureId {
        if let Some(id) = self.get(name) {
            return id;
        }
        let idx = self
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name);
        FeatureId(idx as u32)
    }

    pub fn get(&self, name: &str) -> Option<FeatureId> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .get(name)
            .map(|&idx| FeatureId(idx as u32))
    }

    pub fn name(&self, id: FeatureId) -> String {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(id.0 as usize)
            .cloned()
            .unwrap_or_default()
    }
}

/// Registries shared by every component of one decoder.
pub struct Context {
    pub vocab: Vocabulary,
    pub owners: OwnerMap,
    pub features: FeatureMap,
}

impl Context {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vocab: Vocabulary::new(),
            owners: OwnerMap::new(),
            features: FeatureMap::new(),
        })
    }
}
