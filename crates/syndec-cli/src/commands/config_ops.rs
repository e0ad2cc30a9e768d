use std::path::Path;

use syndec::config::{default_toml, DecoderConfig};

pub fn config_export() {
    print!("{}", default_toml());
}

pub fn config_validate(file: &str) {
    let c = die!(DecoderConfig::load(Path::new(file)), "Error: {}");
    println!(
        "OK: algorithm={:?}, pop_limit={}, grammars={}, features={}, weights={}",
        c.search.algorithm,
        c.search.pop_limit,
        c.grammars.len(),
        c.features.len(),
        c.weights.len()
    );
}
