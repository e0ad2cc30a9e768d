use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use syndec::config::{DecoderConfig, SearchAlgorithm};
use syndec::feature::FeatureRegistry;
use syndec::{Decoder, DecoderPool};

/// Command-line overrides of the config file.
#[derive(Debug, Default)]
pub struct DecodeOptions {
    pub top_n: Option<usize>,
    pub threads: Option<usize>,
    pub algorithm: Option<SearchAlgorithm>,
    pub include_features: bool,
    pub json: bool,
}

fn input_lines(input: Option<&str>) -> Box<dyn Iterator<Item = String> + Send> {
    match input {
        Some(path) => {
            let file = die!(File::open(path), "Error opening {path}: {}");
            Box::new(lines_lossy(BufReader::new(file)))
        }
        None => Box::new(lines_lossy(BufReader::new(io::stdin()))),
    }
}

/// Input lines with invalid UTF-8 replaced rather than ending the batch.
/// Only a read error stops the stream.
fn lines_lossy<R: BufRead>(reader: R) -> impl Iterator<Item = String> {
    reader.split(b'\n').map_while(|line| match line {
        Ok(mut bytes) => {
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) => {
            warn!(error = %e, "input read failed; no further sentences");
            None
        }
    })
}

pub fn decode(config_file: Option<&str>, input: Option<&str>, opts: &DecodeOptions) {
    let mut config = match config_file {
        Some(path) => die!(DecoderConfig::load(Path::new(path)), "Error: {}"),
        None => DecoderConfig::default(),
    };
    if let Some(n) = opts.top_n {
        config.output.top_n = n.max(1);
    }
    if let Some(t) = opts.threads {
        config.runtime.num_threads = t.max(1);
    }
    if let Some(a) = opts.algorithm {
        config.search.algorithm = a;
    }
    config.output.include_features |= opts.include_features;

    let started = Instant::now();
    let decoder = die!(
        Decoder::from_config(&config, &FeatureRegistry::default()),
        "Error building decoder: {}"
    );
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "decoder loaded");

    let pool = die!(
        DecoderPool::new(Arc::new(decoder), config.runtime.num_threads),
        "Error: {}"
    );
    let stream = die!(pool.decode_lines(input_lines(input)), "Error: {}");

    let started = Instant::now();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut sentences = 0usize;
    let mut failed = 0usize;
    for t in stream {
        sentences += 1;
        if t.failure.is_some() {
            failed += 1;
        }
        let line = if opts.json {
            die!(serde_json::to_string(&t), "Error serializing translation: {}")
        } else {
            t.to_text()
        };
        die!(writeln!(out, "{line}"), "Error writing output: {}");
    }
    die!(out.flush(), "Error writing output: {}");
    info!(
        sentences,
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "decoding finished"
    );
}
