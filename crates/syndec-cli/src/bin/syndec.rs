use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use syndec::config::SearchAlgorithm;
use syndec::TraceDetail;
use syndec_cli::commands::{config_ops, decode_ops, grammar_ops};

#[derive(Parser)]
#[command(name = "syndec", about = "Synchronous-grammar translation decoder")]
struct Cli {
    /// Write JSON-lines traces to this directory instead of logging to stderr
    #[arg(long, global = true)]
    trace_dir: Option<PathBuf>,

    /// Also trace chart cells, stacks and k-best extraction
    #[arg(long, global = true, requires = "trace_dir")]
    trace_search: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    Cky,
    Stack,
}

impl From<Algorithm> for SearchAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Cky => SearchAlgorithm::Cky,
            Algorithm::Stack => SearchAlgorithm::Stack,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Decode sentences, one per line, from a file or stdin
    Decode {
        /// Decoder config TOML (built-in defaults when omitted)
        #[arg(long)]
        config: Option<String>,
        /// Input file (stdin when omitted)
        #[arg(long)]
        input: Option<String>,
        /// Number of derivations per sentence
        #[arg(short, long)]
        n: Option<usize>,
        /// Worker threads
        #[arg(long)]
        threads: Option<usize>,
        /// Search algorithm, overriding the config
        #[arg(long, value_enum)]
        algorithm: Option<Algorithm>,
        /// Report feature values with each derivation
        #[arg(long)]
        features: bool,
        /// Output JSON lines instead of `|||` text
        #[arg(long)]
        json: bool,
    },

    /// Print the chart glue grammar for a grammar file
    Glue {
        /// Grammar file
        grammar: String,
        /// Owner name of the grammar
        #[arg(long, default_value = "pt")]
        owner: String,
        /// Goal nonterminal
        #[arg(long, default_value = "[GOAL]")]
        goal: String,
        /// Default nonterminal always glued
        #[arg(long, default_value = "[X]")]
        default_nonterminal: String,
    },

    /// Print rule counts of a grammar file
    Stats {
        /// Grammar file
        grammar: String,
        /// Owner name of the grammar
        #[arg(long, default_value = "pt")]
        owner: String,
        /// Output as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in default config
    ConfigExport,

    /// Validate a config file
    ConfigValidate {
        /// Config TOML file
        file: String,
    },
}

fn init_logging(trace_dir: Option<&PathBuf>, trace_search: bool) {
    if let Some(dir) = trace_dir {
        let detail = if trace_search {
            TraceDetail::Search
        } else {
            TraceDetail::Sentences
        };
        syndec::init_tracing(dir, detail);
        return;
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.trace_dir.as_ref(), cli.trace_search);

    match cli.command {
        Command::Decode {
            config,
            input,
            n,
            threads,
            algorithm,
            features,
            json,
        } => {
            let opts = decode_ops::DecodeOptions {
                top_n: n,
                threads,
                algorithm: algorithm.map(Into::into),
                include_features: features,
                json,
            };
            decode_ops::decode(config.as_deref(), input.as_deref(), &opts);
        }
        Command::Glue {
            grammar,
            owner,
            goal,
            default_nonterminal,
        } => grammar_ops::glue(&grammar, &owner, &goal, &default_nonterminal),
        Command::Stats {
            grammar,
            owner,
            json,
        } => grammar_ops::stats(&grammar, &owner, json),
        Command::ConfigExport => config_ops::config_export(),
        Command::ConfigValidate { file } => config_ops::config_validate(&file),
    }
}
