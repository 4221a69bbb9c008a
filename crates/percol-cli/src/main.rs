#![forbid(unsafe_code)]
//! percol: drive the power-law graph engine from the command line.
//!
//! Each subcommand checks a JSON state file out, applies one engine
//! operation, and writes the result back, so the state file is the single
//! owner of the graph between invocations.

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use output::OutputMode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "percol: dynamic power-law graph engine with poison containment",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Seed the engine RNG for reproducible runs.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a fresh graph state file.
    Generate {
        /// State file to create.
        state: PathBuf,
        /// Number of nodes.
        #[arg(long, short = 'n')]
        nodes: usize,
        /// Edge budget for degree-biased sampling.
        #[arg(long, short = 'e')]
        edges: usize,
        /// Initial poison seed count.
        #[arg(long, default_value_t = 0)]
        poison: usize,
        /// Shape parameter: higher values concentrate edges on hubs.
        #[arg(long, default_value_t = 3.0)]
        gamma: f64,
    },

    /// Add nodes and edges to an existing graph.
    Add {
        state: PathBuf,
        /// Nodes to append.
        #[arg(long, short = 'n')]
        nodes: usize,
        /// Additional edge budget.
        #[arg(long, short = 'e')]
        edges: usize,
    },

    /// Delete nodes (explicit ids, or a random sample).
    Delete {
        state: PathBuf,
        /// Node ids to delete.
        #[arg(long, value_delimiter = ',', conflicts_with = "random")]
        ids: Vec<u64>,
        /// Delete this many randomly chosen nodes instead.
        #[arg(long)]
        random: Option<usize>,
    },

    /// Mark additional poison seeds.
    Poison {
        state: PathBuf,
        /// Number of new seeds.
        #[arg(long, short = 'c')]
        count: usize,
    },

    /// Scan poison reach and pick principal containment nodes.
    Scan {
        state: PathBuf,
        /// Principal budget.
        #[arg(long, short = 'p')]
        principals: usize,
    },

    /// Remove the current principals and quarantine their components.
    Contain { state: PathBuf },

    /// Report graph statistics.
    Stats { state: PathBuf },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PERCOL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mode = cli.output_mode();
    let seed = cli.seed;

    match cli.command {
        Commands::Generate {
            state,
            nodes,
            edges,
            poison,
            gamma,
        } => cmd::run_generate(&state, nodes, edges, poison, gamma, seed, mode),
        Commands::Add { state, nodes, edges } => cmd::run_add(&state, nodes, edges, seed, mode),
        Commands::Delete { state, ids, random } => {
            cmd::run_delete(&state, &ids, random, seed, mode)
        }
        Commands::Poison { state, count } => cmd::run_poison(&state, count, seed, mode),
        Commands::Scan { state, principals } => cmd::run_scan(&state, principals, seed, mode),
        Commands::Contain { state } => cmd::run_contain(&state, seed, mode),
        Commands::Stats { state } => cmd::run_stats(&state, mode),
    }
}
