//! redag CLI - estimate Bayesian-network edge probabilities from an
//! expression table.
//!
//! Usage:
//!   redag -g table.tsv -o edges.tsv -s 100000
//!
//! The input is a whitespace-separated table: a header line of variable
//! names followed by one row of values per observation. The output is one
//! `from<TAB>to<TAB>probability` line per observed edge.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;

use redag_core::{
    parse_scoring_function, EstimatorParams, Network, NetworkEstimator, ScoreCache, Variable,
};

#[derive(Parser)]
#[command(name = "redag")]
#[command(version)]
#[command(about = "Replica-exchange MCMC estimation of Bayesian-network edge probabilities")]
struct Cli {
    /// Input expression table (header of names, rows of values)
    #[arg(short = 'g', long = "gene-expression-table", value_name = "FILE")]
    input: String,

    /// Output file for the edge-probability table
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: String,

    /// Cold-chain steps per restart
    #[arg(short = 's', long = "steps", default_value_t = 20_000)]
    steps: u64,

    /// Warmup steps before swaps begin
    #[arg(short = 'w', long = "warmup", default_value_t = 0)]
    warmup: u64,

    /// Number of independent restarts
    #[arg(short = 'r', long = "runs", default_value_t = 100)]
    runs: usize,

    /// Worker threads
    #[arg(short = 'm', long = "threads", default_value_t = 1)]
    threads: usize,

    /// Chains per temperature ladder
    #[arg(short = 'c', long = "chains", default_value_t = 5)]
    chains: usize,

    /// Discretization classes per variable
    #[arg(long = "classes", default_value_t = 3)]
    classes: usize,

    /// Scoring function: "BDE <iss>", "K2" or "IC <penalty>"
    #[arg(long = "main-sf", default_value = "BDE 1")]
    scoring: String,

    /// Sampler batch size
    #[arg(long = "batch-size", default_value_t = 100)]
    batch_size: usize,

    /// Per-node top-action cache size
    #[arg(long = "cache-size", default_value_t = 25)]
    cache_size: usize,

    /// Per-node LRU capacity of parent-set samplers
    #[arg(long = "cached-states", default_value_t = 200)]
    cached_states: usize,

    /// Cold-chain steps between swap attempts
    #[arg(long = "swap-period", default_value_t = 1_000)]
    swap_period: u64,

    /// Geometric step scaling along the ladder
    #[arg(long = "steps-power-base", default_value_t = 2.0)]
    power_base: f64,

    /// Temperature spacing of the ladder
    #[arg(short = 'd', long = "temperature-delta", default_value_t = 0.25)]
    delta_t: f64,

    /// Master seed
    #[arg(long = "seed", default_value_t = 42)]
    seed: u64,
}

/// Parses the whitespace-separated expression table: first line names,
/// then one row of doubles per observation.
fn parse_table(raw: &str, classes: usize) -> Result<Vec<Variable>, String> {
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let names: Vec<&str> = lines
        .next()
        .ok_or("empty input table")?
        .split_whitespace()
        .collect();
    if names.is_empty() {
        return Err("input table has no variables".into());
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    for (row, line) in lines.enumerate() {
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() != names.len() {
            return Err(format!(
                "row {} has {} values, expected {}",
                row + 2,
                values.len(),
                names.len()
            ));
        }
        for (col, value) in values.iter().enumerate() {
            let parsed: f64 = value
                .parse()
                .map_err(|_| format!("row {}: bad value {value:?}", row + 2))?;
            columns[col].push(parsed);
        }
    }

    names
        .iter()
        .zip(columns)
        .enumerate()
        .map(|(i, (name, data))| {
            Variable::new(name, &data, classes, i).map_err(|e| e.to_string())
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut raw = String::new();
    if let Err(e) = File::open(&cli.input).and_then(|mut f| f.read_to_string(&mut raw)) {
        eprintln!("Error reading '{}': {}", cli.input, e);
        process::exit(1);
    }

    let variables = match parse_table(&raw, cli.classes) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error parsing '{}': {}", cli.input, e);
            process::exit(1);
        }
    };

    let scoring = match parse_scoring_function(&cli.scoring) {
        Ok(sf) => Arc::new(ScoreCache::new(sf)),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let network = match Network::new(variables, scoring) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let params = EstimatorParams {
        runs: cli.runs,
        threads: cli.threads,
        chains: cli.chains,
        batch_size: cli.batch_size,
        cache_size: cli.cache_size,
        cached_states: cli.cached_states,
        cold_chain_steps: cli.steps,
        warmup_steps: cli.warmup,
        swap_period: cli.swap_period,
        power_base: cli.power_base,
        delta_t: cli.delta_t,
        seed: cli.seed,
    };

    let estimator = NetworkEstimator::new(params);
    let cancel = AtomicBool::new(false);
    let edges = match estimator.run(&network, &cancel) {
        Ok(edges) => edges,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let out = match File::create(&cli.output) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error creating '{}': {}", cli.output, e);
            process::exit(1);
        }
    };
    let mut writer = BufWriter::new(out);
    for stat in edges.sorted() {
        let from = network.var(stat.from).name();
        let to = network.var(stat.to).name();
        if let Err(e) = writeln!(writer, "{}\t{}\t{}", from, to, stat.probability()) {
            eprintln!("Error writing '{}': {}", cli.output, e);
            process::exit(1);
        }
    }
}
