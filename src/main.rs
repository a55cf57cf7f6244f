//! Heap allocator simulator CLI
//!
//! Runs a request script against a simulated heap and writes the final heap out
//! word by word.
//!
//! # Usage
//!
//! ```text
//! freelist-sim [-h] -f <FILE> -l <I|E> -a <F|B> [-o <FILE>] [-v]
//!
//!   -f <FILE>  Path to the request script
//!   -l <I|E>   Free list type: I for Implicit, E for Explicit
//!   -a <F|B>   Allocation type: F for First-fit, B for Best-fit
//!   -o <FILE>  Where to write the heap dump [default: output.txt]
//!   -v         Debug logging
//!   -h         Print help
//! ```

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use freelist_sim::{dump, script, FitPolicy, ListMode, SimConfig, Simulator};

/// Simulates a word addressed heap allocator over a script of allocate, free
/// and reallocate requests.
#[derive(Parser)]
#[command(name = "freelist-sim")]
#[command(version)]
#[command(about = "Simulates an implicit or explicit free list heap allocator", long_about = None)]
struct Cli {
    /// Path to the input file to read requests from
    #[arg(short = 'f', value_name = "FILE")]
    file: PathBuf,

    /// Free list type: I for Implicit, E for Explicit
    #[arg(short = 'l', value_name = "I|E")]
    list: ListMode,

    /// Allocation type: F for First-fit, B for Best-fit
    #[arg(short = 'a', value_name = "F|B")]
    fit: FitPolicy,

    /// Where to write the heap dump
    #[arg(short = 'o', value_name = "FILE", default_value = "output.txt")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn write_dump(simulator: &Simulator, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create heap dump: {}", path.display()))?;
    dump::write_heap_dump(simulator, BufWriter::new(file))
        .with_context(|| format!("Failed to write heap dump: {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let requests = script::read_script(&cli.file)
        .with_context(|| format!("Failed to read request script: {}", cli.file.display()))?;

    let mut simulator = Simulator::new(SimConfig::new(cli.list, cli.fit))?;
    info!(
        requests = requests.len(),
        list = %cli.list,
        fit = %cli.fit,
        "running simulation"
    );

    let report = simulator.run(requests);
    if let Some(err) = &report.out_of_memory {
        println!(
            "Heap space in excess of {} words with this call, stopping simulator",
            simulator.heap().ceiling()
        );
        info!(%err, "simulated program ran out of memory");
    }
    info!(
        executed = report.executed,
        rejected = report.rejected,
        heap_words = simulator.heap_size(),
        "simulation finished"
    );

    write_dump(&simulator, &cli.output)
}
