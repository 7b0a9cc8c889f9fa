//! Command-line entry point: load a configuration file, build the node
//! arena, run the event loop out to a horizon, and print a summary.

use backup_sim::config::{load_config, parse_timespan};
use backup_sim::{Result, SimError, Simulation};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "backup-sim", about = "Simulate a peer-to-peer backup network")]
struct Cli {
    /// Path to the configuration file describing node classes.
    config: PathBuf,

    /// How long to run the simulation for, as a plain number of seconds or
    /// a human-friendly span such as "100 years".
    #[arg(long = "max-t", default_value = "100 years")]
    max_t: String,

    /// Seed for the random number generator. Omit for a nondeterministic
    /// run seeded from the OS.
    #[arg(long)]
    seed: Option<String>,

    /// Enable verbose (debug-level) logging of every event.
    #[arg(short, long)]
    verbose: bool,

    /// Print the end-of-run summary to stdout.
    #[arg(long)]
    summary: bool,
}

fn seeded_rng(seed: Option<&str>) -> StdRng {
    match seed {
        Some(seed) => {
            let mut hasher = DefaultHasher::new();
            seed.hash(&mut hasher);
            StdRng::seed_from_u64(hasher.finish())
        }
        None => StdRng::from_entropy(),
    }
}

fn run(cli: Cli) -> Result<()> {
    let level = if cli.verbose { log::LevelFilter::Info } else { log::LevelFilter::Warn };
    env_logger::Builder::new().filter_level(level).init();

    let max_t = parse_timespan(&cli.max_t)?;
    let classes = load_config(&cli.config)?;
    if classes.is_empty() {
        return Err(SimError::Config(format!(
            "{}: no node classes defined",
            cli.config.display()
        )));
    }

    let rng = seeded_rng(cli.seed.as_deref());
    let mut sim = Simulation::new(&classes, rng)?;
    sim.run(max_t)?;

    if cli.summary {
        println!("{}", sim.summary());
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("backup-sim: {err}");
        std::process::exit(1);
    }
}
