//! CONTEXT SIM: replay AIS vessel tracks through the context-matching particle filter.
//!
//! Each input track is a pre-processed AIS CSV file (planar `x`/`y` positions, time gaps and a ground
//! truth label). The filter infers a state for every report after the first and the result is written
//! as one CSV per track. Parameters come from a configuration file (TOML/JSON/YAML), from command line
//! flags, or both; flags win.

mod common;

use clap::{Args, Parser, Subcommand};
use common::{ensure_output_dir, get_track_files, init_logger, output_file_for};
use context_matching::config::FilterConfig;
use context_matching::filter::ContextFilter;
use context_matching::resample::ResamplingStrategy;
use context_matching::sim::{ContextAgreement, load_observations, write_history, write_states};
use log::{error, info, warn};
use rayon::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "CONTEXT SIM: replay AIS vessel tracks through the context-matching particle filter.

The filter estimates, for every AIS report after the first, the hidden state of the vessel
(position, heading, speed) and its behavioral context, SAILING or FISHING.

Input tracks are CSV files with the columns
  id,t,longitude,latitude,x,y,signed_turn,bearing,time_gap,distance_gap,euc_speed,distanceToShore,label
Only x, y, time_gap and label are used. A label containing 'fishing' marks a fishing report.

Results are written as {output}/{track}.csv with the columns x,y,time_gap,heading,speed,context.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Replay AIS tracks through the context-matching particle filter.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Process track files in parallel when the input is a directory
    #[arg(long, global = true)]
    parallel: bool,
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the filter over one track or a directory of tracks"
    )]
    Run(RunArgs),
    #[command(name = "config", about = "Write a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Input track CSV file, or a directory of them
    #[arg(short, long, value_parser)]
    input: PathBuf,

    /// Output directory; created if missing
    #[arg(short, long, value_parser)]
    output: PathBuf,

    /// Filter configuration file (TOML/JSON/YAML). Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of particles
    #[arg(short = 'n', long)]
    particles: Option<usize>,

    /// Observation noise scale
    #[arg(long)]
    sigma: Option<f64>,

    /// Likelihood scale
    #[arg(long)]
    alpha: Option<f64>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Resampling strategy
    #[arg(long, value_enum)]
    resampling: Option<ResamplingStrategy>,

    /// Spread per-particle work of each step over threads
    #[arg(long)]
    parallel_particles: bool,

    /// Also write the weighted particle population of every step as {track}_history.csv
    #[arg(long)]
    history: bool,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Where to write the template; the extension picks the format
    #[arg(short, long, default_value = "context_config.toml")]
    output: PathBuf,
}

/// Start from the configuration file, if any, and apply the flag overrides.
fn build_config(args: &RunArgs) -> Result<FilterConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            FilterConfig::from_file(path)?
        }
        None => FilterConfig::default(),
    };
    if let Some(n) = args.particles {
        config.num_particles = n;
    }
    if let Some(sigma) = args.sigma {
        config.sigma = sigma;
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(resampling) = args.resampling {
        config.resampling = resampling;
    }
    if args.parallel_particles {
        config.parallel = true;
    }
    if args.history {
        config.record_history = true;
    }
    config.validate()?;
    Ok(config)
}

/// Run one track end to end and return how well the inferred contexts match its labels.
fn process_track(
    track: &Path,
    output: &Path,
    config: &FilterConfig,
) -> Result<ContextAgreement, Box<dyn Error>> {
    info!("Processing track: {}", track.display());
    let observations = load_observations(track)?;
    info!(
        "Read {} observations from {}",
        observations.len(),
        track.display()
    );

    let mut filter = ContextFilter::new(config.clone())?;
    let states = filter.run(&observations)?;

    let output_file = output_file_for(track, output, "")?;
    write_states(&states, &observations, &output_file)?;
    info!("Results written to {}", output_file.display());

    if config.record_history {
        let history_file = output_file_for(track, output, "_history")?;
        write_history(filter.history(), &history_file)?;
        info!("Particle history written to {}", history_file.display());
    }

    let agreement = ContextAgreement::evaluate(&states, &observations);
    info!("{}: {}", track.display(), agreement);
    Ok(agreement)
}

fn run(args: &RunArgs, parallel: bool) -> Result<(), Box<dyn Error>> {
    let config = build_config(args)?;
    info!(
        "Filter: {} particles, sigma {}, alpha {}, seed {}, {:?} resampling",
        config.num_particles, config.sigma, config.alpha, config.seed, config.resampling
    );

    let tracks = get_track_files(&args.input)?;
    ensure_output_dir(&args.output)?;
    let is_multiple = tracks.len() > 1;
    if is_multiple {
        info!("Processing {} track files", tracks.len());
    }

    let results: Vec<(PathBuf, Result<ContextAgreement, String>)> = if parallel && is_multiple {
        info!("Running in parallel mode");
        tracks
            .par_iter()
            .map(|track| {
                let result = process_track(track, &args.output, &config).map_err(|e| e.to_string());
                (track.clone(), result)
            })
            .collect()
    } else {
        tracks
            .iter()
            .map(|track| {
                let result = process_track(track, &args.output, &config).map_err(|e| e.to_string());
                (track.clone(), result)
            })
            .collect()
    };

    let mut total = ContextAgreement::default();
    let mut failures = Vec::new();
    for (track, result) in results {
        match result {
            Ok(agreement) => {
                total.correct += agreement.correct;
                total.incorrect += agreement.incorrect;
            }
            Err(e) => {
                error!("Error processing {}: {}", track.display(), e);
                failures.push(track);
            }
        }
    }
    if is_multiple {
        info!("Overall context agreement: {}", total);
    }
    if !failures.is_empty() {
        error!("{} track(s) failed to process", failures.len());
        return Err(format!("{} track(s) failed to process", failures.len()).into());
    }
    Ok(())
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    if args.output.exists() {
        warn!("Overwriting existing file {}", args.output.display());
    }
    FilterConfig::default().to_file(&args.output)?;
    info!("Template configuration written to {}", args.output.display());
    println!("\nYou can now run the filter with:");
    println!(
        "  context-sim run --config {} --input <tracks> --output <dir>",
        args.output.display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    match &cli.command {
        Command::Run(args) => run(args, cli.parallel),
        Command::CreateConfig(args) => create_config_file(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn run_args(input: PathBuf, output: PathBuf) -> RunArgs {
        RunArgs {
            input,
            output,
            config: None,
            particles: None,
            sigma: None,
            alpha: None,
            seed: None,
            resampling: None,
            parallel_particles: false,
            history: false,
        }
    }

    fn write_track(path: &Path, fishing_from: usize) {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(
            file,
            "id,t,longitude,latitude,x,y,signed_turn,bearing,time_gap,distance_gap,euc_speed,distanceToShore,label"
        )
        .unwrap();
        for i in 0..12 {
            let label = if i >= fishing_from { "02-fishing" } else { "01-sailing" };
            writeln!(
                file,
                "1,t{},0.0,0.0,{},0.0,0.0,90.0,10.0,33.1,3.31,500.0,{}",
                i,
                33.1 * i as f64,
                label
            )
            .unwrap();
        }
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "context-sim",
            "--log-level",
            "debug",
            "run",
            "-i",
            "tracks",
            "-o",
            "out",
            "-n",
            "250",
            "--resampling",
            "systematic",
            "--history",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.particles, Some(250));
                assert_eq!(args.resampling, Some(ResamplingStrategy::Systematic));
                assert!(args.history);
            }
            Command::CreateConfig(_) => panic!("expected run"),
        }
    }
    #[test]
    fn test_flags_override_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("filter.yaml");
        let file_config = FilterConfig {
            num_particles: 30,
            sigma: 25.0,
            ..FilterConfig::default()
        };
        file_config.to_file(&config_path).unwrap();

        let mut args = run_args(dir.path().join("in.csv"), dir.path().join("out"));
        args.config = Some(config_path);
        args.sigma = Some(40.0);
        args.seed = Some(7);
        let config = build_config(&args).unwrap();
        assert_eq!(config.num_particles, 30);
        assert_eq!(config.sigma, 40.0);
        assert_eq!(config.seed, 7);
    }
    #[test]
    fn test_invalid_override_rejected() {
        let dir = tempdir().unwrap();
        let mut args = run_args(dir.path().join("in.csv"), dir.path().join("out"));
        args.particles = Some(0);
        assert!(build_config(&args).is_err());
    }
    #[test]
    fn test_run_directory_writes_results() {
        let dir = tempdir().unwrap();
        let tracks = dir.path().join("tracks");
        std::fs::create_dir(&tracks).unwrap();
        write_track(&tracks.join("a.csv"), 12);
        write_track(&tracks.join("b.csv"), 6);
        let output = dir.path().join("out");

        let mut args = run_args(tracks, output.clone());
        args.particles = Some(40);
        args.history = true;
        run(&args, true).unwrap();

        for name in ["a", "b"] {
            let states = std::fs::read_to_string(output.join(format!("{}.csv", name))).unwrap();
            // header plus one row per observation after the first
            assert_eq!(states.lines().count(), 12);
            let history =
                std::fs::read_to_string(output.join(format!("{}_history.csv", name))).unwrap();
            // header plus 40 particles for the initial snapshot and each of 11 steps
            assert_eq!(history.lines().count(), 1 + 40 * 12);
        }
    }
    #[test]
    fn test_create_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("template.json");
        create_config_file(&CreateConfigArgs {
            output: path.clone(),
        })
        .unwrap();
        assert_eq!(
            FilterConfig::from_file(&path).unwrap(),
            FilterConfig::default()
        );
    }
}
