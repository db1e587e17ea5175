//! Shared helpers for the command line tool: logger setup and track file discovery.

use std::error::Error;
use std::path::{Path, PathBuf};

/// Initialize the logger.
///
/// `log_level` is one of off, error, warn, info, debug, trace; anything else falls back to info. Logs go
/// to stderr unless `log_file` is given, in which case they are appended to that file.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn is_csv(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("csv")
}

/// Resolve the track files to replay.
///
/// A single `.csv` file is returned as is. For a directory, every `.csv` file directly inside it is
/// returned in sorted order.
pub fn get_track_files(input: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    if !input.exists() {
        return Err(format!("Input path '{}' does not exist.", input.display()).into());
    }
    if input.is_file() {
        if !is_csv(input) {
            return Err(format!("Input file '{}' is not a CSV file.", input.display()).into());
        }
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(format!(
            "Input path '{}' is neither a file nor a directory.",
            input.display()
        )
        .into());
    }
    let mut tracks: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_csv(path))
        .collect();
    if tracks.is_empty() {
        return Err(format!("No CSV files found in directory '{}'.", input.display()).into());
    }
    tracks.sort();
    Ok(tracks)
}

/// Create the output directory if it does not exist yet.
pub fn ensure_output_dir(output: &Path) -> Result<(), Box<dyn Error>> {
    if output.exists() && !output.is_dir() {
        return Err(format!("Output path '{}' is not a directory.", output.display()).into());
    }
    std::fs::create_dir_all(output)?;
    Ok(())
}

/// Path of the result file for `track` inside `output`, `{stem}{suffix}.csv`.
pub fn output_file_for(track: &Path, output: &Path, suffix: &str) -> Result<PathBuf, Box<dyn Error>> {
    let stem = track
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format!("Track path '{}' has no file name", track.display()))?;
    Ok(output.join(format!("{}{}.csv", stem, suffix)))
}
