//! Filter configuration.
//!
//! [`FilterConfig`] collects every tunable of a run. It can be built in code (starting from
//! [`FilterConfig::default`]) or read from a JSON, YAML, or TOML file; the format is chosen by file
//! extension.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::FilterError;
use crate::resample::ResamplingStrategy;

/// Parameters of a normal speed distribution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedDistribution {
    pub mean: f64,
    pub std_dev: f64,
}
impl SpeedDistribution {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        SpeedDistribution { mean, std_dev }
    }
}

/// Motion model parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Half width of the uniform heading perturbation window, in degrees (about 0.4 rad)
    pub heading_window_deg: f64,
    /// Probability that a particle switches context in one step
    pub context_switch_probability: f64,
    /// Half width of the uniform perturbation added to each direction component
    pub direction_jitter: f64,
    /// Speed distribution while sailing
    pub sailing_speed: SpeedDistribution,
    /// Speed distribution while fishing
    pub fishing_speed: SpeedDistribution,
}
impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            heading_window_deg: 22.91,
            context_switch_probability: 0.1,
            direction_jitter: 0.4,
            sailing_speed: SpeedDistribution::new(3.31, 1.19),
            fishing_speed: SpeedDistribution::new(1.36, 0.89),
        }
    }
}

/// Configuration for a full filter run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles, constant for the whole run
    pub num_particles: usize,
    /// Observation noise scale of the emission model
    pub sigma: f64,
    /// Constant scale applied to every likelihood. It does not change which particles are selected or
    /// resampled; it only moves the magnitude of the weights.
    pub alpha: f64,
    /// Base seed for every random stream of the run
    pub seed: u64,
    pub resampling: ResamplingStrategy,
    /// Propagate and weight particles on the rayon thread pool. Results are identical either way.
    pub parallel: bool,
    /// Keep a snapshot of the weighted population at every step
    pub record_history: bool,
    pub motion: MotionConfig,
}
impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 100,
            sigma: 80.0,
            alpha: 1e5,
            seed: 42,
            resampling: ResamplingStrategy::default(),
            parallel: false,
            record_history: false,
            motion: MotionConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Check every parameter. Called by the filter before any sampling happens.
    pub fn validate(&self) -> Result<(), FilterError> {
        let invalid = |msg: String| Err(FilterError::Configuration(msg));
        if self.num_particles == 0 {
            return invalid("number of particles must be positive".to_string());
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return invalid(format!("sigma must be finite and positive, got {}", self.sigma));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return invalid(format!("alpha must be finite and positive, got {}", self.alpha));
        }
        let motion = &self.motion;
        if !(motion.heading_window_deg.is_finite() && motion.heading_window_deg >= 0.0) {
            return invalid(format!(
                "heading window must be finite and non-negative, got {}",
                motion.heading_window_deg
            ));
        }
        if !(0.0..=1.0).contains(&motion.context_switch_probability) {
            return invalid(format!(
                "context switch probability must be in [0, 1], got {}",
                motion.context_switch_probability
            ));
        }
        if !(motion.direction_jitter.is_finite() && motion.direction_jitter >= 0.0) {
            return invalid(format!(
                "direction jitter must be finite and non-negative, got {}",
                motion.direction_jitter
            ));
        }
        for (name, speed) in [
            ("sailing", motion.sailing_speed),
            ("fishing", motion.fishing_speed),
        ] {
            if !(speed.mean.is_finite() && speed.std_dev.is_finite() && speed.std_dev >= 0.0) {
                return invalid(format!(
                    "{} speed distribution is invalid: mean {}, std dev {}",
                    name, speed.mean, speed.std_dev
                ));
            }
        }
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}
