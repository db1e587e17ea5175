//! Behavioral context inference for vessel tracks
//!
//! This crate implements a sequential Monte Carlo (particle) filter that infers the latent behavioral
//! context of a vessel, either sailing or fishing, from a time-ordered sequence of noisy 2D position
//! observations. The observations typically come from AIS (Automatic Identification System) tracks that
//! have been projected into a planar coordinate system upstream. Distances are computed in that plane;
//! no geodesic correction is applied.
//!
//! Each particle is a hypothesis of the hidden vessel state: position, direction of travel, heading,
//! speed, and behavioral context. One filter step follows the classic Sampling-Importance-Resampling
//! (SIR) cycle:
//!
//! 1. **Propagate** every particle through the [`motion::MotionModel`]. The context flips with a small
//!    probability and the speed is redrawn from the distribution associated with the new context.
//! 2. **Weight** every particle with the [`emission::EmissionModel`], a Gaussian in the distance between
//!    the particle and the observed position.
//! 3. **Select** the particle with the highest weight as the point estimate for the step.
//! 4. **Resample** the population in proportion to the weights (see [`resample`]).
//!
//! The engine that drives this cycle is [`filter::ContextFilter`].
//!
//! All randomness flows through explicit generator handles derived from a single seed (see
//! [`random::RandomSource`]), so a run is fully reproducible and the per-particle work within a step can
//! be spread across threads without changing the result.
//!
//! # Example
//!
//! ```rust
//! use context_matching::{Context, Observation};
//! use context_matching::config::FilterConfig;
//! use context_matching::filter::ContextFilter;
//! use nalgebra::Vector2;
//!
//! let observations: Vec<Observation> = (0..5)
//!     .map(|i| Observation::new(Vector2::new(10.0 * i as f64, 0.0), 3.0, Context::Sailing))
//!     .collect();
//! let config = FilterConfig { num_particles: 50, ..FilterConfig::default() };
//! let mut filter = ContextFilter::new(config).unwrap();
//! let states = filter.run(&observations).unwrap();
//! assert_eq!(states.len(), observations.len() - 1);
//! ```

pub mod config;
pub mod emission;
pub mod error;
pub mod filter;
pub mod motion;
pub mod random;
pub mod resample;
pub mod sim;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use std::fmt::{self, Display};
use std::str::FromStr;

/// Latent behavioral context of a vessel.
///
/// A closed, two-state type. Richer voyage models (heading out, fishing, returning
/// to port) belong in their own enum rather than in extra variants here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Context {
    #[default]
    Sailing,
    Fishing,
}
impl Context {
    /// Interpret a raw ground-truth label. Any label containing `fishing` is fishing, anything else
    /// is sailing.
    pub fn from_label(label: &str) -> Self {
        if label.contains("fishing") {
            Context::Fishing
        } else {
            Context::Sailing
        }
    }
    /// The other context.
    pub fn toggled(self) -> Self {
        match self {
            Context::Sailing => Context::Fishing,
            Context::Fishing => Context::Sailing,
        }
    }
}
impl Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Sailing => write!(f, "SAILING"),
            Context::Fishing => write!(f, "FISHING"),
        }
    }
}
impl FromStr for Context {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SAILING" => Ok(Context::Sailing),
            "FISHING" => Ok(Context::Fishing),
            _ => Err(format!("Invalid context: {}", s)),
        }
    }
}

/// A single position report.
///
/// Observations are created once by the ingestion layer and never modified afterwards. The `truth`
/// field carries the labelled context for evaluation and is never read by the filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    /// Planar position of the report
    pub position: Vector2<f64>,
    /// Elapsed time since the previous report
    pub time_gap: f64,
    /// Ground-truth context label
    pub truth: Context,
}
impl Observation {
    pub fn new(position: Vector2<f64>, time_gap: f64, truth: Context) -> Self {
        Observation {
            position,
            time_gap,
            truth,
        }
    }
    /// True when the position and time gap are usable by the filter.
    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.time_gap.is_finite()
            && self.time_gap >= 0.0
    }
}
impl Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("x", &self.position.x)
            .field("y", &self.position.y)
            .field("time_gap", &self.time_gap)
            .field("truth", &self.truth)
            .finish()
    }
}

/// One hypothesis of the hidden vessel state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleState {
    /// Planar position
    pub position: Vector2<f64>,
    /// Unit direction of travel
    pub direction: Vector2<f64>,
    /// Heading in degrees, [0, 360)
    pub heading: f64,
    /// Speed in planar units per unit time
    pub speed: f64,
    pub context: Context,
}
impl Default for ParticleState {
    fn default() -> Self {
        ParticleState {
            position: Vector2::zeros(),
            direction: Vector2::new(1.0, 0.0),
            heading: 0.0,
            speed: 0.0,
            context: Context::Sailing,
        }
    }
}
impl Display for ParticleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleState")
            .field("x", &self.position.x)
            .field("y", &self.position.y)
            .field("direction", &(self.direction.x, self.direction.y))
            .field("heading", &self.heading)
            .field("speed", &self.speed)
            .field("context", &self.context)
            .finish()
    }
}

/// Wrap an angle to the range [0, 360) degrees
///
/// # Example
/// ```rust
/// use context_matching::wrap_to_360;
/// assert_eq!(wrap_to_360(370.0), 10.0);
/// assert_eq!(wrap_to_360(-10.0), 350.0);
/// assert_eq!(wrap_to_360(360.0), 0.0);
/// ```
pub fn wrap_to_360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
