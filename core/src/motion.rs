//! Particle motion model.
//!
//! Advances one particle by one time step. The model treats heading and direction as two separately
//! perturbed quantities, and treats speed as a fast-mixing variable tied to the behavioral context: it is
//! redrawn from scratch every step from the distribution of the (possibly just switched) context rather
//! than integrated from the previous speed.

use nalgebra::Vector2;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Normal, Uniform};
use thiserror::Error;

use crate::config::{MotionConfig, SpeedDistribution};
use crate::error::FilterError;
use crate::{Context, ParticleState, wrap_to_360};

/// Smallest pre-normalization direction norm that is still renormalized.
pub const MIN_DIRECTION_NORM: f64 = 1e-9;

/// The perturbed direction vector was too short (or not finite) to renormalize.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("degenerate direction vector with norm {norm:e}")]
pub struct DegenerateDirection {
    pub norm: f64,
}

/// Stochastic transition for a single particle.
#[derive(Clone, Debug)]
pub struct MotionModel {
    heading_offset: Uniform<f64>,
    context_switch: Bernoulli,
    direction_jitter: Uniform<f64>,
    sailing_speed: Normal<f64>,
    fishing_speed: Normal<f64>,
}

impl MotionModel {
    pub fn new(config: &MotionConfig) -> Result<Self, FilterError> {
        let window = config.heading_window_deg;
        let heading_offset = Uniform::new_inclusive(-window, window).map_err(|e| {
            FilterError::Configuration(format!("invalid heading window {}: {}", window, e))
        })?;
        let jitter = config.direction_jitter;
        let direction_jitter = Uniform::new_inclusive(-jitter, jitter).map_err(|e| {
            FilterError::Configuration(format!("invalid direction jitter {}: {}", jitter, e))
        })?;
        let context_switch = Bernoulli::new(config.context_switch_probability).map_err(|e| {
            FilterError::Configuration(format!(
                "invalid context switch probability {}: {}",
                config.context_switch_probability, e
            ))
        })?;
        Ok(MotionModel {
            heading_offset,
            context_switch,
            direction_jitter,
            sailing_speed: speed_distribution("sailing", config.sailing_speed)?,
            fishing_speed: speed_distribution("fishing", config.fishing_speed)?,
        })
    }

    /// Advance `state` by `dt`.
    ///
    /// Draw order is fixed (heading, context, speed, direction components) so that a given generator
    /// stream always produces the same transition.
    pub fn step<R: Rng + ?Sized>(
        &self,
        state: &ParticleState,
        dt: f64,
        rng: &mut R,
    ) -> Result<ParticleState, DegenerateDirection> {
        let heading = wrap_to_360(state.heading + self.heading_offset.sample(rng));

        let context = if self.context_switch.sample(rng) {
            state.context.toggled()
        } else {
            state.context
        };

        let speed = match context {
            Context::Sailing => self.sailing_speed.sample(rng),
            Context::Fishing => self.fishing_speed.sample(rng),
        };

        let perturbed = Vector2::new(
            state.direction.x + self.direction_jitter.sample(rng),
            state.direction.y + self.direction_jitter.sample(rng),
        );
        let norm = perturbed.norm();
        // also rejects NaN
        if !(norm.is_finite() && norm > MIN_DIRECTION_NORM) {
            return Err(DegenerateDirection { norm });
        }
        let direction = perturbed / norm;

        Ok(ParticleState {
            position: state.position + direction * (speed * dt),
            direction,
            heading,
            speed,
            context,
        })
    }
}

fn speed_distribution(name: &str, speed: SpeedDistribution) -> Result<Normal<f64>, FilterError> {
    Normal::new(speed.mean, speed.std_dev).map_err(|e| {
        FilterError::Configuration(format!(
            "invalid {} speed distribution N({}, {}): {}",
            name, speed.mean, speed.std_dev, e
        ))
    })
}
