//! Observation likelihood.

use nalgebra::Vector2;
use rayon::prelude::*;

use crate::error::FilterError;
use crate::{Observation, ParticleState};

/// Isotropic Gaussian emission in planar distance.
///
/// `likelihood = alpha * 1 / (sqrt(2 pi) * sigma) * exp(-0.5 * (d / sigma)^2)`
///
/// The context of the particle is not used. `alpha` multiplies every particle's score by the same
/// constant, so it has no influence on the ranking of particles or on resampling; it only scales the
/// weight magnitudes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmissionModel {
    sigma: f64,
    normalizer: f64,
}

impl EmissionModel {
    pub fn new(sigma: f64, alpha: f64) -> Result<Self, FilterError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(FilterError::Configuration(format!(
                "sigma must be finite and positive, got {}",
                sigma
            )));
        }
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(FilterError::Configuration(format!(
                "alpha must be finite and positive, got {}",
                alpha
            )));
        }
        let normalizer = alpha / ((2.0 * std::f64::consts::PI).sqrt() * sigma);
        Ok(EmissionModel {
            sigma,
            normalizer,
        })
    }
    /// Likelihood of a particle at `position` having produced a report at `observed`.
    pub fn likelihood_at(&self, observed: &Vector2<f64>, position: &Vector2<f64>) -> f64 {
        let distance = (observed - position).norm();
        self.normalizer * (-0.5 * (distance / self.sigma).powi(2)).exp()
    }
    pub fn likelihood(&self, observation: &Observation, state: &ParticleState) -> f64 {
        self.likelihood_at(&observation.position, &state.position)
    }
    /// Weight vector for a whole population, aligned by index.
    pub fn weights(&self, observation: &Observation, particles: &[ParticleState]) -> Vec<f64> {
        particles
            .iter()
            .map(|p| self.likelihood(observation, p))
            .collect()
    }
    /// Same as [`EmissionModel::weights`], evaluated on the rayon pool.
    pub fn par_weights(&self, observation: &Observation, particles: &[ParticleState]) -> Vec<f64> {
        particles
            .par_iter()
            .map(|p| self.likelihood(observation, p))
            .collect()
    }
}
