//! Sampling-Importance-Resampling.
//!
//! All strategies share the same selection rule: build the cumulative weight table `K`, draw a pointer
//! `t` in `(0, T]` where `T` is the total weight, and select the smallest index `j` with `K[j] >= t`.
//! Ties therefore go to the lower index, and a particle with zero weight can never be selected. The
//! strategies differ only in how the pointers are drawn and how the table is searched.

use rand::Rng;
use rand_distr::{Distribution, OpenClosed01};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ResampleError {
    /// The weights sum to zero (every likelihood underflowed) or to a non-finite value
    #[error("importance collapse: total weight is {total}")]
    ImportanceCollapse { total: f64 },
    #[error("weight {weight} at index {index} is negative or not a number")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("{particles} particles but {weights} weights")]
    LengthMismatch { particles: usize, weights: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ResamplingStrategy {
    /// Independent draws with a linear scan of the cumulative table per draw, O(N^2)
    Naive,
    /// Independent draws with a binary search per draw, O(N log N). Same draws and same selections as
    /// `Naive`.
    #[default]
    Multinomial,
    /// A single offset and N evenly spaced pointers, O(N)
    Systematic,
    /// One independent pointer per stratum of width T/N, O(N)
    Stratified,
}

impl ResamplingStrategy {
    /// Draw `particles.len()` particles in proportion to `weights`.
    pub fn resample<T: Clone, R: Rng + ?Sized>(
        &self,
        particles: &[T],
        weights: &[f64],
        rng: &mut R,
    ) -> Result<Vec<T>, ResampleError> {
        let cumulative = cumulative_weights(particles.len(), weights)?;
        let indices = match self {
            ResamplingStrategy::Naive => naive_indices(&cumulative, rng),
            ResamplingStrategy::Multinomial => multinomial_indices(&cumulative, rng),
            ResamplingStrategy::Systematic => systematic_indices(&cumulative, rng),
            ResamplingStrategy::Stratified => stratified_indices(&cumulative, rng),
        };
        Ok(indices.into_iter().map(|j| particles[j].clone()).collect())
    }
}

/// Cumulative weight table. Fails unless the weights are aligned with the particles, non-negative, and
/// have a strictly positive, finite total.
pub fn cumulative_weights(particles: usize, weights: &[f64]) -> Result<Vec<f64>, ResampleError> {
    if particles != weights.len() {
        return Err(ResampleError::LengthMismatch {
            particles,
            weights: weights.len(),
        });
    }
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for (index, &weight) in weights.iter().enumerate() {
        if !(weight >= 0.0) {
            return Err(ResampleError::InvalidWeight { index, weight });
        }
        total += weight;
        cumulative.push(total);
    }
    if !(total > 0.0 && total.is_finite()) {
        return Err(ResampleError::ImportanceCollapse { total });
    }
    Ok(cumulative)
}

/// Smallest index whose cumulative weight reaches `t`.
///
/// `t` must lie in `(0, T]`. The final clamp only guards against `t` landing a rounding error above
/// the last entry.
fn first_crossing(cumulative: &[f64], t: f64) -> usize {
    cumulative
        .partition_point(|&k| k < t)
        .min(cumulative.len() - 1)
}

/// A pointer in `(0, total]`.
///
/// With a subnormal `total` the product can round to zero; the pointer is then lifted to the smallest
/// positive double, which still selects the first particle with nonzero weight.
fn draw_pointer<R: Rng + ?Sized>(total: f64, rng: &mut R) -> f64 {
    let u: f64 = OpenClosed01.sample(rng);
    let t = u * total;
    if t > 0.0 { t } else { f64::from_bits(1) }
}

fn naive_indices<R: Rng + ?Sized>(cumulative: &[f64], rng: &mut R) -> Vec<usize> {
    let n = cumulative.len();
    let total = cumulative[n - 1];
    (0..n)
        .map(|_| {
            let t = draw_pointer(total, rng);
            let mut j = 0;
            while j < n - 1 && cumulative[j] < t {
                j += 1;
            }
            j
        })
        .collect()
}

fn multinomial_indices<R: Rng + ?Sized>(cumulative: &[f64], rng: &mut R) -> Vec<usize> {
    let n = cumulative.len();
    let total = cumulative[n - 1];
    (0..n)
        .map(|_| first_crossing(cumulative, draw_pointer(total, rng)))
        .collect()
}

fn systematic_indices<R: Rng + ?Sized>(cumulative: &[f64], rng: &mut R) -> Vec<usize> {
    let n = cumulative.len();
    let step = cumulative[n - 1] / n as f64;
    let offset = draw_pointer(step, rng);
    let mut indices = Vec::with_capacity(n);
    let mut j = 0;
    for i in 0..n {
        let t = offset + i as f64 * step;
        while j < n - 1 && cumulative[j] < t {
            j += 1;
        }
        indices.push(j);
    }
    indices
}

fn stratified_indices<R: Rng + ?Sized>(cumulative: &[f64], rng: &mut R) -> Vec<usize> {
    let n = cumulative.len();
    let step = cumulative[n - 1] / n as f64;
    let mut indices = Vec::with_capacity(n);
    let mut j = 0;
    for i in 0..n {
        let t = i as f64 * step + draw_pointer(step, rng);
        while j < n - 1 && cumulative[j] < t {
            j += 1;
        }
        indices.push(j);
    }
    indices
}

/// Effective sample size `(sum w)^2 / sum w^2`; equals N for uniform weights.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    let sum_of_squares: f64 = weights.iter().map(|w| w * w).sum();
    if sum_of_squares > 0.0 {
        sum * sum / sum_of_squares
    } else {
        0.0
    }
}
