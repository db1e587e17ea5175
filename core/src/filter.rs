//! Particle filter engine.
//!
//! [`ContextFilter`] owns the particle population and drives it through the Sampling-Importance-
//! Resampling cycle, one observation at a time. It moves through three phases:
//!
//! - **Init**: the population does not exist yet. [`ContextFilter::initialize`] seeds it from the first
//!   two observations.
//! - **Step**: each call to [`ContextFilter::step`] consumes one observation and returns the point
//!   estimate for it.
//! - **Done**: [`ContextFilter::run`] has processed the whole sequence.
//!
//! A run is atomic. Any failure aborts it and is returned with the step index; no partial output is
//! produced and nothing is retried.
use log::{debug, info, warn};
use nalgebra::Vector2;
use rand::Rng;
use rayon::prelude::*;
use std::f64::consts::TAU;
use std::fmt::{self, Debug};

use crate::config::FilterConfig;
use crate::emission::EmissionModel;
use crate::error::{FilterError, Result};
use crate::motion::MotionModel;
use crate::random::RandomSource;
use crate::resample::effective_sample_size;
use crate::{Context, Observation, ParticleState};

/// Effective sample size below this fraction of the population is reported as a warning.
pub const LOW_ESS_FRACTION: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPhase {
    Init,
    Step,
    Done,
}

/// A particle together with its importance weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedParticle {
    pub state: ParticleState,
    pub weight: f64,
}

/// The weighted population at one step, kept when history recording is enabled.
///
/// Step 0 is the initial population with uniform weights; step `i > 0` is the population after it was
/// propagated and weighted against observation `i`, before resampling.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationSnapshot {
    pub step: usize,
    pub particles: Vec<WeightedParticle>,
}

pub struct ContextFilter {
    config: FilterConfig,
    motion: MotionModel,
    emission: EmissionModel,
    random: RandomSource,
    particles: Vec<ParticleState>,
    phase: FilterPhase,
    /// Index of the next observation to process
    step: usize,
    history: Vec<PopulationSnapshot>,
}

impl Debug for ContextFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fishing = self
            .particles
            .iter()
            .filter(|p| p.context == Context::Fishing)
            .count();
        f.debug_struct("ContextFilter")
            .field("phase", &self.phase)
            .field("step", &self.step)
            .field("num_particles", &self.particles.len())
            .field("fishing_particles", &fishing)
            .field("seed", &self.random.seed())
            .finish()
    }
}

impl ContextFilter {
    /// Build a filter from a configuration. The configuration is validated here, before any sampling.
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let motion = MotionModel::new(&config.motion)?;
        let emission = EmissionModel::new(config.sigma, config.alpha)?;
        let random = RandomSource::new(config.seed);
        Ok(ContextFilter {
            config,
            motion,
            emission,
            random,
            particles: Vec::new(),
            phase: FilterPhase::Init,
            step: 0,
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    pub fn phase(&self) -> FilterPhase {
        self.phase
    }
    pub fn particles(&self) -> &[ParticleState] {
        &self.particles
    }
    /// Recorded population snapshots; empty unless `record_history` is set.
    pub fn history(&self) -> &[PopulationSnapshot] {
        &self.history
    }

    /// Seed the population from the start of an observation sequence.
    ///
    /// Every particle starts at the first observation's position with a random unit direction, a random
    /// heading, zero speed, and the sailing context, and is then advanced once with the time gap of the
    /// second observation so the population does not start out identical. Calling this again discards
    /// the current population and starts over.
    pub fn initialize(&mut self, observations: &[Observation]) -> Result<()> {
        if observations.len() < 2 {
            return Err(FilterError::Configuration(format!(
                "at least 2 observations are required, got {}",
                observations.len()
            )));
        }
        if let Some(index) = observations.iter().position(|o| !o.is_valid()) {
            return Err(FilterError::Configuration(format!(
                "observation {} has a non-finite position or an invalid time gap",
                index
            )));
        }
        let origin = observations[0].position;
        let dt = observations[1].time_gap;
        let seed_particle = |index: usize| -> Result<ParticleState> {
            let mut rng = self.random.particle_stream(0, index);
            let angle: f64 = rng.random_range(0.0..TAU);
            let state = ParticleState {
                position: origin,
                direction: Vector2::new(angle.cos(), angle.sin()),
                heading: rng.random_range(0.0..360.0),
                speed: 0.0,
                context: Context::Sailing,
            };
            self.motion
                .step(&state, dt, &mut rng)
                .map_err(|source| FilterError::DegenerateDirection {
                    step: 0,
                    particle: index,
                    source,
                })
        };
        let n = self.config.num_particles;
        let particles = if self.config.parallel {
            (0..n)
                .into_par_iter()
                .map(seed_particle)
                .collect::<Result<Vec<_>>>()?
        } else {
            (0..n).map(seed_particle).collect::<Result<Vec<_>>>()?
        };

        self.history.clear();
        if self.config.record_history {
            let uniform = 1.0 / n as f64;
            self.history.push(snapshot(0, &particles, &vec![uniform; n]));
        }
        self.particles = particles;
        self.phase = FilterPhase::Step;
        self.step = 1;
        debug!(
            "Initialized {} particles at ({:.2}, {:.2})",
            n, origin.x, origin.y
        );
        Ok(())
    }

    /// Process one observation: propagate, weight, select the best particle, resample.
    ///
    /// Returns the highest-weight particle (the first one on ties) as the estimate for this
    /// observation. The population is only replaced when every stage succeeds.
    pub fn step(&mut self, observation: &Observation) -> Result<ParticleState> {
        match self.phase {
            FilterPhase::Init => {
                return Err(FilterError::Configuration(
                    "filter must be initialized before stepping".to_string(),
                ));
            }
            FilterPhase::Done => {
                return Err(FilterError::Configuration(
                    "filter run is already complete".to_string(),
                ));
            }
            FilterPhase::Step => {}
        }
        if !observation.is_valid() {
            return Err(FilterError::Configuration(format!(
                "observation {} has a non-finite position or an invalid time gap",
                self.step
            )));
        }
        let step = self.step;

        let propagated = self.propagate(step, observation.time_gap)?;
        let weights = if self.config.parallel {
            self.emission.par_weights(observation, &propagated)
        } else {
            self.emission.weights(observation, &propagated)
        };

        let mut best = 0;
        for (i, &w) in weights.iter().enumerate() {
            if w > weights[best] {
                best = i;
            }
        }
        let estimate = propagated[best];

        let mut rng = self.random.resample_stream(step);
        let resampled = self
            .config
            .resampling
            .resample(&propagated, &weights, &mut rng)
            .map_err(|source| FilterError::Resampling { step, source })?;

        let ess = effective_sample_size(&weights);
        debug!(
            "Step {}: best weight {:.4e}, effective sample size {:.1}, estimate {}",
            step, weights[best], ess, estimate.context
        );
        if is_low_effective_sample_size(ess, weights.len()) {
            warn!(
                "Step {}: effective sample size {:.1} of {} particles, the population is close to collapse",
                step,
                ess,
                weights.len()
            );
        }
        if self.config.record_history {
            self.history.push(snapshot(step, &propagated, &weights));
        }
        self.particles = resampled;
        self.step += 1;
        Ok(estimate)
    }

    /// Run the filter over a complete observation sequence.
    ///
    /// Returns one estimate per observation after the first, in order.
    pub fn run(&mut self, observations: &[Observation]) -> Result<Vec<ParticleState>> {
        info!(
            "Running context filter: {} observations, {} particles, seed {}",
            observations.len(),
            self.config.num_particles,
            self.random.seed()
        );
        self.initialize(observations)?;
        let mut estimates = Vec::with_capacity(observations.len() - 1);
        for observation in &observations[1..] {
            estimates.push(self.step(observation)?);
        }
        self.phase = FilterPhase::Done;
        let fishing = estimates
            .iter()
            .filter(|s| s.context == Context::Fishing)
            .count();
        info!(
            "Context filter finished: {} estimates, {} fishing",
            estimates.len(),
            fishing
        );
        Ok(estimates)
    }

    fn propagate(&self, step: usize, dt: f64) -> Result<Vec<ParticleState>> {
        let advance = |(index, particle): (usize, &ParticleState)| -> Result<ParticleState> {
            let mut rng = self.random.particle_stream(step, index);
            self.motion
                .step(particle, dt, &mut rng)
                .map_err(|source| FilterError::DegenerateDirection {
                    step,
                    particle: index,
                    source,
                })
        };
        if self.config.parallel {
            self.particles.par_iter().enumerate().map(advance).collect()
        } else {
            self.particles.iter().enumerate().map(advance).collect()
        }
    }
}

fn is_low_effective_sample_size(ess: f64, num_particles: usize) -> bool {
    ess < LOW_ESS_FRACTION * num_particles as f64
}

fn snapshot(step: usize, particles: &[ParticleState], weights: &[f64]) -> PopulationSnapshot {
    PopulationSnapshot {
        step,
        particles: particles
            .iter()
            .zip(weights.iter())
            .map(|(&state, &weight)| WeightedParticle { state, weight })
            .collect(),
    }
}

/// Build a filter from `config` and run it over `observations`.
pub fn run_filter(observations: &[Observation], config: FilterConfig) -> Result<Vec<ParticleState>> {
    ContextFilter::new(config)?.run(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn straight_track(n: usize, gap: f64) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation::new(Vector2::new(3.0 * gap * i as f64, 0.0), gap, Context::Sailing))
            .collect()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = FilterConfig {
            num_particles: 0,
            ..FilterConfig::default()
        };
        assert!(matches!(
            ContextFilter::new(config),
            Err(FilterError::Configuration(_))
        ));
    }
    #[test]
    fn test_initialize_requires_two_observations() {
        let mut filter = ContextFilter::new(FilterConfig::default()).unwrap();
        let one = straight_track(1, 1.0);
        assert!(matches!(
            filter.initialize(&one),
            Err(FilterError::Configuration(_))
        ));
        assert_eq!(filter.phase(), FilterPhase::Init);
        assert!(filter.particles().is_empty());
    }
    #[test]
    fn test_initialize_rejects_invalid_observation() {
        let mut filter = ContextFilter::new(FilterConfig::default()).unwrap();
        let mut track = straight_track(4, 1.0);
        track[2].time_gap = -1.0;
        let err = filter.initialize(&track).unwrap_err();
        assert!(err.to_string().contains("observation 2"));
    }
    #[test]
    fn test_initial_population() {
        let config = FilterConfig {
            num_particles: 64,
            ..FilterConfig::default()
        };
        let mut filter = ContextFilter::new(config).unwrap();
        let track = straight_track(3, 0.0);
        filter.initialize(&track).unwrap();
        assert_eq!(filter.phase(), FilterPhase::Step);
        assert_eq!(filter.particles().len(), 64);
        for particle in filter.particles() {
            // zero time gap: the initial advance does not move the particle
            assert_eq!(particle.position, track[0].position);
            assert_approx_eq!(particle.direction.norm(), 1.0, 1e-9);
            assert!((0.0..360.0).contains(&particle.heading));
        }
        // the initial advance already redrew speeds, so the population is not degenerate
        let first_speed = filter.particles()[0].speed;
        assert!(filter.particles().iter().any(|p| p.speed != first_speed));
    }
    #[test]
    fn test_step_before_initialize_fails() {
        let mut filter = ContextFilter::new(FilterConfig::default()).unwrap();
        let track = straight_track(2, 1.0);
        assert!(matches!(
            filter.step(&track[1]),
            Err(FilterError::Configuration(_))
        ));
    }
    #[test]
    fn test_population_size_is_constant() {
        let config = FilterConfig {
            num_particles: 37,
            ..FilterConfig::default()
        };
        let mut filter = ContextFilter::new(config).unwrap();
        let track = straight_track(20, 5.0);
        filter.initialize(&track).unwrap();
        for observation in &track[1..] {
            filter.step(observation).unwrap();
            assert_eq!(filter.particles().len(), 37);
            for particle in filter.particles() {
                assert_approx_eq!(particle.direction.norm(), 1.0, 1e-9);
            }
        }
    }
    #[test]
    fn test_run_output_length_and_phase() {
        let mut filter = ContextFilter::new(FilterConfig::default()).unwrap();
        let track = straight_track(12, 2.0);
        let estimates = filter.run(&track).unwrap();
        assert_eq!(estimates.len(), 11);
        assert_eq!(filter.phase(), FilterPhase::Done);
        assert!(filter.step(&track[1]).is_err());
    }
    #[test]
    fn test_estimate_is_highest_weight_particle() {
        let config = FilterConfig {
            num_particles: 50,
            record_history: true,
            ..FilterConfig::default()
        };
        let mut filter = ContextFilter::new(config).unwrap();
        let track = straight_track(6, 4.0);
        let estimates = filter.run(&track).unwrap();
        let history = filter.history();
        assert_eq!(history.len(), track.len());
        for (estimate, snapshot) in estimates.iter().zip(history[1..].iter()) {
            let best = snapshot
                .particles
                .iter()
                .map(|p| p.weight)
                .fold(f64::NEG_INFINITY, f64::max);
            let first_best = snapshot
                .particles
                .iter()
                .find(|p| p.weight == best)
                .unwrap();
            assert_eq!(first_best.state, *estimate);
        }
    }
    #[test]
    fn test_history_initial_snapshot_is_uniform() {
        let config = FilterConfig {
            num_particles: 8,
            record_history: true,
            ..FilterConfig::default()
        };
        let mut filter = ContextFilter::new(config).unwrap();
        filter.run(&straight_track(3, 1.0)).unwrap();
        let initial = &filter.history()[0];
        assert_eq!(initial.step, 0);
        assert_eq!(initial.particles.len(), 8);
        for particle in &initial.particles {
            assert_approx_eq!(particle.weight, 0.125, 1e-12);
        }
    }
    #[test]
    fn test_history_disabled_by_default() {
        let mut filter = ContextFilter::new(FilterConfig::default()).unwrap();
        filter.run(&straight_track(3, 1.0)).unwrap();
        assert!(filter.history().is_empty());
    }
    #[test]
    fn test_collapse_reports_step() {
        // A tiny sigma and a far jump make every likelihood underflow at the third observation
        let config = FilterConfig {
            num_particles: 20,
            sigma: 1.0,
            alpha: 1.0,
            ..FilterConfig::default()
        };
        let mut track: Vec<Observation> = (0..4)
            .map(|_| Observation::new(Vector2::new(0.0, 0.0), 0.0, Context::Sailing))
            .collect();
        track[2].position = Vector2::new(1e6, 1e6);
        let mut filter = ContextFilter::new(config).unwrap();
        let err = filter.run(&track).unwrap_err();
        assert!(err.is_importance_collapse());
        assert_eq!(err.step(), Some(2));
    }
    #[test]
    fn test_failed_step_keeps_population() {
        let config = FilterConfig {
            num_particles: 10,
            sigma: 1.0,
            alpha: 1.0,
            ..FilterConfig::default()
        };
        let track: Vec<Observation> = (0..3)
            .map(|_| Observation::new(Vector2::new(0.0, 0.0), 0.0, Context::Sailing))
            .collect();
        let mut filter = ContextFilter::new(config).unwrap();
        filter.initialize(&track).unwrap();
        let before = filter.particles().to_vec();
        let far = Observation::new(Vector2::new(1e6, 0.0), 0.0, Context::Sailing);
        assert!(filter.step(&far).is_err());
        assert_eq!(filter.particles(), before.as_slice());
        // the same step index can be retried with a usable observation
        assert!(filter.step(&track[1]).is_ok());
    }
    #[test]
    fn test_run_filter_helper() {
        let track = straight_track(5, 1.0);
        let config = FilterConfig {
            num_particles: 10,
            ..FilterConfig::default()
        };
        let a = run_filter(&track, config.clone()).unwrap();
        let b = run_filter(&track, config).unwrap();
        assert_eq!(a, b);
    }
    #[test]
    fn test_low_effective_sample_size_threshold() {
        // uniform weights keep every particle effective
        let uniform = effective_sample_size(&[1.0; 50]);
        assert!(!is_low_effective_sample_size(uniform, 50));
        // one dominant particle out of 50 is below a tenth of the population
        let mut weights = vec![1e-9; 50];
        weights[7] = 1.0;
        let skewed = effective_sample_size(&weights);
        assert!(is_low_effective_sample_size(skewed, 50));
        assert!(!is_low_effective_sample_size(5.0, 50));
        assert!(is_low_effective_sample_size(4.9, 50));
    }
}
