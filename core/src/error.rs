//! Error types surfaced by the filter.
//!
//! None of these are recovered internally. A failure aborts the run and is returned to the caller with
//! enough context (step index, particle index) to diagnose it. Re-running with a different seed or
//! configuration is the caller's decision.

use thiserror::Error;

use crate::motion::DegenerateDirection;
use crate::resample::ResampleError;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Invalid configuration or unusable input, detected before any sampling
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A direction vector collapsed during a motion update
    #[error("motion update failed at step {step} for particle {particle}: {source}")]
    DegenerateDirection {
        step: usize,
        particle: usize,
        #[source]
        source: DegenerateDirection,
    },

    /// Resampling could not build a valid distribution from the weights
    #[error("resampling failed at step {step}: {source}")]
    Resampling {
        step: usize,
        #[source]
        source: ResampleError,
    },
}

impl FilterError {
    /// True when every emission likelihood underflowed at some step.
    pub fn is_importance_collapse(&self) -> bool {
        matches!(
            self,
            FilterError::Resampling {
                source: ResampleError::ImportanceCollapse { .. },
                ..
            }
        )
    }
    /// Step index at which the run failed, if the failure happened after initialization began.
    pub fn step(&self) -> Option<usize> {
        match self {
            FilterError::Configuration(_) => None,
            FilterError::DegenerateDirection { step, .. } => Some(*step),
            FilterError::Resampling { step, .. } => Some(*step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_step() {
        let err = FilterError::Resampling {
            step: 7,
            source: ResampleError::ImportanceCollapse { total: 0.0 },
        };
        assert!(err.is_importance_collapse());
        assert_eq!(err.step(), Some(7));
        assert!(err.to_string().contains("step 7"));

        let err = FilterError::DegenerateDirection {
            step: 3,
            particle: 11,
            source: DegenerateDirection { norm: 0.0 },
        };
        assert!(!err.is_importance_collapse());
        assert!(err.to_string().contains("particle 11"));

        let err = FilterError::Configuration("need at least 2 observations".to_string());
        assert_eq!(err.step(), None);
    }
}
