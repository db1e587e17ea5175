//! CSV loading and result export for AIS track replay.
//!
//! This module provides:
//! - A struct (`AisRecord`) for reading pre-processed AIS track files
//! - Conversion of AIS records into filter [`Observation`]s
//! - `StateRecord` and `write_states` for exporting the inferred states
//! - `write_history` for dumping recorded particle populations
//! - `ContextAgreement`, a quick comparison of inferred contexts against the labelled ones

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{self, Display};
use std::path::Path;

use crate::filter::PopulationSnapshot;
use crate::{Context, Observation, ParticleState};

use nalgebra::Vector2;

/// Struct representing a single row of a pre-processed AIS track file.
///
/// Positions are already projected to planar `x`/`y` coordinates and the time gap to the previous report
/// is precomputed. Only `x`, `y`, `time_gap` and `label` are used by the filter.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AisRecord {
    /// Vessel or track identifier
    pub id: String,
    /// Report timestamp as written by the upstream tooling
    pub t: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Planar x coordinate
    pub x: f64,
    /// Planar y coordinate
    pub y: f64,
    pub signed_turn: f64,
    pub bearing: f64,
    /// Time since the previous report
    pub time_gap: f64,
    pub distance_gap: f64,
    pub euc_speed: f64,
    #[serde(rename = "distanceToShore")]
    pub distance_to_shore: f64,
    /// Ground-truth label, e.g. `01-sailing`, `02-fishing`
    pub label: String,
}

impl AisRecord {
    /// Reads a CSV file and returns a vector of `AisRecord` structs.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
}

impl From<&AisRecord> for Observation {
    fn from(record: &AisRecord) -> Self {
        Observation::new(
            Vector2::new(record.x, record.y),
            record.time_gap,
            Context::from_label(&record.label),
        )
    }
}

/// Load an AIS track file as an ordered observation sequence.
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>, Box<dyn Error>> {
    let records = AisRecord::from_csv(path)?;
    Ok(records.iter().map(Observation::from).collect())
}

/// One row of the result file.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct StateRecord {
    pub x: f64,
    pub y: f64,
    /// Time gap of the observation this state was inferred for
    pub time_gap: f64,
    pub heading: f64,
    pub speed: f64,
    pub context: Context,
}

impl StateRecord {
    pub fn new(state: &ParticleState, time_gap: f64) -> Self {
        StateRecord {
            x: state.position.x,
            y: state.position.y,
            time_gap,
            heading: state.heading,
            speed: state.speed,
            context: state.context,
        }
    }
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Write the inferred states of a run.
///
/// `states[i]` is the estimate for `observations[i + 1]`, which is how [`crate::filter::ContextFilter::run`]
/// returns them.
pub fn write_states<P: AsRef<Path>>(
    states: &[ParticleState],
    observations: &[Observation],
    path: P,
) -> Result<(), Box<dyn Error>> {
    if observations.len() != states.len() + 1 {
        return Err(format!(
            "expected {} observations for {} states, got {}",
            states.len() + 1,
            states.len(),
            observations.len()
        )
        .into());
    }
    let mut writer = csv::Writer::from_path(path)?;
    for (state, observation) in states.iter().zip(observations[1..].iter()) {
        writer.serialize(StateRecord::new(state, observation.time_gap))?;
    }
    writer.flush()?;
    Ok(())
}

/// One row of the particle history file.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct HistoryRecord {
    pub step: usize,
    pub x: f64,
    pub y: f64,
    pub dir_x: f64,
    pub dir_y: f64,
    pub heading: f64,
    pub speed: f64,
    pub weight: f64,
    pub context: Context,
}

/// Dump recorded population snapshots, one row per particle per step.
pub fn write_history<P: AsRef<Path>>(
    history: &[PopulationSnapshot],
    path: P,
) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for snapshot in history {
        for particle in &snapshot.particles {
            let state = &particle.state;
            writer.serialize(HistoryRecord {
                step: snapshot.step,
                x: state.position.x,
                y: state.position.y,
                dir_x: state.direction.x,
                dir_y: state.direction.y,
                heading: state.heading,
                speed: state.speed,
                weight: particle.weight,
                context: state.context,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Agreement between inferred contexts and the labelled ground truth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextAgreement {
    pub correct: usize,
    pub incorrect: usize,
}

impl ContextAgreement {
    /// Compare `states[i]` against the label of `observations[i + 1]`.
    pub fn evaluate(states: &[ParticleState], observations: &[Observation]) -> Self {
        let mut agreement = ContextAgreement::default();
        for (state, observation) in states.iter().zip(observations.iter().skip(1)) {
            if state.context == observation.truth {
                agreement.correct += 1;
            } else {
                agreement.incorrect += 1;
            }
        }
        agreement
    }
    /// Fraction of matching contexts, or `None` when nothing was compared.
    pub fn rate(&self) -> Option<f64> {
        let total = self.correct + self.incorrect;
        if total == 0 {
            None
        } else {
            Some(self.correct as f64 / total as f64)
        }
    }
}

impl Display for ContextAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rate() {
            Some(rate) => write!(
                f,
                "correct: {}, incorrect: {}, agreement: {:.3}",
                self.correct, self.incorrect, rate
            ),
            None => write!(f, "no states to compare"),
        }
    }
}
