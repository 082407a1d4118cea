use super::estimation::{Estimation, EstimationParams};
use crate::error::Result;
use crate::parameters::TR;
use crate::Vehicle;

/// The delayed instant a driver's perception refers to.
///
/// Updated at most once per time step. The delayed instant never moves
/// backwards, even when the reaction time grows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReactionWindow {
    updated: f64,
    reaction_time: f64,
    when: f64,
    traveled: f64,
    pub(crate) estimation: EstimationParams,
}

impl ReactionWindow {
    /// Computes the window at time `now`, given the previous window if any.
    pub(crate) fn update(
        previous: Option<ReactionWindow>,
        ego: &Vehicle,
        estimation: &Estimation,
        now: f64,
    ) -> Result<Self> {
        if let Some(previous) = previous.filter(|w| w.updated == now) {
            return Ok(previous);
        }
        let params = ego.parameters();
        let tr = params.get(&TR)?;
        let estimation = estimation.params(params)?;
        let when = match previous {
            Some(previous) => f64::max(previous.when, now - tr),
            None => now - tr,
        };
        Ok(Self {
            updated: now,
            reaction_time: now - when,
            when,
            traveled: ego.odometer() - ego.odometer_at(when),
            estimation,
        })
    }

    /// The simulation time the window was computed at, in s.
    pub fn updated(&self) -> f64 {
        self.updated
    }

    /// The effective reaction time in s; at most the TR parameter.
    pub fn reaction_time(&self) -> f64 {
        self.reaction_time
    }

    /// The delayed instant in s.
    pub fn when(&self) -> f64 {
        self.when
    }

    /// How far the perceiving vehicle moved since the delayed instant, in m.
    pub fn traveled(&self) -> f64 {
        self.traveled
    }
}
