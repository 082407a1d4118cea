use super::perceived::Reference;
use crate::parameters::{Parameters, AERROR, DT, EST_FACTOR, SERROR, TAUE, VERROR};
use crate::{ParameterError, Vehicle, VehicleId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Headway, speed and acceleration of a perceived vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborTriplet {
    /// Headway in m.
    pub headway: f64,
    /// Speed in m/s.
    pub speed: f64,
    /// Acceleration in m/s^2.
    pub acc: f64,
}

/// How a driver estimates the state of a neighbour at the delayed instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Estimation {
    /// The delayed state, without error.
    #[default]
    None,
    /// Headway and speed difference are scaled by [EST_FACTOR].
    Factor,
    /// Headway, speed and acceleration carry a correlated random error that
    /// evolves per neighbour as an Ornstein-Uhlenbeck process.
    Erroneous,
}

/// Parameters of an [Estimation], read once per reaction window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum EstimationParams {
    None,
    Factor(f64),
    Erroneous(ErrorParams),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ErrorParams {
    tau: f64,
    dt: f64,
    distance: f64,
    speed: f64,
    acc: f64,
}

/// What an estimation needs to know about a perception.
pub(crate) struct EstimationInput<'a> {
    pub ego: &'a Vehicle,
    pub reference: Reference,
    pub neighbor: &'a Vehicle,
    /// The current headway in m.
    pub distance: f64,
    pub downstream: bool,
    /// The delayed instant in s.
    pub when: f64,
    pub now: f64,
}

impl Estimation {
    /// Reads the parameters of the estimation.
    pub(crate) fn params(&self, params: &Parameters) -> Result<EstimationParams, ParameterError> {
        Ok(match self {
            Self::None => EstimationParams::None,
            Self::Factor => EstimationParams::Factor(params.get(&EST_FACTOR)?),
            Self::Erroneous => EstimationParams::Erroneous(ErrorParams {
                tau: params.get(&TAUE)?,
                dt: params.get(&DT)?,
                distance: params.get(&SERROR)?,
                speed: params.get(&VERROR)?,
                acc: params.get(&AERROR)?,
            }),
        })
    }

    /// Estimates the headway, speed and acceleration of a neighbour as they were
    /// at the delayed instant.
    pub(crate) fn estimate(
        input: &EstimationInput,
        params: &EstimationParams,
        errors: &mut ErrorTracker,
    ) -> NeighborTriplet {
        match params {
            EstimationParams::None => delayed(input, 1.0),
            EstimationParams::Factor(factor) => delayed(input, *factor),
            EstimationParams::Erroneous(error) => {
                let triplet = delayed(input, 1.0);
                let e = errors.error(input.neighbor.id(), input.now, error);
                let d = triplet.headway;
                let sign = if d >= 0.0 { e } else { -e };
                NeighborTriplet {
                    headway: d * (1.0 + sign * error.distance),
                    speed: f64::max(triplet.speed + e * error.speed * d, 0.0),
                    acc: triplet.acc * (1.0 + e * error.acc),
                }
            }
        }
    }
}

/// The delayed state with headway and speed difference scaled by `factor`.
fn delayed(input: &EstimationInput, factor: f64) -> NeighborTriplet {
    let ego_speed = match input.reference {
        Reference::Ego => input.ego.vel_at(input.when),
        Reference::Static { .. } => 0.0,
    };
    let speed_diff = input.neighbor.vel_at(input.when) - ego_speed;
    NeighborTriplet {
        headway: factor * delayed_headway(input),
        speed: ego_speed + factor * speed_diff,
        acc: input.neighbor.acc_at(input.when),
    }
}

/// The current headway corrected by how far both vehicles moved since the delayed instant.
fn delayed_headway(input: &EstimationInput) -> f64 {
    let mut delta = input.neighbor.odometer() - input.neighbor.odometer_at(input.when);
    if input.reference == Reference::Ego {
        delta -= input.ego.odometer() - input.ego.odometer_at(input.when);
    }
    if input.downstream {
        input.distance - delta
    } else {
        input.distance + delta
    }
}

#[derive(Clone, Copy, Debug)]
struct ErrorValue {
    time: f64,
    error: f64,
}

/// The perception errors of one driver towards each neighbour.
#[derive(Clone, Debug)]
pub(crate) struct ErrorTracker {
    errors: HashMap<VehicleId, ErrorValue>,
    rng: StdRng,
    normal: Normal<f64>,
}

impl ErrorTracker {
    pub fn new(seed: u64) -> Self {
        Self {
            errors: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            normal: Normal::new(0.0, 1.0).expect("Invalid standard deviation"),
        }
    }

    /// The standardised error towards a neighbour at time `now`.
    pub fn error(&mut self, neighbor: VehicleId, now: f64, params: &ErrorParams) -> f64 {
        let error = match self.errors.get(&neighbor).copied() {
            Some(value) if value.time == now => return value.error,
            Some(value) if now - value.time <= params.dt + 1e-6 => {
                let dt = now - value.time;
                let decay = f64::exp(-dt / params.tau);
                decay * value.error + f64::sqrt(2.0 * dt / params.tau) * self.draw()
            }
            _ => self.draw(),
        };
        // Errors older than the update interval would be redrawn anyway
        self.errors.retain(|_, value| now - value.time <= params.dt + 1e-6);
        self.errors.insert(neighbor, ErrorValue { time: now, error });
        error
    }

    fn draw(&mut self) -> f64 {
        self.normal.sample(&mut self.rng)
    }
}
