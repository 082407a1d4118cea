//! Typed behavioural parameters of a vehicle.

use once_cell::sync::Lazy;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A constraint on the value of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constraint {
    None,
    /// The value must be strictly greater than zero.
    Positive,
    /// The value must be zero or greater.
    PositiveZero,
}

/// Describes a parameter that can be stored in a [Parameters] set.
#[derive(Clone, Copy, Debug)]
pub struct ParameterType {
    /// Short identifier, also used as the storage key.
    pub id: &'static str,
    pub description: &'static str,
    /// The value assigned by [Parameters::with_defaults].
    pub default: Option<f64>,
    pub constraint: Constraint,
}

/// An error raised when reading or writing a parameter.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter `{0}` is not set")]
    Missing(&'static str),
    #[error("value {value} of parameter `{id}` violates constraint {constraint:?}")]
    OutOfConstraint {
        id: &'static str,
        value: f64,
        constraint: Constraint,
    },
}

/// Reaction time in s.
pub const TR: ParameterType = ParameterType {
    id: "tr",
    description: "reaction time",
    default: Some(0.5),
    constraint: Constraint::PositiveZero,
};

/// Look-ahead distance in m.
pub const LOOKAHEAD: ParameterType = ParameterType {
    id: "x0",
    description: "look-ahead distance",
    default: Some(295.0),
    constraint: Constraint::Positive,
};

/// Look-back distance in m.
pub const LOOKBACK: ParameterType = ParameterType {
    id: "lookback",
    description: "look-back distance",
    default: Some(200.0),
    constraint: Constraint::Positive,
};

/// Estimation factor; values above 1 overestimate headway and speed difference.
pub const EST_FACTOR: ParameterType = ParameterType {
    id: "f_est",
    description: "estimation factor",
    default: Some(1.0),
    constraint: Constraint::Positive,
};

/// Correlation time of the perception error in s.
pub const TAUE: ParameterType = ParameterType {
    id: "tau_e",
    description: "error correlation time",
    default: Some(20.0),
    constraint: Constraint::Positive,
};

/// Distance error factor.
pub const SERROR: ParameterType = ParameterType {
    id: "s_error",
    description: "distance error factor",
    default: Some(0.1),
    constraint: Constraint::PositiveZero,
};

/// Speed error factor.
pub const VERROR: ParameterType = ParameterType {
    id: "v_error",
    description: "speed error factor",
    default: Some(0.1),
    constraint: Constraint::PositiveZero,
};

/// Acceleration error factor.
pub const AERROR: ParameterType = ParameterType {
    id: "a_error",
    description: "acceleration error factor",
    default: Some(0.2),
    constraint: Constraint::PositiveZero,
};

/// Perception update interval in s. Errors older than this are redrawn independently.
pub const DT: ParameterType = ParameterType {
    id: "dt",
    description: "perception update interval",
    default: Some(0.5),
    constraint: Constraint::Positive,
};

/// Range of an ACC sensor in m.
pub const SENSOR_RANGE: ParameterType = ParameterType {
    id: "sensor_range",
    description: "longitudinal control sensor range",
    default: Some(150.0),
    constraint: Constraint::Positive,
};

const ALL: [ParameterType; 10] = [
    TR,
    LOOKAHEAD,
    LOOKBACK,
    EST_FACTOR,
    TAUE,
    SERROR,
    VERROR,
    AERROR,
    DT,
    SENSOR_RANGE,
];

static DEFAULTS: Lazy<Parameters> = Lazy::new(|| {
    let values = ALL
        .iter()
        .filter_map(|ty| ty.default.map(|value| (ty.id.to_string(), value)))
        .collect();
    Parameters { values }
});

/// A set of parameter values.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Parameters {
    values: HashMap<String, f64>,
}

impl Parameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a parameter set with every known parameter at its default value.
    pub fn with_defaults() -> Self {
        DEFAULTS.clone()
    }

    /// Sets a parameter, checking its constraint.
    pub fn set(&mut self, ty: &ParameterType, value: f64) -> Result<(), ParameterError> {
        ty.check(value)?;
        self.values.insert(ty.id.to_string(), value);
        Ok(())
    }

    /// Removes a parameter from the set.
    pub fn reset(&mut self, ty: &ParameterType) {
        self.values.remove(ty.id);
    }

    /// Gets the value of a parameter.
    pub fn get(&self, ty: &ParameterType) -> Result<f64, ParameterError> {
        let value = *self
            .values
            .get(ty.id)
            .ok_or(ParameterError::Missing(ty.id))?;
        ty.check(value)?;
        Ok(value)
    }

    /// Whether the parameter has a value.
    pub fn contains(&self, ty: &ParameterType) -> bool {
        self.values.contains_key(ty.id)
    }
}

impl ParameterType {
    fn check(&self, value: f64) -> Result<(), ParameterError> {
        let ok = match self.constraint {
            Constraint::None => !value.is_nan(),
            Constraint::Positive => value > 0.0,
            Constraint::PositiveZero => value >= 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(ParameterError::OutOfConstraint {
                id: self.id,
                value,
                constraint: self.constraint,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_parameter() {
        let params = Parameters::new();
        assert_eq!(params.get(&TR), Err(ParameterError::Missing("tr")));
    }

    #[test]
    fn constraint_is_checked() {
        let mut params = Parameters::with_defaults();
        assert!(params.set(&LOOKAHEAD, 0.0).is_err());
        assert!(params.set(&TR, 0.0).is_ok());
        assert_eq!(params.get(&TR), Ok(0.0));
        assert_eq!(params.get(&SERROR), Ok(0.1));
    }
}
