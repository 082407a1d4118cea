use crate::parameters::ParameterError;
use crate::perception::RelativeLane;
use crate::VehicleId;
use thiserror::Error;

/// An error raised by a perception query.
///
/// Errors are local to the query that raised them; the caches of other
/// queries and of other vehicles are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerceptionError {
    /// A parameter the perception depends on is missing or invalid.
    #[error("configuration error: {0}")]
    Parameter(#[from] ParameterError),
    /// A lateral direction of `None` was given where left or right is required.
    #[error("lateral direction must be left or right")]
    NoneDirection,
    /// The lane is not part of the perceived cross section.
    #[error("lane {0:?} is not in the perceived cross section")]
    LaneNotPerceived(RelativeLane),
    /// The vehicle does not exist or has no perception.
    #[error("vehicle {0:?} is not in the simulation")]
    UnknownVehicle(VehicleId),
    /// An internal invariant of the lane structure was violated.
    #[error("topology error: {0}")]
    Topology(String),
}

pub type Result<T> = std::result::Result<T, PerceptionError>;
