pub use error::{PerceptionError, Result};
pub use group::LinkGroup;
pub use link::{Link, LinkAttributes};
pub use parameters::{Constraint, ParameterError, ParameterType, Parameters};
pub use perception::{
    Anticipation, Estimation, Kinematics, LanePerception, LateralDirection, Neighbors,
    NeighborTriplet, Perception, PerceptionCollector, PerceptionConfig, PerceivedType,
    PerceivedVehicle, ReactionWindow, Reference, RelativeLane,
};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{RelativePosition, Vehicle, VehicleAttributes, VehicleType};

mod debug;
mod error;
mod group;
mod link;
pub mod parameters;
pub mod perception;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Link].
    pub struct LinkId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a record in a [perception::LaneStructure].
    pub struct RecordId;
}

type LinkSet = SlotMap<LinkId, Link>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
