use super::anticipation::Anticipation;
use super::estimation::{Estimation, EstimationInput, ErrorTracker, NeighborTriplet};
use super::reaction::ReactionWindow;
use crate::util::Interval;
use crate::{Vehicle, VehicleId, VehicleType};
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a perceived neighbour's headway is measured from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reference {
    /// The perceiving vehicle, which moves.
    Ego,
    /// A static object of the given length, such as a conflict point or stop line.
    Static { length: f64 },
}

/// How neighbours are turned into [PerceivedVehicle]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PerceivedType {
    /// The exact current state, as if communicated by the neighbour.
    Copy,
    /// The state at the delayed instant, estimated and then anticipated
    /// forward to the current time.
    Delayed {
        estimation: Estimation,
        anticipation: Anticipation,
    },
}

impl Default for PerceivedType {
    fn default() -> Self {
        Self::Delayed {
            estimation: Estimation::None,
            anticipation: Anticipation::ConstantSpeed,
        }
    }
}

/// The longitudinal relation of a perceived vehicle to the perceiving vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kinematics {
    /// The neighbour is entirely downstream.
    Ahead { headway: f64, speed: f64, acc: f64 },
    /// The neighbour is entirely upstream.
    Behind { headway: f64, speed: f64, acc: f64 },
    /// The neighbour overlaps the perceiving vehicle longitudinally.
    Parallel {
        /// How far the neighbour's front is ahead of the perceiving vehicle's front.
        overlap_front: f64,
        /// The length of the longitudinal overlap.
        overlap: f64,
        /// How far the neighbour's rear is behind the perceiving vehicle's rear.
        overlap_rear: f64,
        speed: f64,
        acc: f64,
    },
}

/// An immutable view of a neighbour, as perceived at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct PerceivedVehicle {
    id: VehicleId,
    vehicle_type: VehicleType,
    length: f64,
    width: f64,
    distance: f64,
    kinematics: Kinematics,
    time: f64,
}

impl PerceivedVehicle {
    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// The perceived headway in m; negative when parallel.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    /// The perceived speed in m/s.
    pub fn speed(&self) -> f64 {
        match self.kinematics {
            Kinematics::Ahead { speed, .. }
            | Kinematics::Behind { speed, .. }
            | Kinematics::Parallel { speed, .. } => speed,
        }
    }

    /// The perceived acceleration in m/s^2.
    pub fn acc(&self) -> f64 {
        match self.kinematics {
            Kinematics::Ahead { acc, .. }
            | Kinematics::Behind { acc, .. }
            | Kinematics::Parallel { acc, .. } => acc,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kinematics, Kinematics::Parallel { .. })
    }

    /// The simulation time of the perception in s.
    pub fn time(&self) -> f64 {
        self.time
    }
}

/// Everything needed to perceive one neighbour.
pub(crate) struct PerceiveInput<'a> {
    pub ego: &'a Vehicle,
    pub reference: Reference,
    pub neighbor: &'a Vehicle,
    /// The current headway in m.
    pub distance: f64,
    pub downstream: bool,
    pub now: f64,
    pub window: Option<ReactionWindow>,
}

/// Whether a perception ran an estimation.
pub(crate) enum Perceived {
    Estimated(PerceivedVehicle),
    Exact(PerceivedVehicle),
}

impl PerceivedType {
    /// Whether perceiving requires a [ReactionWindow].
    pub fn is_delayed(&self) -> bool {
        matches!(self, Self::Delayed { .. })
    }

    /// Creates the perceived view of a neighbour.
    ///
    /// # Panics
    /// If the type is delayed and no reaction window is given.
    pub(crate) fn perceive(&self, input: &PerceiveInput, errors: &mut ErrorTracker) -> Perceived {
        let reference_length = match input.reference {
            Reference::Ego => input.ego.length(),
            Reference::Static { length } => length,
        };
        let exact = |distance| NeighborTriplet {
            headway: distance,
            speed: input.neighbor.vel(),
            acc: input.neighbor.acc(),
        };

        let (estimation, anticipation) = match self {
            Self::Copy => {
                let triplet = exact(input.distance);
                return Perceived::Exact(build(input, reference_length, triplet));
            }
            Self::Delayed { estimation, anticipation } => (estimation, anticipation),
        };
        // Parallel neighbours are seen directly
        if input.distance < 0.0 {
            let triplet = exact(input.distance);
            return Perceived::Exact(build(input, reference_length, triplet));
        }
        let Some(window) = input.window else {
            unreachable!("reaction window is resolved before perceiving {:?}", estimation);
        };

        let estimation_input = EstimationInput {
            ego: input.ego,
            reference: input.reference,
            neighbor: input.neighbor,
            distance: input.distance,
            downstream: input.downstream,
            when: window.when(),
            now: input.now,
        };
        let triplet = Estimation::estimate(&estimation_input, &window.estimation, errors);
        let traveled = match input.reference {
            Reference::Ego => window.traveled(),
            Reference::Static { .. } => 0.0,
        };
        let mut triplet =
            anticipation.anticipate(triplet, window.reaction_time(), traveled, input.downstream);

        let min_headway = -(input.neighbor.length() + reference_length);
        if triplet.headway < min_headway {
            debug!(
                "Clamping perceived headway {:.2} of {:?} to {:.2}",
                triplet.headway,
                input.neighbor.id(),
                min_headway
            );
            triplet.headway = min_headway;
        }
        Perceived::Estimated(build(input, reference_length, triplet))
    }
}

impl Perceived {
    pub fn into_inner(self) -> PerceivedVehicle {
        match self {
            Self::Estimated(vehicle) | Self::Exact(vehicle) => vehicle,
        }
    }
}

fn build(input: &PerceiveInput, reference_length: f64, triplet: NeighborTriplet) -> PerceivedVehicle {
    let neighbor = input.neighbor;
    PerceivedVehicle {
        id: neighbor.id(),
        vehicle_type: neighbor.vehicle_type(),
        length: neighbor.length(),
        width: neighbor.width(),
        distance: triplet.headway,
        kinematics: kinematics(triplet, input.downstream, reference_length, neighbor.length()),
        time: input.now,
    }
}

/// Classifies a headway, computing the overlap of parallel vehicles.
fn kinematics(triplet: NeighborTriplet, downstream: bool, ego_len: f64, other_len: f64) -> Kinematics {
    let NeighborTriplet { headway, speed, acc } = triplet;
    if headway >= 0.0 {
        return match downstream {
            true => Kinematics::Ahead { headway, speed, acc },
            false => Kinematics::Behind { headway, speed, acc },
        };
    }
    // Measured from the ego rear
    let ego = Interval::new(0.0, ego_len);
    let other = match downstream {
        true => Interval::new(ego_len + headway, ego_len + headway + other_len),
        false => Interval::new(-headway - other_len, -headway),
    };
    Kinematics::Parallel {
        overlap_front: other.max - ego.max,
        overlap: ego.intersection_length(&other),
        overlap_rear: ego.min - other.min,
        speed,
        acc,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn parallel_extent(kinematics: Kinematics) -> (f64, f64, f64) {
        match kinematics {
            Kinematics::Parallel {
                overlap_front,
                overlap,
                overlap_rear,
                ..
            } => (overlap_front, overlap, overlap_rear),
            other => panic!("expected parallel, got {:?}", other),
        }
    }

    #[test]
    fn classifies_headway() {
        let triplet = NeighborTriplet {
            headway: 5.0,
            speed: 10.0,
            acc: 1.0,
        };
        assert!(matches!(
            kinematics(triplet, true, 4.0, 4.0),
            Kinematics::Ahead { headway, .. } if headway == 5.0
        ));
        assert!(matches!(
            kinematics(triplet, false, 4.0, 4.0),
            Kinematics::Behind { .. }
        ));
    }

    #[test]
    fn parallel_overlap() {
        // A 4 m leader whose rear is 1 m behind the front of a 5 m ego
        let triplet = NeighborTriplet {
            headway: -1.0,
            speed: 10.0,
            acc: 0.0,
        };
        let (front, overlap, rear) = parallel_extent(kinematics(triplet, true, 5.0, 4.0));
        assert_approx_eq!(front, 3.0);
        assert_approx_eq!(overlap, 1.0);
        assert_approx_eq!(rear, -4.0);

        // A 4 m follower whose front is 2 m ahead of the rear of a 5 m ego
        let triplet = NeighborTriplet {
            headway: -2.0,
            ..triplet
        };
        let (front, overlap, rear) = parallel_extent(kinematics(triplet, false, 5.0, 4.0));
        assert_approx_eq!(front, -3.0);
        assert_approx_eq!(overlap, 2.0);
        assert_approx_eq!(rear, 2.0);
    }
}
