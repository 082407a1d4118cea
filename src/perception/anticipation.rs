use super::estimation::NeighborTriplet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a driver projects a delayed perception forward to the current time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Anticipation {
    /// The delayed state is used as is.
    None,
    /// Neighbours are assumed to keep their speed.
    #[default]
    ConstantSpeed,
    /// Neighbours are assumed to keep their acceleration, until they stop.
    ConstantAcceleration,
}

impl Anticipation {
    /// Projects a neighbour's state `duration` seconds forward.
    ///
    /// # Parameters
    /// * `traveled` - How far the perceiving vehicle moved over `duration`, in m
    /// * `downstream` - Whether the neighbour is ahead of the perceiving vehicle
    pub fn anticipate(
        &self,
        triplet: NeighborTriplet,
        duration: f64,
        traveled: f64,
        downstream: bool,
    ) -> NeighborTriplet {
        let NeighborTriplet { headway, speed, acc } = triplet;
        let (dx, speed, acc) = match self {
            Self::None => return triplet,
            Self::ConstantSpeed => (speed * duration, speed, acc),
            Self::ConstantAcceleration => {
                let (dx, speed) = project(speed, acc, duration);
                let acc = if speed == 0.0 && acc < 0.0 { 0.0 } else { acc };
                (dx, speed, acc)
            }
        };
        let sign = if downstream { 1.0 } else { -1.0 };
        NeighborTriplet {
            headway: headway + sign * (dx - traveled),
            speed,
            acc,
        }
    }

    /// How far the perceiving vehicle is expected to move in `duration` seconds.
    pub fn ego_anticipation(&self, speed: f64, acc: f64, duration: f64) -> f64 {
        match self {
            Self::None => 0.0,
            Self::ConstantSpeed => speed * duration,
            Self::ConstantAcceleration => project(speed, acc, duration).0,
        }
    }
}

/// Displacement and final speed at constant acceleration, clamped at standstill.
fn project(speed: f64, acc: f64, duration: f64) -> (f64, f64) {
    if acc < 0.0 && speed < -acc * duration {
        let t = speed / -acc;
        (speed * t + 0.5 * acc * t * t, 0.0)
    } else {
        (speed * duration + 0.5 * acc * duration * duration, speed + acc * duration)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const TRIPLET: NeighborTriplet = NeighborTriplet {
        headway: 50.0,
        speed: 10.0,
        acc: 0.0,
    };

    #[test]
    fn constant_speed() {
        let fast = NeighborTriplet {
            speed: 20.0,
            ..TRIPLET
        };
        let result = Anticipation::ConstantSpeed.anticipate(fast, 1.0, 2.0, true);
        assert_approx_eq!(result.headway, 68.0);
        assert_approx_eq!(result.speed, 20.0);

        let result = Anticipation::ConstantSpeed.anticipate(fast, 1.0, 2.0, false);
        assert_approx_eq!(result.headway, 32.0);
    }

    #[test]
    fn none_is_identity() {
        let result = Anticipation::None.anticipate(TRIPLET, 2.0, 2.0, true);
        assert_eq!(result, TRIPLET);
        assert_eq!(Anticipation::None.ego_anticipation(10.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn constant_acceleration_stops() {
        let braking = NeighborTriplet {
            acc: -2.0,
            ..TRIPLET
        };
        let result = Anticipation::ConstantAcceleration.anticipate(braking, 10.0, 0.0, true);
        assert_approx_eq!(result.headway, 75.0);
        assert_approx_eq!(result.speed, 0.0);
        assert_approx_eq!(result.acc, 0.0);

        let accelerating = NeighborTriplet {
            acc: 1.0,
            ..TRIPLET
        };
        let result = Anticipation::ConstantAcceleration.anticipate(accelerating, 2.0, 5.0, true);
        assert_approx_eq!(result.headway, 67.0);
        assert_approx_eq!(result.speed, 12.0);
        assert_approx_eq!(result.acc, 1.0);
    }

    #[test]
    fn ego_projection() {
        assert_approx_eq!(Anticipation::ConstantSpeed.ego_anticipation(10.0, -2.0, 2.0), 20.0);
        assert_approx_eq!(
            Anticipation::ConstantAcceleration.ego_anticipation(10.0, -2.0, 10.0),
            25.0
        );
    }
}
