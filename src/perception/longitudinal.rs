use super::cache::Cache;
use super::iterable::PerceptionCollector;
use super::perceived::{PerceivedType, PerceivedVehicle};
use super::relative::RelativeLane;
use super::search::DistanceVehicle;
use super::Perception;
use crate::error::Result;
use crate::parameters::SENSOR_RANGE;
use crate::Vehicle;
use std::ops::ControlFlow;
use std::rc::Rc;

#[derive(Default)]
pub(crate) struct LongitudinalCache {
    acc_leader: Cache<(), Option<Rc<PerceivedVehicle>>>,
    cacc_leaders: Cache<usize, Rc<[Rc<PerceivedVehicle>]>>,
}

impl LongitudinalCache {
    pub fn clear(&self) {
        self.acc_leader.clear();
        self.cacc_leaders.clear();
    }
}

/// Perception for adaptive and cooperative adaptive cruise control.
#[derive(Clone, Copy)]
pub struct LongitudinalPerception<'s> {
    perception: Perception<'s>,
}

impl<'s> LongitudinalPerception<'s> {
    pub(crate) fn new(perception: Perception<'s>) -> Self {
        Self { perception }
    }

    /// The leader on the current lane as seen by an on-board sensor,
    /// if it is within the sensor range.
    pub fn acc_leader(&self) -> Result<Option<Rc<PerceivedVehicle>>> {
        let p = self.perception;
        p.state.longitudinal.acc_leader.get_or_update((), p.now, || {
            let range = p.ego.parameters().get(&SENSOR_RANGE)?;
            let leaders = p.neighbors().leaders(RelativeLane::CURRENT)?;
            Ok(leaders.first().filter(|leader| leader.distance() <= range))
        })
    }

    /// Up to `n` leaders on the current lane, with the exact state they
    /// communicate to the perceiving vehicle.
    pub fn cacc_leaders(&self, n: usize) -> Result<Rc<[Rc<PerceivedVehicle>]>> {
        let p = self.perception;
        p.state.longitudinal.cacc_leaders.get_or_update(n, p.now, || {
            if n == 0 {
                return Ok(Rc::from(Vec::new()));
            }
            let leaders = p.neighbors().leaders(RelativeLane::CURRENT)?;
            let found = leaders.collect(&Nearest(n));
            Ok(found
                .into_iter()
                .map(|dv| p.perceive_found(PerceivedType::Copy, None, dv, true))
                .collect())
        })
    }
}

/// Collects the `n` nearest vehicles.
struct Nearest(usize);

impl PerceptionCollector for Nearest {
    type Intermediate = Vec<DistanceVehicle>;
    type Output = Vec<DistanceVehicle>;

    fn init(&self) -> Self::Intermediate {
        Vec::with_capacity(self.0)
    }

    fn accumulate(
        &self,
        mut intermediate: Self::Intermediate,
        vehicle: &Vehicle,
        distance: f64,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate> {
        intermediate.push(DistanceVehicle {
            vehicle: vehicle.id(),
            distance,
        });
        if intermediate.len() >= self.0 {
            ControlFlow::Break(intermediate)
        } else {
            ControlFlow::Continue(intermediate)
        }
    }

    fn finalize(&self, intermediate: Self::Intermediate) -> Self::Output {
        intermediate
    }
}
