use super::cache::Cache;
use super::relative::RelativeLane;
use super::{Perception, MAX_LATERAL_LANES};
use crate::error::{PerceptionError, Result};
use crate::vehicle::RelativePosition;
use arrayvec::ArrayVec;
use std::collections::{HashSet, VecDeque};

/// The most lanes a cross section can contain.
pub const MAX_CROSS_SECTION: usize = 2 * MAX_LATERAL_LANES as usize + 1;

#[derive(Default)]
pub(crate) struct InfrastructureCache {
    cross_section: Cache<(), ArrayVec<RelativeLane, MAX_CROSS_SECTION>>,
    lane_end: Cache<RelativeLane, Option<f64>>,
}

impl InfrastructureCache {
    pub fn clear(&self) {
        self.cross_section.clear();
        self.lane_end.clear();
    }
}

/// Perception of the lanes around the perceiving vehicle.
#[derive(Clone, Copy)]
pub struct InfrastructurePerception<'s> {
    perception: Perception<'s>,
}

impl<'s> InfrastructurePerception<'s> {
    pub(crate) fn new(perception: Perception<'s>) -> Self {
        Self { perception }
    }

    /// The perceived lanes, left to right.
    pub fn cross_section(&self) -> Result<ArrayVec<RelativeLane, MAX_CROSS_SECTION>> {
        let p = self.perception;
        p.state.infrastructure.cross_section.get_or_update((), p.now, || {
            Ok(p.structure()?.cross_section().take(MAX_CROSS_SECTION).collect())
        })
    }

    /// The speed limit of a lane at the vehicle's position, in m/s.
    pub fn speed_limit(&self, lane: RelativeLane) -> Result<f64> {
        let p = self.perception;
        let structure = p.structure()?;
        let root = structure
            .root(lane)
            .ok_or(PerceptionError::LaneNotPerceived(lane))?;
        Ok(p.links[structure.record(root).link()].speed_limit())
    }

    /// The distance from the vehicle's front to where a lane ends, in m.
    ///
    /// A lane that splits ends where its last branch ends. Returns `None` if
    /// any branch continues beyond the look-ahead distance.
    pub fn lane_end(&self, lane: RelativeLane) -> Result<Option<f64>> {
        let p = self.perception;
        let structure = p.structure()?;
        let root = structure
            .root(lane)
            .ok_or(PerceptionError::LaneNotPerceived(lane))?;
        p.state.infrastructure.lane_end.get_or_update(lane, p.now, || {
            let mut end: Option<f64> = None;
            let mut visited = HashSet::new();
            let mut queue = VecDeque::from([root]);
            while let Some(id) = queue.pop_front() {
                if !visited.insert(id) {
                    continue;
                }
                let record = structure.record(id);
                if !record.next().is_empty() {
                    queue.extend(record.next());
                } else if p.links[record.link()].links_out().is_empty() {
                    let distance = record.end_distance() - p.ego.dx(RelativePosition::Front);
                    end = Some(end.map_or(distance, |end| end.max(distance)));
                } else {
                    return Ok(None);
                }
            }
            Ok(end)
        })
    }
}
