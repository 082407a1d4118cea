use super::cache::Cache;
use super::iterable::{LazyNeighbors, Neighbors};
use super::perceived::PerceivedVehicle;
use super::relative::{LateralDirection, RelativeLane};
use super::search::{first_downstream, first_upstream, NeighborSearch, SearchOffsets};
use super::structure::LaneStructure;
use super::{Perception, PerceptionStats};
use crate::error::{PerceptionError, Result};
use crate::parameters::{LOOKAHEAD, LOOKBACK};
use crate::vehicle::RelativePosition;
use crate::RecordId;
use log::trace;
use std::rc::Rc;

#[derive(Default)]
pub(crate) struct NeighborsCache {
    leaders: Cache<RelativeLane, Rc<LazyNeighbors>>,
    followers: Cache<RelativeLane, Rc<LazyNeighbors>>,
    first_leaders: Cache<LateralDirection, Rc<[Rc<PerceivedVehicle>]>>,
    first_followers: Cache<LateralDirection, Rc<[Rc<PerceivedVehicle>]>>,
    alongside: Cache<LateralDirection, bool>,
}

impl NeighborsCache {
    pub fn clear(&self) {
        self.leaders.clear();
        self.followers.clear();
        self.first_leaders.clear();
        self.first_followers.clear();
        self.alongside.clear();
    }
}

/// Perception of the vehicles around the perceiving vehicle.
#[derive(Clone, Copy)]
pub struct NeighborsPerception<'s> {
    perception: Perception<'s>,
}

impl<'s> NeighborsPerception<'s> {
    pub(crate) fn new(perception: Perception<'s>) -> Self {
        Self { perception }
    }

    /// All vehicles ahead on a lane, nearest first.
    ///
    /// On adjacent lanes this includes vehicles whose front is ahead of the
    /// perceiving vehicle's front but which are partly alongside it.
    pub fn leaders(&self, lane: RelativeLane) -> Result<Neighbors<'s>> {
        let p = self.perception;
        let (structure, root) = self.root(lane)?;
        let lazy = p.state.neighbors.leaders.get_or_update(lane, p.now, || {
            let perceived_type = p.state.config.perceived_type;
            let window = p.window_for(perceived_type)?;
            let offsets = SearchOffsets {
                search: p.ego.dx(RelativePosition::Front),
                headway: p.ego.dx(RelativePosition::Front),
                other: match lane.is_current() {
                    true => RelativePosition::Rear,
                    false => RelativePosition::Front,
                },
                max_distance: p.ego.parameters().get(&LOOKAHEAD)?,
            };
            trace!("Searching leaders of {:?} on {:?}", p.ego.id(), lane);
            PerceptionStats::count(&p.state.stats.searches);
            let search = NeighborSearch::new(root, true, offsets);
            let lazy = LazyNeighbors::new(structure, search, true, perceived_type, window);
            Ok(Rc::new(lazy))
        })?;
        Ok(Neighbors::new(lazy, p))
    }

    /// All vehicles behind on a lane, nearest first.
    ///
    /// On adjacent lanes this includes vehicles whose rear is behind the
    /// perceiving vehicle's rear but which are partly alongside it.
    pub fn followers(&self, lane: RelativeLane) -> Result<Neighbors<'s>> {
        let p = self.perception;
        let (structure, root) = self.root(lane)?;
        let lazy = p.state.neighbors.followers.get_or_update(lane, p.now, || {
            let perceived_type = p.state.config.perceived_type;
            let window = p.window_for(perceived_type)?;
            let offsets = SearchOffsets {
                search: p.ego.dx(RelativePosition::Rear),
                headway: p.ego.dx(RelativePosition::Rear),
                other: match lane.is_current() {
                    true => RelativePosition::Front,
                    false => RelativePosition::Rear,
                },
                max_distance: p.ego.parameters().get(&LOOKBACK)?,
            };
            trace!("Searching followers of {:?} on {:?}", p.ego.id(), lane);
            PerceptionStats::count(&p.state.stats.searches);
            let search = NeighborSearch::new(root, false, offsets);
            let lazy = LazyNeighbors::new(structure, search, false, perceived_type, window);
            Ok(Rc::new(lazy))
        })?;
        Ok(Neighbors::new(lazy, p))
    }

    /// The first vehicle ahead on every branch of the adjacent lane, nearest first.
    pub fn first_leaders(&self, lat: LateralDirection) -> Result<Rc<[Rc<PerceivedVehicle>]>> {
        let p = self.perception;
        let (structure, root) = self.root(adjacent(lat)?)?;
        p.state.neighbors.first_leaders.get_or_update(lat, p.now, || {
            let perceived_type = p.state.config.perceived_type;
            let window = p.window_for(perceived_type)?;
            let offsets = SearchOffsets {
                search: p.ego.dx(RelativePosition::Front),
                headway: p.ego.dx(RelativePosition::Front),
                other: RelativePosition::Rear,
                max_distance: p.ego.parameters().get(&LOOKAHEAD)?,
            };
            trace!("Searching first leaders of {:?} to the {:?}", p.ego.id(), lat);
            PerceptionStats::count(&p.state.stats.searches);
            let found = first_downstream(&p.search_context(&structure), root, offsets);
            Ok(found
                .into_iter()
                .map(|dv| p.perceive_found(perceived_type, window, dv, true))
                .collect())
        })
    }

    /// The first vehicle behind on every branch of the adjacent lane, nearest first.
    /// Several followers indicate a merge behind the perceiving vehicle.
    pub fn first_followers(&self, lat: LateralDirection) -> Result<Rc<[Rc<PerceivedVehicle>]>> {
        let p = self.perception;
        let (structure, root) = self.root(adjacent(lat)?)?;
        p.state.neighbors.first_followers.get_or_update(lat, p.now, || {
            let perceived_type = p.state.config.perceived_type;
            let window = p.window_for(perceived_type)?;
            let offsets = SearchOffsets {
                search: p.ego.dx(RelativePosition::Rear),
                headway: p.ego.dx(RelativePosition::Rear),
                other: RelativePosition::Front,
                max_distance: p.ego.parameters().get(&LOOKBACK)?,
            };
            trace!("Searching first followers of {:?} to the {:?}", p.ego.id(), lat);
            PerceptionStats::count(&p.state.stats.searches);
            let found = first_upstream(&p.search_context(&structure), root, offsets);
            Ok(found
                .into_iter()
                .map(|dv| p.perceive_found(perceived_type, window, dv, false))
                .collect())
        })
    }

    /// Whether a vehicle on the adjacent lane overlaps the perceiving vehicle longitudinally.
    pub fn is_vehicle_alongside(&self, lat: LateralDirection) -> Result<bool> {
        let p = self.perception;
        let (structure, root) = self.root(adjacent(lat)?)?;
        p.state.neighbors.alongside.get_or_update(lat, p.now, || {
            PerceptionStats::count(&p.state.stats.searches);
            let ctx = p.search_context(&structure);
            let ahead = SearchOffsets {
                search: p.ego.dx(RelativePosition::Rear),
                headway: p.ego.dx(RelativePosition::Front),
                other: RelativePosition::Front,
                max_distance: 0.0,
            };
            if first_downstream(&ctx, root, ahead).iter().any(|dv| dv.distance <= 0.0) {
                return Ok(true);
            }
            let behind = SearchOffsets {
                search: p.ego.dx(RelativePosition::Front),
                headway: p.ego.dx(RelativePosition::Rear),
                other: RelativePosition::Rear,
                max_distance: 0.0,
            };
            Ok(first_upstream(&ctx, root, behind).iter().any(|dv| dv.distance <= 0.0))
        })
    }

    fn root(&self, lane: RelativeLane) -> Result<(Rc<LaneStructure>, RecordId)> {
        let structure = self.perception.structure()?;
        let root = structure
            .root(lane)
            .ok_or(PerceptionError::LaneNotPerceived(lane))?;
        Ok((structure, root))
    }
}

fn adjacent(lat: LateralDirection) -> Result<RelativeLane> {
    match lat {
        LateralDirection::None => Err(PerceptionError::NoneDirection),
        lat => Ok(RelativeLane::new(lat, 1)),
    }
}
