//! Perception of surrounding traffic and infrastructure by drivers.
//!
//! Each vehicle owns a [LanePerception], which holds everything it has perceived
//! during the current time step. Queries go through a [Perception], a cheap view
//! that pairs that state with the simulation it observes.

pub use self::anticipation::Anticipation;
pub use self::estimation::{Estimation, NeighborTriplet};
pub use self::infrastructure::InfrastructurePerception;
pub use self::iterable::{Neighbors, NeighborsIter, PerceptionCollector};
pub use self::longitudinal::LongitudinalPerception;
pub use self::neighbors::NeighborsPerception;
pub use self::perceived::{Kinematics, PerceivedType, PerceivedVehicle, Reference};
pub use self::reaction::ReactionWindow;
pub use self::relative::{LateralDirection, RelativeLane};
pub use self::search::DistanceVehicle;
pub use self::structure::{LaneRecord, LaneStructure};
use self::estimation::ErrorTracker;
use self::infrastructure::InfrastructureCache;
use self::longitudinal::LongitudinalCache;
use self::neighbors::NeighborsCache;
use self::perceived::{PerceiveInput, Perceived};
use self::search::SearchContext;
use crate::debug::debug_neighbor;
use crate::error::{PerceptionError, Result};
use crate::parameters::{LOOKAHEAD, LOOKBACK};
use crate::{LinkSet, Vehicle, VehicleId, VehicleSet};
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::Key;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

mod anticipation;
mod cache;
mod estimation;
mod infrastructure;
mod iterable;
mod longitudinal;
mod neighbors;
mod perceived;
mod reaction;
mod relative;
mod search;
mod structure;

/// The maximum number of lanes perceived on either side of the current lane.
pub const MAX_LATERAL_LANES: u8 = 4;

/// How a vehicle perceives its surroundings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PerceptionConfig {
    /// How neighbours are perceived.
    pub perceived_type: PerceivedType,
    /// The number of lanes perceived on either side of the current lane.
    pub lateral_lanes: u8,
    /// Seed for random perception errors. Each vehicle derives its own stream from it.
    pub seed: u64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            perceived_type: PerceivedType::default(),
            lateral_lanes: 1,
            seed: 0,
        }
    }
}

#[cfg(feature = "serde")]
impl PerceptionConfig {
    /// Parses a configuration from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Counts of the work done by a [LanePerception].
#[derive(Debug, Default)]
pub struct PerceptionStats {
    structures: Cell<usize>,
    searches: Cell<usize>,
    perceived: Cell<usize>,
    estimations: Cell<usize>,
}

impl PerceptionStats {
    /// The number of lane structures built.
    pub fn structures(&self) -> usize {
        self.structures.get()
    }

    /// The number of neighbour searches started.
    pub fn searches(&self) -> usize {
        self.searches.get()
    }

    /// The number of neighbours perceived.
    pub fn perceived(&self) -> usize {
        self.perceived.get()
    }

    /// The number of neighbour states estimated.
    pub fn estimations(&self) -> usize {
        self.estimations.get()
    }

    fn count(cell: &Cell<usize>) {
        cell.set(cell.get() + 1);
    }
}

/// The perception state of one vehicle.
pub struct LanePerception {
    vehicle: VehicleId,
    config: PerceptionConfig,
    structure: RefCell<Option<Rc<LaneStructure>>>,
    window: Cell<Option<ReactionWindow>>,
    errors: RefCell<ErrorTracker>,
    stats: PerceptionStats,
    neighbors: NeighborsCache,
    longitudinal: LongitudinalCache,
    infrastructure: InfrastructureCache,
}

impl LanePerception {
    pub(crate) fn new(vehicle: VehicleId, config: PerceptionConfig) -> Self {
        let config = PerceptionConfig {
            lateral_lanes: config.lateral_lanes.min(MAX_LATERAL_LANES),
            ..config
        };
        let seed = config.seed.wrapping_add(vehicle.data().as_ffi());
        Self {
            vehicle,
            config,
            structure: RefCell::new(None),
            window: Cell::new(None),
            errors: RefCell::new(ErrorTracker::new(seed)),
            stats: PerceptionStats::default(),
            neighbors: NeighborsCache::default(),
            longitudinal: LongitudinalCache::default(),
            infrastructure: InfrastructureCache::default(),
        }
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    pub fn stats(&self) -> &PerceptionStats {
        &self.stats
    }

    /// Forgets the lane structure and everything perceived, so that the next
    /// queries recompute even within the same time step.
    pub fn invalidate(&self) {
        self.structure.borrow_mut().take();
        self.neighbors.clear();
        self.longitudinal.clear();
        self.infrastructure.clear();
    }

    /// Notifies the perception that its vehicle moved to the adjacent lane.
    pub fn change_lane(&self, lat: LateralDirection) {
        debug!("{:?} changed lane to the {:?}, invalidating perception", self.vehicle, lat);
        self.invalidate();
    }
}

/// A vehicle's view of the simulation at the current time.
#[derive(Clone, Copy)]
pub struct Perception<'s> {
    links: &'s LinkSet,
    vehicles: &'s VehicleSet,
    ego: &'s Vehicle,
    state: &'s LanePerception,
    now: f64,
}

impl<'s> Perception<'s> {
    pub(crate) fn new(
        links: &'s LinkSet,
        vehicles: &'s VehicleSet,
        ego: &'s Vehicle,
        state: &'s LanePerception,
        now: f64,
    ) -> Self {
        Self {
            links,
            vehicles,
            ego,
            state,
            now,
        }
    }

    /// The perceiving vehicle.
    pub fn vehicle(&self) -> &'s Vehicle {
        self.ego
    }

    /// The current simulation time in s.
    pub fn time(&self) -> f64 {
        self.now
    }

    pub fn config(&self) -> &'s PerceptionConfig {
        &self.state.config
    }

    pub fn stats(&self) -> &'s PerceptionStats {
        &self.state.stats
    }

    /// Perception of surrounding vehicles.
    pub fn neighbors(&self) -> NeighborsPerception<'s> {
        NeighborsPerception::new(*self)
    }

    /// Perception for longitudinal control systems.
    pub fn longitudinal(&self) -> LongitudinalPerception<'s> {
        LongitudinalPerception::new(*self)
    }

    /// Perception of the road.
    pub fn infrastructure(&self) -> InfrastructurePerception<'s> {
        InfrastructurePerception::new(*self)
    }

    /// The lane structure around the vehicle, built once per time step.
    pub fn structure(&self) -> Result<Rc<LaneStructure>> {
        if let Some(structure) = self.state.structure.borrow().as_ref() {
            if structure.time() > self.now {
                panic!(
                    "Lane structure requested at {} but built at {}",
                    self.now,
                    structure.time()
                );
            }
            if structure.time() == self.now {
                return Ok(structure.clone());
            }
        }
        let params = self.ego.parameters();
        let structure = Rc::new(LaneStructure::build(
            self.links,
            self.ego,
            self.state.config.lateral_lanes,
            params.get(&LOOKAHEAD)?,
            params.get(&LOOKBACK)?,
            self.now,
        )?);
        PerceptionStats::count(&self.state.stats.structures);
        *self.state.structure.borrow_mut() = Some(structure.clone());
        Ok(structure)
    }

    /// The reaction window of the configured perception at the current time.
    pub fn reaction_window(&self) -> Result<ReactionWindow> {
        let estimation = match self.state.config.perceived_type {
            PerceivedType::Delayed { estimation, .. } => estimation,
            PerceivedType::Copy => Estimation::None,
        };
        self.update_window(estimation)
    }

    /// Perceives a vehicle at a known distance using the configured perception.
    ///
    /// # Parameters
    /// * `distance` - The actual headway to the vehicle in m
    /// * `downstream` - Whether the vehicle is ahead of the reference
    /// * `reference` - What the headway is measured from
    pub fn perceive(
        &self,
        vehicle: VehicleId,
        distance: f64,
        downstream: bool,
        reference: Reference,
    ) -> Result<PerceivedVehicle> {
        let neighbor = self
            .vehicles
            .get(vehicle)
            .ok_or(PerceptionError::UnknownVehicle(vehicle))?;
        let perceived_type = self.state.config.perceived_type;
        let window = self.window_for(perceived_type)?;
        Ok(self.perceive_vehicle(
            perceived_type,
            window,
            neighbor,
            distance,
            downstream,
            reference,
        ))
    }

    fn update_window(&self, estimation: Estimation) -> Result<ReactionWindow> {
        let window = ReactionWindow::update(self.state.window.get(), self.ego, &estimation, self.now)?;
        self.state.window.set(Some(window));
        Ok(window)
    }

    /// The reaction window needed to perceive with the given type, if any.
    pub(crate) fn window_for(&self, perceived_type: PerceivedType) -> Result<Option<ReactionWindow>> {
        match perceived_type {
            PerceivedType::Copy => Ok(None),
            PerceivedType::Delayed { estimation, .. } => self.update_window(estimation).map(Some),
        }
    }

    pub(crate) fn search_context<'a>(&self, structure: &'a LaneStructure) -> SearchContext<'a>
    where
        's: 'a,
    {
        SearchContext {
            structure,
            links: self.links,
            vehicles: self.vehicles,
            ego: self.ego.id(),
        }
    }

    pub(crate) fn perceive_found(
        &self,
        perceived_type: PerceivedType,
        window: Option<ReactionWindow>,
        found: DistanceVehicle,
        downstream: bool,
    ) -> Rc<PerceivedVehicle> {
        let neighbor = &self.vehicles[found.vehicle];
        Rc::new(self.perceive_vehicle(
            perceived_type,
            window,
            neighbor,
            found.distance,
            downstream,
            Reference::Ego,
        ))
    }

    fn perceive_vehicle(
        &self,
        perceived_type: PerceivedType,
        window: Option<ReactionWindow>,
        neighbor: &Vehicle,
        distance: f64,
        downstream: bool,
        reference: Reference,
    ) -> PerceivedVehicle {
        let input = PerceiveInput {
            ego: self.ego,
            reference,
            neighbor,
            distance,
            downstream,
            now: self.now,
            window,
        };
        let perceived = perceived_type.perceive(&input, &mut self.state.errors.borrow_mut());
        let stats = &self.state.stats;
        PerceptionStats::count(&stats.perceived);
        if let Perceived::Estimated(_) = perceived {
            PerceptionStats::count(&stats.estimations);
        }
        let vehicle = perceived.into_inner();
        let name = if downstream { "leader" } else { "follower" };
        debug_neighbor(name, self.ego.id(), &vehicle);
        vehicle
    }
}
