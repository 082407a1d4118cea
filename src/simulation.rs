#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::error::{PerceptionError, Result};
use crate::link::{Link, LinkAttributes};
use crate::parameters::{ParameterError, ParameterType};
use crate::perception::{LanePerception, LateralDirection, Perception, PerceptionConfig};
use crate::vehicle::{Vehicle, VehicleAttributes};
use crate::{LinkGroup, LinkId, LinkSet, VehicleId, VehicleSet};
use log::debug;
use slotmap::SecondaryMap;
use std::rc::Rc;

/// A traffic simulation whose drivers perceive each other.
#[derive(Default)]
pub struct Simulation {
    /// The links in the network.
    links: LinkSet,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The perception state of each vehicle.
    perceptions: SecondaryMap<VehicleId, LanePerception>,
    /// The perception configuration given to new vehicles.
    perception_config: PerceptionConfig,
    /// The current simulation time in s.
    time: f64,
    /// The current frame of simulation.
    frame: usize,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Simulation {
    /// Creates a new simulation.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a link to the network.
    pub fn add_link(&mut self, attributes: &LinkAttributes) -> LinkId {
        self.links.insert_with_key(|id| Link::new(id, attributes))
    }

    /// Specifies that the end of the `from` link connects to the start of the `to` link.
    pub fn add_link_connection(&mut self, from: LinkId, to: LinkId) {
        self.links[from].add_link_out(to);
        self.links[to].add_link_in(from);
    }

    /// Specifies that these links are laterally adjacent lanes.
    ///
    /// # Parameters
    /// * `link_ids` - The links in the link group; must be ordered left-to-right.
    pub fn add_link_group(&mut self, link_ids: &[LinkId]) {
        let group = Rc::new(LinkGroup::new(link_ids));
        for id in link_ids {
            self.links[*id].set_group(group.clone());
        }
    }

    /// Sets the perception configuration given to vehicles added from now on.
    pub fn set_default_perception_config(&mut self, config: PerceptionConfig) {
        self.perception_config = config;
    }

    /// Adds a vehicle to the simulation.
    ///
    /// # Parameters
    /// * `link` - The link the vehicle starts on
    /// * `pos` - The position of the vehicle's centre along the link in m
    /// * `vel` - The initial velocity in m/s
    pub fn add_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        link: LinkId,
        pos: f64,
        vel: f64,
    ) -> VehicleId {
        let now = self.time;
        let vehicle_id = self.vehicles.insert_with_key(|id| {
            let mut vehicle = Vehicle::new(id, attributes, vel, now);
            vehicle.set_location(link, pos);
            vehicle.update_occupancy(&self.links);
            vehicle
        });
        for link_id in self.vehicles[vehicle_id].occupied_links() {
            self.links[link_id].insert_vehicle(vehicle_id);
        }
        let perception = LanePerception::new(vehicle_id, self.perception_config);
        self.perceptions.insert(vehicle_id, perception);
        self.invalidate_perceptions();
        vehicle_id
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(id) {
            for link_id in vehicle.occupied_links() {
                self.links[link_id].remove_vehicle(id);
            }
        }
        self.perceptions.remove(id);
        self.invalidate_perceptions();
    }

    /// Replaces the perception of a vehicle, forgetting everything it perceived.
    pub fn set_perception_config(&mut self, id: VehicleId, config: PerceptionConfig) {
        if self.vehicles.contains_key(id) {
            self.perceptions.insert(id, LanePerception::new(id, config));
        }
    }

    /// Sets a behavioural parameter of a vehicle.
    pub fn set_vehicle_parameter(
        &mut self,
        id: VehicleId,
        ty: &ParameterType,
        value: f64,
    ) -> std::result::Result<(), ParameterError> {
        self.vehicles[id].parameters_mut().set(ty, value)?;
        if let Some(perception) = self.perceptions.get(id) {
            perception.invalidate();
        }
        Ok(())
    }

    /// Sets the acceleration of a vehicle from the current time onwards.
    pub fn set_vehicle_acceleration(&mut self, id: VehicleId, acc: f64) {
        self.vehicles[id].set_acc(acc, self.time);
    }

    /// Sets the links the vehicle follows after its current link.
    /// Where the route runs out, vehicles take the first outgoing link.
    pub fn set_vehicle_route(&mut self, id: VehicleId, route: &[LinkId]) {
        self.vehicles[id].set_route(route);
        self.update_registrations();
        self.invalidate_perceptions();
    }

    /// Moves a vehicle instantaneously to the adjacent lane, keeping its
    /// longitudinal position. Returns `false` if there is no such lane.
    pub fn do_lane_change(&mut self, id: VehicleId, lat: LateralDirection) -> bool {
        let Some(link_id) = self.vehicles.get(id).and_then(|v| v.link_id()) else {
            return false;
        };
        let target = match lat {
            LateralDirection::Left => self.links[link_id].left(),
            LateralDirection::Right => self.links[link_id].right(),
            LateralDirection::None => None,
        };
        let Some(target) = target else {
            return false;
        };

        let vehicle = &mut self.vehicles[id];
        let pos = vehicle.pos_mid();
        vehicle.set_location(target, pos);
        debug!("{:?} changed lane from {:?} to {:?}", id, link_id, target);
        self.update_registrations();
        self.invalidate_perceptions();
        if let Some(perception) = self.perceptions.get(id) {
            perception.change_lane(lat);
        }
        true
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.time += dt;
        self.integrate(dt);
        self.advance_vehicles();
        self.update_registrations();
        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
    }

    /// Gets the current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Returns an iterator over all the links in the simulation.
    pub fn iter_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> &Vehicle {
        &self.vehicles[vehicle_id]
    }

    /// Gets a reference to the link with the given ID.
    pub fn get_link(&self, link_id: LinkId) -> &Link {
        &self.links[link_id]
    }

    /// The perception of a vehicle at the current time.
    pub fn perception(&self, id: VehicleId) -> Result<Perception<'_>> {
        let ego = self
            .vehicles
            .get(id)
            .ok_or(PerceptionError::UnknownVehicle(id))?;
        let state = self
            .perceptions
            .get(id)
            .ok_or(PerceptionError::UnknownVehicle(id))?;
        Ok(Perception::new(
            &self.links,
            &self.vehicles,
            ego,
            state,
            self.time,
        ))
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Integrates the velocities and positions of all vehicles.
    fn integrate(&mut self, dt: f64) {
        for (_, vehicle) in &mut self.vehicles {
            vehicle.integrate(dt, self.time);
        }
    }

    /// Moves vehicles onto their next links, removing those that leave the network.
    fn advance_vehicles(&mut self) {
        let mut exited = vec![];
        for (id, vehicle) in &mut self.vehicles {
            vehicle.advance(&self.links);
            if vehicle.link_id().is_none() {
                exited.push(id);
            }
        }
        for id in exited {
            debug!("{:?} left the network", id);
            self.vehicles.remove(id);
            self.perceptions.remove(id);
        }
    }

    /// Registers every vehicle on the links it overlaps.
    fn update_registrations(&mut self) {
        for link in self.links.values_mut() {
            link.clear_vehicles();
        }
        for (id, vehicle) in &mut self.vehicles {
            vehicle.update_occupancy(&self.links);
            for link_id in vehicle.occupied_links() {
                self.links[link_id].insert_vehicle(id);
            }
        }
    }

    /// Forces all perceptions to be recomputed, after vehicles moved within a time step.
    fn invalidate_perceptions(&self) {
        for perception in self.perceptions.values() {
            perception.invalidate();
        }
    }
}
