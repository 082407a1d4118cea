use crate::group::LinkGroup;
use crate::vehicle::RelativePosition;
use crate::{LinkId, VehicleId, VehicleSet};
use std::rc::Rc;

/// A link represents a single directed lane of traffic.
#[derive(Clone)]
pub struct Link {
    /// The link ID.
    id: LinkId,
    /// The length of the link in m.
    length: f64,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// The links that precede this one.
    links_in: Vec<LinkId>,
    /// The links that succeed this one.
    links_out: Vec<LinkId>,
    /// The group of laterally adjacent links this link belongs to, if any.
    group: Option<Rc<LinkGroup>>,
    /// The vehicles whose longitudinal extent overlaps the link.
    vehicles: Vec<VehicleId>,
}

/// The attributes of a link.
#[derive(Clone, Copy, Debug)]
pub struct LinkAttributes {
    /// The length of the link in m.
    pub length: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

impl Link {
    /// Creates a new link.
    pub(crate) fn new(id: LinkId, attributes: &LinkAttributes) -> Self {
        Self {
            id,
            length: attributes.length,
            speed_limit: attributes.speed_limit,
            links_in: vec![],
            links_out: vec![],
            group: None,
            vehicles: vec![],
        }
    }

    /// Gets the link's ID.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Gets the length of the link in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the speed limit of the link in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The links that precede this one.
    pub fn links_in(&self) -> &[LinkId] {
        &self.links_in
    }

    /// The links that succeed this one.
    pub fn links_out(&self) -> &[LinkId] {
        &self.links_out
    }

    /// The vehicles currently overlapping the link, in no particular order.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The laterally adjacent link to the left, if there is one.
    pub fn left(&self) -> Option<LinkId> {
        self.group.as_ref().and_then(|g| g.left_of(self.id))
    }

    /// The laterally adjacent link to the right, if there is one.
    pub fn right(&self) -> Option<LinkId> {
        self.group.as_ref().and_then(|g| g.right_of(self.id))
    }

    /// Sets the link group the link belongs to.
    pub(crate) fn set_group(&mut self, group: Rc<LinkGroup>) {
        self.group = Some(group);
    }

    /// Adds a successor link.
    pub(crate) fn add_link_out(&mut self, link_id: LinkId) {
        if !self.links_out.contains(&link_id) {
            self.links_out.push(link_id);
        }
    }

    /// Adds a predecessor link.
    pub(crate) fn add_link_in(&mut self, link_id: LinkId) {
        if !self.links_in.contains(&link_id) {
            self.links_in.push(link_id);
        }
    }

    /// Registers a vehicle on the link.
    pub(crate) fn insert_vehicle(&mut self, id: VehicleId) {
        if !self.vehicles.contains(&id) {
            self.vehicles.push(id);
        }
    }

    /// Deregisters a vehicle from the link.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        self.vehicles.retain(|v| *v != id);
    }

    /// Removes all vehicle registrations.
    pub(crate) fn clear_vehicles(&mut self) {
        self.vehicles.clear();
    }

    /// Finds the vehicle whose `rel` position is the first strictly downstream of `pos`,
    /// along with that position in link coordinates.
    pub fn first_vehicle_ahead(
        &self,
        pos: f64,
        rel: RelativePosition,
        vehicles: &VehicleSet,
        exclude: Option<VehicleId>,
    ) -> Option<(VehicleId, f64)> {
        self.vehicle_positions(rel, vehicles, exclude)
            .filter(|(_, p)| *p > pos)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Finds the vehicle whose `rel` position is the first strictly upstream of `pos`,
    /// along with that position in link coordinates.
    pub fn first_vehicle_behind(
        &self,
        pos: f64,
        rel: RelativePosition,
        vehicles: &VehicleSet,
        exclude: Option<VehicleId>,
    ) -> Option<(VehicleId, f64)> {
        self.vehicle_positions(rel, vehicles, exclude)
            .filter(|(_, p)| *p < pos)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// The `rel` positions of all registered vehicles in link coordinates.
    pub(crate) fn vehicle_positions<'a>(
        &'a self,
        rel: RelativePosition,
        vehicles: &'a VehicleSet,
        exclude: Option<VehicleId>,
    ) -> impl Iterator<Item = (VehicleId, f64)> + 'a {
        self.vehicles
            .iter()
            .filter(move |id| Some(**id) != exclude)
            .filter_map(move |id| {
                vehicles
                    .get(*id)
                    .and_then(|veh| veh.position_on(self.id, rel))
                    .map(|pos| (*id, pos))
            })
    }

    /// The length of the longest vehicle registered on the link in m.
    pub(crate) fn max_vehicle_length(&self, vehicles: &VehicleSet) -> f64 {
        self.vehicles
            .iter()
            .filter_map(|id| vehicles.get(*id))
            .map(|veh| veh.length())
            .fold(0.0, f64::max)
    }
}
