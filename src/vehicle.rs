use self::kinematics::{advance, KinematicHistory};
use crate::parameters::Parameters;
use crate::util::Interval;
use crate::{LinkId, LinkSet, VehicleId};
use smallvec::SmallVec;

mod kinematics;

/// The maximum number of links the vehicle remembers behind its current link.
const MAX_TRAIL: usize = 4;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The type of vehicle.
    vehicle_type: VehicleType,
    /// Half the vehicle's width in m.
    half_wid: f64,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The behavioural parameters.
    params: Parameters,
    /// The longitudinal position of the centre along the current link, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The acceleration in m/s^2.
    acc: f64,
    /// The total distance travelled in m.
    odometer: f64,
    /// The vehicle's route, including the link it's currently on.
    route: Vec<LinkId>,
    /// The links behind the current link, most recent first.
    trail: SmallVec<[LinkId; MAX_TRAIL]>,
    /// The links the vehicle's extent overlaps, paired with the position
    /// of the vehicle's centre in that link's coordinates.
    occupied: SmallVec<[(LinkId, f64); 4]>,
    /// Past kinematic states.
    history: KinematicHistory,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Debug)]
pub struct VehicleAttributes {
    pub vehicle_type: VehicleType,
    /// The vehicle width in m.
    pub width: f64,
    /// The vehicle length in m.
    pub length: f64,
    /// The behavioural parameters, including those used by perception.
    pub parameters: Parameters,
}

/// The type of a vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VehicleType {
    #[default]
    Car,
    Truck,
    Bus,
}

/// A longitudinal reference point on a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelativePosition {
    /// The front bumper.
    Front,
    /// The rear bumper.
    Rear,
    /// The centre of the vehicle.
    Reference,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes, vel: f64, now: f64) -> Self {
        Self {
            id,
            vehicle_type: attributes.vehicle_type,
            half_wid: 0.5 * attributes.width,
            half_len: 0.5 * attributes.length,
            params: attributes.parameters.clone(),
            pos: 0.0,
            vel,
            acc: 0.0,
            odometer: 0.0,
            route: vec![],
            trail: SmallVec::new(),
            occupied: SmallVec::new(),
            history: KinematicHistory::new(now, vel),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The type of vehicle.
    pub fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    /// The vehicle's width in m.
    pub fn width(&self) -> f64 {
        2.0 * self.half_wid
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// The vehicle's behavioural parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Mutable access to the vehicle's behavioural parameters.
    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    /// The ID of the link the vehicle is currently travelling on.
    pub fn link_id(&self) -> Option<LinkId> {
        self.route.first().copied()
    }

    /// The longitudinal offset of a reference point from the vehicle's centre, in m.
    pub fn dx(&self, rel: RelativePosition) -> f64 {
        match rel {
            RelativePosition::Front => self.half_len,
            RelativePosition::Rear => -self.half_len,
            RelativePosition::Reference => 0.0,
        }
    }

    /// The longitudinal position of the centre of the vehicle in m.
    pub fn pos_mid(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.half_len
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos + self.half_len
    }

    /// The longitudinal extent of the vehicle along its current link.
    pub fn extent(&self) -> Interval<f64> {
        Interval::new(self.pos_rear(), self.pos_front())
    }

    /// The position of a reference point of the vehicle in the coordinates of
    /// the given link, if the vehicle's extent overlaps that link.
    pub fn position_on(&self, link_id: LinkId, rel: RelativePosition) -> Option<f64> {
        self.occupied
            .iter()
            .find(|(id, _)| *id == link_id)
            .map(|(_, pos)| pos + self.dx(rel))
    }

    /// The links the vehicle's extent overlaps.
    pub fn occupied_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.occupied.iter().map(|(id, _)| *id)
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The vehicle's acceleration in m/s^2.
    pub fn acc(&self) -> f64 {
        self.acc
    }

    /// The total distance travelled by the vehicle in m.
    pub fn odometer(&self) -> f64 {
        self.odometer
    }

    /// The odometer reading at a past time `t` in s.
    pub fn odometer_at(&self, t: f64) -> f64 {
        self.history.state_at(t).odometer
    }

    /// The velocity at a past time `t` in s.
    pub fn vel_at(&self, t: f64) -> f64 {
        self.history.state_at(t).vel
    }

    /// The acceleration at a past time `t` in s.
    pub fn acc_at(&self, t: f64) -> f64 {
        self.history.state_at(t).acc
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < 0.1
    }

    /// Sets the acceleration applied from time `now` onwards.
    pub(crate) fn set_acc(&mut self, acc: f64, now: f64) {
        self.acc = acc;
        self.history.set_acc(acc, now);
    }

    /// Integrates the vehicle's velocity and position.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    /// * `now` - The simulation time at the end of the step
    pub(crate) fn integrate(&mut self, dt: f64, now: f64) {
        let (dist, vel) = advance(self.vel, self.acc, dt);
        self.pos += dist;
        self.odometer += dist;
        self.vel = vel;
        self.history.push(now, self.odometer, self.vel, self.acc);
    }

    /// Checks whether the vehicle has travelled past the end of its current link,
    /// and if so, advances it to the next link on its route if there is one.
    /// Returns `true` iff the vehicle left its link; if the route is exhausted,
    /// [Vehicle::link_id] returns `None` afterwards.
    pub(crate) fn advance(&mut self, links: &LinkSet) -> bool {
        let mut advanced = false;
        while let Some(link_id) = self.route.first().copied() {
            let length = links[link_id].length();
            if self.pos <= length {
                break;
            }
            if self.route.len() == 1 {
                self.extend_route(links, self.pos + self.half_len);
            }
            self.route.remove(0);
            self.trail.insert(0, link_id);
            self.trail.truncate(MAX_TRAIL);
            self.pos -= length;
            advanced = true;
        }
        advanced
    }

    /// Sets the vehicle's position in the network.
    /// This also clears the vehicle's route.
    pub(crate) fn set_location(&mut self, link: LinkId, pos: f64) {
        self.route = vec![link];
        self.trail.clear();
        self.pos = pos;
    }

    /// Sets the links to follow after the current link.
    pub(crate) fn set_route(&mut self, route: &[LinkId]) {
        self.route.truncate(1);
        self.route.extend(route);
    }

    /// Recomputes the set of links overlapped by the vehicle.
    pub(crate) fn update_occupancy(&mut self, links: &LinkSet) {
        self.occupied.clear();
        let Some(current) = self.link_id() else {
            return;
        };
        self.occupied.push((current, self.pos));

        // Rear on preceding links
        self.extend_trail(links);
        let mut offset = self.pos;
        for link_id in &self.trail {
            if offset - self.half_len >= 0.0 {
                break;
            }
            offset += links[*link_id].length();
            self.occupied.push((*link_id, offset));
        }

        // Front on succeeding links
        self.extend_route(links, self.pos + self.half_len);
        let mut offset = self.pos;
        for pair in self.route.windows(2) {
            let length = links[pair[0]].length();
            if offset + self.half_len <= length {
                break;
            }
            offset -= length;
            self.occupied.push((pair[1], offset));
        }
    }

    /// Extends the route with default successors until it covers `dist` m from
    /// the start of the current link, or the network ends.
    fn extend_route(&mut self, links: &LinkSet, dist: f64) {
        let mut covered: f64 = self.route.iter().map(|id| links[*id].length()).sum();
        while covered < dist {
            let Some(last) = self.route.last() else {
                return;
            };
            match links[*last].links_out().first() {
                Some(next) => {
                    covered += links[*next].length();
                    self.route.push(*next);
                }
                None => return,
            }
        }
    }

    /// Extends the trail with default predecessors until it covers the vehicle's rear.
    fn extend_trail(&mut self, links: &LinkSet) {
        let mut covered = self.pos + self.trail.iter().map(|id| links[*id].length()).sum::<f64>();
        while covered < self.half_len && self.trail.len() < MAX_TRAIL {
            let last = self.trail.last().or(self.route.first());
            let Some(prev) = last.and_then(|id| links[*id].links_in().first()) else {
                return;
            };
            covered += links[*prev].length();
            self.trail.push(*prev);
        }
    }
}
