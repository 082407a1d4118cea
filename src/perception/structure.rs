use super::relative::{LateralDirection, RelativeLane};
use crate::error::{PerceptionError, Result};
use crate::{LinkId, LinkSet, RecordId, Vehicle};
use log::debug;
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};

/// A node in the lane structure perceived by a vehicle: one link, positioned
/// relative to the vehicle's reference point.
#[derive(Clone, Debug)]
pub struct LaneRecord {
    link: LinkId,
    length: f64,
    /// Distance from the ego reference point to the start of the link.
    /// Negative if the link starts behind the vehicle.
    start_distance: f64,
    next: SmallVec<[RecordId; 2]>,
    prev: SmallVec<[RecordId; 2]>,
}

impl LaneRecord {
    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn start_distance(&self) -> f64 {
        self.start_distance
    }

    /// Distance from the ego reference point to the end of the link.
    pub fn end_distance(&self) -> f64 {
        self.start_distance + self.length
    }

    /// The downstream records.
    pub fn next(&self) -> &[RecordId] {
        &self.next
    }

    /// The upstream records.
    pub fn prev(&self) -> &[RecordId] {
        &self.prev
    }
}

/// The lanes around a vehicle, as a directed acyclic graph of [LaneRecord]s
/// rooted at each lane of the vehicle's cross section.
#[derive(Clone, Debug)]
pub struct LaneStructure {
    records: SlotMap<RecordId, LaneRecord>,
    roots: BTreeMap<RelativeLane, RecordId>,
    lookahead: f64,
    lookback: f64,
    /// The simulation time the structure was built at.
    time: f64,
}

impl LaneStructure {
    /// Builds the lane structure around a vehicle.
    ///
    /// # Parameters
    /// * `lateral_lanes` - How many lanes to include on either side
    /// * `lookahead` - How far downstream of the vehicle to extend, in m
    /// * `lookback` - How far upstream of the vehicle to extend, in m
    pub(crate) fn build(
        links: &LinkSet,
        ego: &Vehicle,
        lateral_lanes: u8,
        lookahead: f64,
        lookback: f64,
        now: f64,
    ) -> Result<Self> {
        let link_id = ego.link_id().ok_or_else(|| {
            PerceptionError::Topology(format!("vehicle {:?} is not on a link", ego.id()))
        })?;
        let mut structure = Self {
            records: SlotMap::with_key(),
            roots: BTreeMap::new(),
            lookahead,
            lookback,
            time: now,
        };

        // Adjacent links share the longitudinal frame of the current link
        let start = -ego.pos_mid();
        structure.add_root(links, RelativeLane::CURRENT, link_id, start);
        for lat in [LateralDirection::Left, LateralDirection::Right] {
            let mut lane = RelativeLane::CURRENT;
            let mut link = &links[link_id];
            for _ in 0..lateral_lanes {
                let adjacent = match lat {
                    LateralDirection::Left => link.left(),
                    _ => link.right(),
                };
                let Some(adjacent) = adjacent else {
                    break;
                };
                lane = lane.shifted(lat);
                structure.add_root(links, lane, adjacent, start);
                link = &links[adjacent];
            }
        }

        debug!(
            "Built lane structure for {:?} with {} records over {} lanes",
            ego.id(),
            structure.records.len(),
            structure.roots.len()
        );
        Ok(structure)
    }

    /// Gets a record.
    pub fn record(&self, id: RecordId) -> &LaneRecord {
        &self.records[id]
    }

    /// The record the vehicle is on, or the record laterally adjacent to it.
    pub fn root(&self, lane: RelativeLane) -> Option<RecordId> {
        self.roots.get(&lane).copied()
    }

    /// The lanes of the cross section, left to right.
    pub fn cross_section(&self) -> impl Iterator<Item = RelativeLane> + '_ {
        self.roots.keys().copied()
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn lookback(&self) -> f64 {
        self.lookback
    }

    /// The simulation time the structure was built at.
    pub fn time(&self) -> f64 {
        self.time
    }

    fn insert(&mut self, links: &LinkSet, link: LinkId, start_distance: f64) -> RecordId {
        self.records.insert(LaneRecord {
            link,
            length: links[link].length(),
            start_distance,
            next: SmallVec::new(),
            prev: SmallVec::new(),
        })
    }

    fn connect(&mut self, from: RecordId, to: RecordId) {
        if !self.records[from].next.contains(&to) {
            self.records[from].next.push(to);
            self.records[to].prev.push(from);
        }
    }

    /// Adds the records reachable from one root link.
    ///
    /// Links are visited in order of increasing distance from the root, so a
    /// link reached over several paths takes its shortest distance. An edge
    /// that would close a cycle is not connected, which keeps the graph acyclic.
    fn add_root(&mut self, links: &LinkSet, lane: RelativeLane, link: LinkId, start: f64) {
        let root = self.insert(links, link, start);
        self.roots.insert(lane, root);

        // Downstream, keyed by start distance
        let mut downstream = HashMap::from([(link, root)]);
        let mut order = vec![root];
        let mut frontier = BinaryHeap::new();
        self.push_next(links, root, &mut frontier);
        while let Some(Pending { distance, link }) = frontier.pop() {
            if downstream.contains_key(&link) {
                continue;
            }
            let record = self.insert(links, link, distance);
            downstream.insert(link, record);
            order.push(record);
            self.push_next(links, record, &mut frontier);
        }
        for id in order {
            let record = &self.records[id];
            if record.end_distance() >= self.lookahead {
                continue;
            }
            for next in links[record.link].links_out() {
                let to = downstream[next];
                if self.reaches(to, id) {
                    debug!("Loop at {:?} in lane structure, not following", next);
                } else {
                    self.connect(id, to);
                }
            }
        }

        // Upstream, keyed by distance to the end of the link
        let mut upstream = HashMap::from([(link, root)]);
        let mut order = vec![root];
        let mut frontier = BinaryHeap::new();
        self.push_prev(links, root, &mut frontier);
        while let Some(Pending { distance, link }) = frontier.pop() {
            if upstream.contains_key(&link) {
                continue;
            }
            if downstream.contains_key(&link) {
                debug!("Loop at {:?} in lane structure, not following", link);
                continue;
            }
            let record = self.insert(links, link, -distance - links[link].length());
            upstream.insert(link, record);
            order.push(record);
            self.push_prev(links, record, &mut frontier);
        }
        for id in order {
            let record = &self.records[id];
            if record.start_distance <= -self.lookback {
                continue;
            }
            for prev in links[record.link].links_in() {
                let Some(&from) = upstream.get(prev) else {
                    continue;
                };
                if self.reaches(id, from) {
                    debug!("Loop at {:?} in lane structure, not following", prev);
                } else {
                    self.connect(from, id);
                }
            }
        }
    }

    fn push_next(&self, links: &LinkSet, id: RecordId, frontier: &mut BinaryHeap<Pending>) {
        let record = &self.records[id];
        let end = record.end_distance();
        if end < self.lookahead {
            for next in links[record.link].links_out() {
                frontier.push(Pending {
                    distance: end,
                    link: *next,
                });
            }
        }
    }

    fn push_prev(&self, links: &LinkSet, id: RecordId, frontier: &mut BinaryHeap<Pending>) {
        let record = &self.records[id];
        if record.start_distance > -self.lookback {
            for prev in links[record.link].links_in() {
                frontier.push(Pending {
                    distance: -record.start_distance,
                    link: *prev,
                });
            }
        }
    }

    /// Whether `to` can be reached from `from` along `next` edges.
    fn reaches(&self, from: RecordId, to: RecordId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if id == to {
                return true;
            }
            if visited.insert(id) {
                queue.extend(self.records[id].next.iter().copied());
            }
        }
        false
    }
}

/// A link waiting to be added to the structure, at a distance from the root.
#[derive(Clone, Copy, Debug)]
struct Pending {
    distance: f64,
    link: LinkId,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reversed, so the max-heap pops the nearest link first.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.link.cmp(&self.link))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::{Link, LinkAttributes};
    use crate::parameters::Parameters;
    use crate::vehicle::VehicleAttributes;
    use crate::VehicleId;
    use assert_approx_eq::assert_approx_eq;

    fn network(lengths: &[f64], connections: &[(usize, usize)]) -> (LinkSet, Vec<LinkId>) {
        let mut links = LinkSet::with_key();
        let ids: Vec<_> = lengths
            .iter()
            .map(|length| {
                links.insert_with_key(|id| {
                    Link::new(
                        id,
                        &LinkAttributes {
                            length: *length,
                            speed_limit: 20.0,
                        },
                    )
                })
            })
            .collect();
        for (from, to) in connections {
            links[ids[*from]].add_link_out(ids[*to]);
            links[ids[*to]].add_link_in(ids[*from]);
        }
        (links, ids)
    }

    fn vehicle_on(links: &LinkSet, link: LinkId, pos: f64) -> Vehicle {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let attributes = VehicleAttributes {
            vehicle_type: Default::default(),
            width: 2.0,
            length: 4.0,
            parameters: Parameters::with_defaults(),
        };
        let mut vehicle = Vehicle::new(ids.insert(()), &attributes, 0.0, 0.0);
        vehicle.set_location(link, pos);
        vehicle.update_occupancy(links);
        vehicle
    }

    #[test]
    fn diamond_shares_records() {
        // 0 splits into 1 and 2, which merge into 3
        let (links, ids) = network(
            &[100.0, 50.0, 50.0, 100.0],
            &[(0, 1), (0, 2), (1, 3), (2, 3)],
        );
        let ego = vehicle_on(&links, ids[0], 30.0);
        let structure = LaneStructure::build(&links, &ego, 1, 295.0, 200.0, 0.0).unwrap();

        assert_eq!(structure.len(), 4);
        let root = structure.record(structure.root(RelativeLane::CURRENT).unwrap());
        assert_approx_eq!(root.start_distance(), -30.0);
        assert_eq!(root.next().len(), 2);
        let merge = structure.record(structure.record(root.next()[0]).next()[0]);
        assert_eq!(merge.link(), ids[3]);
        assert_approx_eq!(merge.start_distance(), 120.0);
        assert_eq!(merge.prev().len(), 2);
    }

    #[test]
    fn merge_takes_shortest_branch() {
        // 0 splits into a long link 1 and a short chain 2 -> 3, merging into 4
        let (links, ids) = network(
            &[100.0, 200.0, 10.0, 10.0, 100.0],
            &[(0, 1), (0, 2), (2, 3), (3, 4), (1, 4)],
        );
        let ego = vehicle_on(&links, ids[0], 10.0);
        let structure = LaneStructure::build(&links, &ego, 0, 295.0, 200.0, 0.0).unwrap();

        assert_eq!(structure.len(), 5);
        let root = structure.record(structure.root(RelativeLane::CURRENT).unwrap());
        let long = root
            .next()
            .iter()
            .map(|id| structure.record(*id))
            .find(|record| record.link() == ids[1])
            .unwrap();
        assert_eq!(long.next().len(), 1);
        let merge = structure.record(long.next()[0]);
        assert_eq!(merge.link(), ids[4]);
        assert_approx_eq!(merge.start_distance(), 110.0);
        assert_eq!(merge.prev().len(), 2);
    }

    #[test]
    fn ring_road_terminates() {
        let (links, ids) = network(&[100.0, 100.0], &[(0, 1), (1, 0)]);
        let ego = vehicle_on(&links, ids[0], 50.0);
        let structure = LaneStructure::build(&links, &ego, 1, 295.0, 200.0, 0.0).unwrap();

        assert_eq!(structure.len(), 2);
        let root = structure.record(structure.root(RelativeLane::CURRENT).unwrap());
        assert_eq!(root.next().len(), 1);
        assert!(root.prev().is_empty());
    }

    #[test]
    fn respects_lookahead() {
        let (links, ids) = network(&[100.0, 100.0, 100.0], &[(0, 1), (1, 2)]);
        let ego = vehicle_on(&links, ids[0], 10.0);
        let structure = LaneStructure::build(&links, &ego, 0, 150.0, 50.0, 0.0).unwrap();
        assert_eq!(structure.len(), 2);
        assert_eq!(structure.cross_section().count(), 1);
    }
}
