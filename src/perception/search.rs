use super::structure::LaneStructure;
use crate::vehicle::RelativePosition;
use crate::{LinkSet, RecordId, VehicleId, VehicleSet};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A vehicle found by a search, with its headway to the perceiving vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceVehicle {
    pub vehicle: VehicleId,
    /// The headway in m; negative if the vehicles overlap longitudinally.
    pub distance: f64,
}

/// The world a search runs against.
#[derive(Clone, Copy)]
pub(crate) struct SearchContext<'a> {
    pub structure: &'a LaneStructure,
    pub links: &'a LinkSet,
    pub vehicles: &'a VehicleSet,
    /// The perceiving vehicle, which is never found.
    pub ego: VehicleId,
}

/// The reference points and range of a search.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SearchOffsets {
    /// Offset of the search position from the ego reference point, in m.
    pub search: f64,
    /// Offset of the headway reference from the ego reference point, in m.
    pub headway: f64,
    /// The point on other vehicles compared against the search position.
    pub other: RelativePosition,
    /// Vehicles further than this are not found.
    pub max_distance: f64,
}

impl<'a> SearchContext<'a> {
    fn downstream_headway(&self, record: RecordId, vehicle: VehicleId, offsets: &SearchOffsets) -> Option<f64> {
        let record = self.structure.record(record);
        let rear = self.vehicles[vehicle].position_on(record.link(), RelativePosition::Rear)?;
        Some(record.start_distance() + rear - offsets.headway)
    }

    fn upstream_headway(&self, record: RecordId, vehicle: VehicleId, offsets: &SearchOffsets) -> Option<f64> {
        let record = self.structure.record(record);
        let front = self.vehicles[vehicle].position_on(record.link(), RelativePosition::Front)?;
        Some(-record.start_distance() - front + offsets.headway)
    }
}

/// Finds the first vehicle downstream on every branch of the lane rooted at `root`.
/// The results are unique by vehicle and sorted by headway.
pub(crate) fn first_downstream(
    ctx: &SearchContext,
    root: RecordId,
    offsets: SearchOffsets,
) -> Vec<DistanceVehicle> {
    let mut current = vec![];
    align_upstream(ctx.structure, root, offsets.search, &mut current);

    let mut visited = HashSet::new();
    let mut found = vec![];
    while !current.is_empty() {
        let mut next = vec![];
        for id in current {
            if !visited.insert(id) {
                continue;
            }
            let record = ctx.structure.record(id);
            let link = &ctx.links[record.link()];
            let pos = -record.start_distance() + offsets.search;
            match link.first_vehicle_ahead(pos, offsets.other, ctx.vehicles, Some(ctx.ego)) {
                Some((vehicle, _)) => {
                    if let Some(distance) = ctx.downstream_headway(id, vehicle, &offsets) {
                        if distance <= offsets.max_distance {
                            found.push(DistanceVehicle { vehicle, distance });
                        }
                    }
                }
                None if record.start_distance() - offsets.headway <= offsets.max_distance => {
                    next.extend_from_slice(record.next());
                }
                None => {}
            }
        }
        current = next;
    }
    unique_sorted(found)
}

/// Finds the first vehicle upstream on every branch of the lane rooted at `root`.
/// The results are unique by vehicle and sorted by headway.
pub(crate) fn first_upstream(
    ctx: &SearchContext,
    root: RecordId,
    offsets: SearchOffsets,
) -> Vec<DistanceVehicle> {
    let mut current = vec![];
    align_downstream(ctx.structure, root, offsets.search, &mut current);

    let mut visited = HashSet::new();
    let mut found = vec![];
    while !current.is_empty() {
        let mut next = vec![];
        for id in current {
            if !visited.insert(id) {
                continue;
            }
            let record = ctx.structure.record(id);
            let link = &ctx.links[record.link()];
            let pos = -record.start_distance() + offsets.search;
            match link.first_vehicle_behind(pos, offsets.other, ctx.vehicles, Some(ctx.ego)) {
                Some((vehicle, _)) => {
                    if let Some(distance) = ctx.upstream_headway(id, vehicle, &offsets) {
                        if distance <= offsets.max_distance {
                            found.push(DistanceVehicle { vehicle, distance });
                        }
                    }
                }
                None if -record.end_distance() + offsets.headway <= offsets.max_distance => {
                    next.extend_from_slice(record.prev());
                }
                None => {}
            }
        }
        current = next;
    }
    unique_sorted(found)
}

/// Moves upstream from `id` until the search position lies on the record,
/// or the structure ends.
fn align_upstream(structure: &LaneStructure, id: RecordId, dx: f64, out: &mut Vec<RecordId>) {
    let record = structure.record(id);
    if -record.start_distance() + dx < 0.0 && !record.prev().is_empty() {
        for prev in record.prev() {
            align_upstream(structure, *prev, dx, out);
        }
    } else if !out.contains(&id) {
        out.push(id);
    }
}

/// Moves downstream from `id` until the search position lies on the record,
/// or the structure ends.
fn align_downstream(structure: &LaneStructure, id: RecordId, dx: f64, out: &mut Vec<RecordId>) {
    let record = structure.record(id);
    if -record.start_distance() + dx > record.length() && !record.next().is_empty() {
        for next in record.next() {
            align_downstream(structure, *next, dx, out);
        }
    } else if !out.contains(&id) {
        out.push(id);
    }
}

/// Removes duplicate vehicles, keeping the smallest distance, and sorts by distance.
/// Equal distances are ordered by vehicle.
fn unique_sorted(found: Vec<DistanceVehicle>) -> Vec<DistanceVehicle> {
    let mut nearest = HashMap::<VehicleId, f64>::new();
    for dv in found {
        nearest
            .entry(dv.vehicle)
            .and_modify(|d| *d = d.min(dv.distance))
            .or_insert(dv.distance);
    }
    nearest
        .into_iter()
        .map(|(vehicle, distance)| DistanceVehicle { vehicle, distance })
        .sorted_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.vehicle.cmp(&b.vehicle))
        })
        .collect()
}

#[derive(Clone, Copy, Debug)]
enum Entry {
    Record(RecordId),
    Vehicle(DistanceVehicle),
}

/// An entry in the search frontier. `key` is a lower bound on the headway
/// of any vehicle found through the entry.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    key: f64,
    seq: usize,
    entry: Entry,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reversed, so the max-heap pops the smallest key first.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// An incremental search for all vehicles on a lane in one direction, in
/// order of increasing headway.
///
/// Records are expanded only when their lower bound is reached, so taking the
/// first few results only visits the records near the perceiving vehicle.
#[derive(Clone, Debug)]
pub(crate) struct NeighborSearch {
    frontier: BinaryHeap<Candidate>,
    expanded: HashSet<RecordId>,
    seen: HashSet<VehicleId>,
    downstream: bool,
    offsets: SearchOffsets,
    seq: usize,
}

impl NeighborSearch {
    pub fn new(root: RecordId, downstream: bool, offsets: SearchOffsets) -> Self {
        let mut search = Self {
            frontier: BinaryHeap::new(),
            expanded: HashSet::new(),
            seen: HashSet::new(),
            downstream,
            offsets,
            seq: 0,
        };
        search.push(f64::NEG_INFINITY, Entry::Record(root));
        search
    }

    /// Finds the next nearest vehicle, or `None` if there are no more within range.
    pub fn next(&mut self, ctx: &SearchContext) -> Option<DistanceVehicle> {
        while let Some(candidate) = self.frontier.pop() {
            if candidate.key > self.offsets.max_distance {
                self.frontier.clear();
                break;
            }
            match candidate.entry {
                Entry::Vehicle(dv) => {
                    if self.seen.insert(dv.vehicle) {
                        return Some(dv);
                    }
                }
                Entry::Record(id) => self.expand(ctx, id),
            }
        }
        None
    }

    fn push(&mut self, key: f64, entry: Entry) {
        self.frontier.push(Candidate {
            key,
            seq: self.seq,
            entry,
        });
        self.seq += 1;
    }

    fn expand(&mut self, ctx: &SearchContext, id: RecordId) {
        if !self.expanded.insert(id) {
            return;
        }
        let record = ctx.structure.record(id);
        let link = &ctx.links[record.link()];
        let pos = -record.start_distance() + self.offsets.search;
        let offsets = self.offsets;

        if self.downstream {
            for (vehicle, _) in link
                .vehicle_positions(offsets.other, ctx.vehicles, Some(ctx.ego))
                .filter(|(_, p)| *p > pos)
            {
                if let Some(distance) = ctx.downstream_headway(id, vehicle, &offsets) {
                    self.push(distance, Entry::Vehicle(DistanceVehicle { vehicle, distance }));
                }
            }
            for next in record.next() {
                let next_record = ctx.structure.record(*next);
                let max_len = ctx.links[next_record.link()].max_vehicle_length(ctx.vehicles);
                let key = next_record.start_distance() - offsets.headway - max_len;
                self.push(key, Entry::Record(*next));
            }
        } else {
            for (vehicle, _) in link
                .vehicle_positions(offsets.other, ctx.vehicles, Some(ctx.ego))
                .filter(|(_, p)| *p < pos)
            {
                if let Some(distance) = ctx.upstream_headway(id, vehicle, &offsets) {
                    self.push(distance, Entry::Vehicle(DistanceVehicle { vehicle, distance }));
                }
            }
            for prev in record.prev() {
                let prev_record = ctx.structure.record(*prev);
                let max_len = ctx.links[prev_record.link()].max_vehicle_length(ctx.vehicles);
                let key = -prev_record.end_distance() - max_len + offsets.headway;
                self.push(key, Entry::Record(*prev));
            }
        }
    }
}
