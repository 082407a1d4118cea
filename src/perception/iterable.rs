use super::perceived::{PerceivedType, PerceivedVehicle};
use super::reaction::ReactionWindow;
use super::search::{DistanceVehicle, NeighborSearch};
use super::structure::LaneStructure;
use super::Perception;
use crate::Vehicle;
use std::cell::RefCell;
use std::ops::ControlFlow;
use std::rc::Rc;

/// Accumulates a result from neighbours in order of increasing distance,
/// without perceiving them.
///
/// Returning [ControlFlow::Break] from `accumulate` stops the search, so
/// neighbours beyond the last one needed are never searched for.
pub trait PerceptionCollector {
    type Intermediate;
    type Output;

    fn init(&self) -> Self::Intermediate;

    fn accumulate(
        &self,
        intermediate: Self::Intermediate,
        vehicle: &Vehicle,
        distance: f64,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate>;

    fn finalize(&self, intermediate: Self::Intermediate) -> Self::Output;
}

/// The shared state of a lazily evaluated set of neighbours: the search,
/// and the prefix of its results found and perceived so far.
pub(crate) struct LazyNeighbors {
    structure: Rc<LaneStructure>,
    search: RefCell<NeighborSearch>,
    found: RefCell<Vec<DistanceVehicle>>,
    perceived: RefCell<Vec<Rc<PerceivedVehicle>>>,
    downstream: bool,
    perceived_type: PerceivedType,
    window: Option<ReactionWindow>,
}

impl LazyNeighbors {
    pub fn new(
        structure: Rc<LaneStructure>,
        search: NeighborSearch,
        downstream: bool,
        perceived_type: PerceivedType,
        window: Option<ReactionWindow>,
    ) -> Self {
        Self {
            structure,
            search: RefCell::new(search),
            found: RefCell::new(vec![]),
            perceived: RefCell::new(vec![]),
            downstream,
            perceived_type,
            window,
        }
    }

    /// The `idx`th nearest neighbour, advancing the search as needed.
    fn raw(&self, idx: usize, perception: &Perception) -> Option<DistanceVehicle> {
        let mut found = self.found.borrow_mut();
        if idx >= found.len() {
            let ctx = perception.search_context(&self.structure);
            let mut search = self.search.borrow_mut();
            while found.len() <= idx {
                match search.next(&ctx) {
                    Some(dv) => found.push(dv),
                    None => break,
                }
            }
        }
        found.get(idx).copied()
    }

    /// The `idx`th nearest neighbour, perceived.
    fn get(&self, idx: usize, perception: &Perception) -> Option<Rc<PerceivedVehicle>> {
        if let Some(vehicle) = self.perceived.borrow().get(idx) {
            return Some(vehicle.clone());
        }
        self.raw(idx, perception)?;
        let found = self.found.borrow();
        let mut perceived = self.perceived.borrow_mut();
        while perceived.len() <= idx {
            let dv = found[perceived.len()];
            let vehicle = perception.perceive_found(
                self.perceived_type,
                self.window,
                dv,
                self.downstream,
            );
            perceived.push(vehicle);
        }
        perceived.get(idx).cloned()
    }
}

/// A lazily evaluated set of neighbours, in order of increasing distance.
///
/// Neighbours are searched for and perceived only as they are requested,
/// and only once per time step however often the set is iterated.
#[derive(Clone)]
pub struct Neighbors<'s> {
    lazy: Rc<LazyNeighbors>,
    perception: Perception<'s>,
}

impl<'s> Neighbors<'s> {
    pub(crate) fn new(lazy: Rc<LazyNeighbors>, perception: Perception<'s>) -> Self {
        Self { lazy, perception }
    }

    /// The nearest neighbour.
    pub fn first(&self) -> Option<Rc<PerceivedVehicle>> {
        self.lazy.get(0, &self.perception)
    }

    pub fn is_empty(&self) -> bool {
        self.lazy.raw(0, &self.perception).is_none()
    }

    /// The number of neighbours. This completes the search.
    pub fn len(&self) -> usize {
        self.iter_raw().count()
    }

    pub fn iter(&self) -> NeighborsIter<'_, 's> {
        NeighborsIter {
            neighbors: self,
            idx: 0,
        }
    }

    /// All neighbours, perceived.
    pub fn to_vec(&self) -> Vec<Rc<PerceivedVehicle>> {
        self.iter().collect()
    }

    /// Accumulates a result over the neighbours using their actual distances,
    /// stopping as soon as the collector breaks.
    pub fn collect<C: PerceptionCollector>(&self, collector: &C) -> C::Output {
        let mut intermediate = collector.init();
        for dv in self.iter_raw() {
            let vehicle = &self.perception.vehicles[dv.vehicle];
            match collector.accumulate(intermediate, vehicle, dv.distance) {
                ControlFlow::Continue(next) => intermediate = next,
                ControlFlow::Break(last) => {
                    intermediate = last;
                    break;
                }
            }
        }
        collector.finalize(intermediate)
    }

    fn iter_raw(&self) -> impl Iterator<Item = DistanceVehicle> + '_ {
        (0..).map_while(|idx| self.lazy.raw(idx, &self.perception))
    }
}

impl<'a, 's> IntoIterator for &'a Neighbors<'s> {
    type Item = Rc<PerceivedVehicle>;
    type IntoIter = NeighborsIter<'a, 's>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over [Neighbors].
pub struct NeighborsIter<'a, 's> {
    neighbors: &'a Neighbors<'s>,
    idx: usize,
}

impl<'a, 's> Iterator for NeighborsIter<'a, 's> {
    type Item = Rc<PerceivedVehicle>;

    fn next(&mut self) -> Option<Self::Item> {
        let vehicle = self.neighbors.lazy.get(self.idx, &self.neighbors.perception)?;
        self.idx += 1;
        Some(vehicle)
    }
}
