//! Tests of neighbour perception on multi-lane networks.

use assert_approx_eq::assert_approx_eq;
use std::cell::Cell;
use std::ops::ControlFlow;
use traffic_perception::parameters::{SENSOR_RANGE, TR};
use traffic_perception::{
    Anticipation, Estimation, Kinematics, LateralDirection, LinkAttributes, LinkId, Parameters,
    ParameterError, PerceivedType, PerceptionCollector, PerceptionConfig, PerceptionError,
    Reference, RelativeLane, Simulation, Vehicle, VehicleAttributes, VehicleId, VehicleType,
};

fn car() -> VehicleAttributes {
    VehicleAttributes {
        vehicle_type: VehicleType::Car,
        width: 2.0,
        length: 4.0,
        parameters: Parameters::with_defaults(),
    }
}

fn add_link(sim: &mut Simulation, length: f64) -> LinkId {
    sim.add_link(&LinkAttributes {
        length,
        speed_limit: 20.0,
    })
}

/// A simulation that perceives exact current states.
fn exact_sim() -> Simulation {
    let mut sim = Simulation::new();
    sim.set_default_perception_config(PerceptionConfig {
        perceived_type: PerceivedType::Copy,
        ..Default::default()
    });
    sim
}

/// Two adjacent lanes; returns the left and right links.
fn two_lanes(sim: &mut Simulation, length: f64) -> (LinkId, LinkId) {
    let left = add_link(sim, length);
    let right = add_link(sim, length);
    sim.add_link_group(&[left, right]);
    (left, right)
}

#[test]
fn first_followers_on_every_merging_branch() {
    let mut sim = exact_sim();
    let (left, right) = two_lanes(&mut sim, 200.0);
    let merge_a = add_link(&mut sim, 100.0);
    let merge_b = add_link(&mut sim, 100.0);
    sim.add_link_connection(merge_a, left);
    sim.add_link_connection(merge_b, left);

    let ego = sim.add_vehicle(&car(), right, 50.0, 0.0);
    let a = sim.add_vehicle(&car(), merge_a, 60.0, 0.0);
    let b = sim.add_vehicle(&car(), merge_b, 80.0, 0.0);

    {
        let perception = sim.perception(ego).unwrap();
        let followers = perception
            .neighbors()
            .first_followers(LateralDirection::Left)
            .unwrap();
        assert_eq!(followers.len(), 2);
        assert_eq!(followers[0].id(), b);
        assert_approx_eq!(followers[0].distance(), 66.0);
        assert_eq!(followers[1].id(), a);
        assert_approx_eq!(followers[1].distance(), 86.0);
    }

    sim.remove_vehicle(b);
    let perception = sim.perception(ego).unwrap();
    let followers = perception
        .neighbors()
        .first_followers(LateralDirection::Left)
        .unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].id(), a);
}

#[test]
fn leaders_are_sorted_across_branches() {
    let mut sim = exact_sim();
    let start = add_link(&mut sim, 100.0);
    let branch_a = add_link(&mut sim, 100.0);
    let branch_b = add_link(&mut sim, 100.0);
    sim.add_link_connection(start, branch_a);
    sim.add_link_connection(start, branch_b);

    let ego = sim.add_vehicle(&car(), start, 10.0, 0.0);
    let near = sim.add_vehicle(&car(), start, 60.0, 0.0);
    let on_a = sim.add_vehicle(&car(), branch_a, 30.0, 0.0);
    let on_b = sim.add_vehicle(&car(), branch_b, 20.0, 0.0);

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    let ids: Vec<_> = leaders.iter().map(|v| v.id()).collect();
    assert_eq!(ids, vec![near, on_b, on_a]);
    let distances: Vec<_> = leaders.iter().map(|v| v.distance()).collect();
    assert_approx_eq!(distances[0], 46.0);
    assert_approx_eq!(distances[1], 106.0);
    assert_approx_eq!(distances[2], 116.0);

    // Iterating again does not search or perceive again
    let stats = perception.stats();
    let perceived = stats.perceived();
    assert_eq!(leaders.to_vec().len(), 3);
    assert_eq!(stats.perceived(), perceived);
}

#[test]
fn leaders_beyond_unequal_branches() {
    let mut sim = exact_sim();
    let start = add_link(&mut sim, 100.0);
    let long = add_link(&mut sim, 200.0);
    let short_a = add_link(&mut sim, 10.0);
    let short_b = add_link(&mut sim, 10.0);
    let merge = add_link(&mut sim, 100.0);
    sim.add_link_connection(start, long);
    sim.add_link_connection(long, merge);
    sim.add_link_connection(start, short_a);
    sim.add_link_connection(short_a, short_b);
    sim.add_link_connection(short_b, merge);

    let ego = sim.add_vehicle(&car(), start, 10.0, 0.0);
    let leader = sim.add_vehicle(&car(), merge, 50.0, 0.0);

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    assert_eq!(leaders.len(), 1);
    let first = leaders.first().unwrap();
    assert_eq!(first.id(), leader);
    assert_approx_eq!(first.distance(), 156.0);
}

#[test]
fn leaders_are_perceived_lazily() {
    let mut sim = exact_sim();
    let link = add_link(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), link, 10.0, 0.0);
    for pos in [50.0, 100.0, 150.0, 200.0] {
        sim.add_vehicle(&car(), link, pos, 0.0);
    }

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    assert_approx_eq!(leaders.first().unwrap().distance(), 36.0);
    assert_eq!(perception.stats().perceived(), 1);
    assert_eq!(leaders.len(), 4);
    assert_eq!(perception.stats().perceived(), 1);
}

#[test]
fn queries_are_cached_within_a_step() {
    let mut sim = Simulation::new();
    let (left, right) = two_lanes(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), right, 50.0, 10.0);
    sim.add_vehicle(&car(), left, 80.0, 10.0);
    sim.add_vehicle(&car(), right, 90.0, 10.0);

    {
        let perception = sim.perception(ego).unwrap();
        let neighbors = perception.neighbors();
        let first = neighbors.first_leaders(LateralDirection::Left).unwrap();
        neighbors.leaders(RelativeLane::CURRENT).unwrap().first();
        let searches = perception.stats().searches();
        let perceived = perception.stats().perceived();

        let again = neighbors.first_leaders(LateralDirection::Left).unwrap();
        assert!(std::rc::Rc::ptr_eq(&first, &again));
        neighbors.leaders(RelativeLane::CURRENT).unwrap().first();
        assert_eq!(perception.stats().searches(), searches);
        assert_eq!(perception.stats().perceived(), perceived);
        assert_eq!(perception.stats().structures(), 1);
    }

    sim.step(0.1);
    let perception = sim.perception(ego).unwrap();
    let searches = perception.stats().searches();
    perception
        .neighbors()
        .first_leaders(LateralDirection::Left)
        .unwrap();
    assert_eq!(perception.stats().searches(), searches + 1);
    assert_eq!(perception.stats().structures(), 2);
}

#[test]
fn headway_is_clamped() {
    let mut sim = Simulation::new();
    sim.set_default_perception_config(PerceptionConfig {
        perceived_type: PerceivedType::Delayed {
            estimation: Estimation::None,
            anticipation: Anticipation::ConstantSpeed,
        },
        ..Default::default()
    });
    let link = add_link(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), link, 50.0, 0.0);
    // Starts behind the ego vehicle and overtakes it from standstill
    let leader = sim.add_vehicle(&car(), link, 45.0, 0.0);
    sim.set_vehicle_acceleration(leader, 5.0);
    sim.set_vehicle_parameter(ego, &TR, 2.0).unwrap();
    for _ in 0..20 {
        sim.step(0.1);
    }
    assert_approx_eq!(sim.get_vehicle(leader).pos_mid(), 55.0);

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    let perceived = leaders.first().unwrap();
    assert_eq!(perceived.id(), leader);
    assert_approx_eq!(perceived.distance(), -8.0);
    assert!(perceived.is_parallel());
}

#[test]
fn parallel_neighbors_bypass_estimation() {
    let mut sim = Simulation::new();
    let (left, right) = two_lanes(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), right, 50.0, 10.0);
    let beside = sim.add_vehicle(&car(), left, 51.0, 12.0);

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::LEFT).unwrap();
    let perceived = leaders.first().unwrap();
    assert_eq!(perceived.id(), beside);
    assert_approx_eq!(perceived.distance(), -3.0);
    assert_approx_eq!(perceived.speed(), 12.0);
    match *perceived.kinematics() {
        Kinematics::Parallel {
            overlap_front,
            overlap,
            overlap_rear,
            ..
        } => {
            assert_approx_eq!(overlap_front, 1.0);
            assert_approx_eq!(overlap, 3.0);
            assert_approx_eq!(overlap_rear, -1.0);
        }
        other => panic!("expected parallel kinematics, got {:?}", other),
    }
    assert_eq!(perception.stats().perceived(), 1);
    assert_eq!(perception.stats().estimations(), 0);
}

#[test]
fn vehicle_alongside() {
    let mut sim = exact_sim();
    let (left, right) = two_lanes(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), right, 50.0, 0.0);
    sim.add_vehicle(&car(), left, 47.0, 0.0);

    let perception = sim.perception(ego).unwrap();
    let neighbors = perception.neighbors();
    assert_eq!(neighbors.is_vehicle_alongside(LateralDirection::Left), Ok(true));
    assert_eq!(
        neighbors.is_vehicle_alongside(LateralDirection::Right),
        Err(PerceptionError::LaneNotPerceived(RelativeLane::RIGHT))
    );
    assert_eq!(
        neighbors.is_vehicle_alongside(LateralDirection::None),
        Err(PerceptionError::NoneDirection)
    );
    assert!(matches!(
        neighbors.first_leaders(LateralDirection::None),
        Err(PerceptionError::NoneDirection)
    ));
}

#[test]
fn no_vehicle_alongside() {
    let mut sim = exact_sim();
    let (left, right) = two_lanes(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), right, 50.0, 0.0);
    sim.add_vehicle(&car(), left, 56.0, 0.0);
    sim.add_vehicle(&car(), left, 44.0, 0.0);

    let perception = sim.perception(ego).unwrap();
    assert_eq!(
        perception.neighbors().is_vehicle_alongside(LateralDirection::Left),
        Ok(false)
    );
}

#[test]
fn lane_change_invalidates_perception() {
    let mut sim = exact_sim();
    let (left, right) = two_lanes(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), right, 50.0, 0.0);
    let ahead = sim.add_vehicle(&car(), left, 80.0, 0.0);

    {
        let perception = sim.perception(ego).unwrap();
        let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
        assert!(leaders.is_empty());
        let lanes = perception.infrastructure().cross_section().unwrap();
        assert_eq!(lanes.as_slice(), &[RelativeLane::LEFT, RelativeLane::CURRENT]);
    }

    assert!(sim.do_lane_change(ego, LateralDirection::Left));
    assert!(!sim.do_lane_change(ego, LateralDirection::Left));
    assert_eq!(sim.get_vehicle(ego).link_id(), Some(left));

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    assert_eq!(leaders.first().map(|v| v.id()), Some(ahead));
    let lanes = perception.infrastructure().cross_section().unwrap();
    assert_eq!(lanes.as_slice(), &[RelativeLane::CURRENT, RelativeLane::RIGHT]);
}

/// Counts the neighbours it sees, stopping after `limit`.
struct Counting {
    limit: usize,
    calls: Cell<usize>,
}

impl PerceptionCollector for Counting {
    type Intermediate = Vec<VehicleId>;
    type Output = Vec<VehicleId>;

    fn init(&self) -> Self::Intermediate {
        vec![]
    }

    fn accumulate(
        &self,
        mut intermediate: Self::Intermediate,
        vehicle: &Vehicle,
        _distance: f64,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate> {
        self.calls.set(self.calls.get() + 1);
        intermediate.push(vehicle.id());
        if intermediate.len() >= self.limit {
            ControlFlow::Break(intermediate)
        } else {
            ControlFlow::Continue(intermediate)
        }
    }

    fn finalize(&self, intermediate: Self::Intermediate) -> Self::Output {
        intermediate
    }
}

#[test]
fn collector_short_circuits() {
    let mut sim = Simulation::new();
    let link = add_link(&mut sim, 500.0);
    let ego = sim.add_vehicle(&car(), link, 10.0, 0.0);
    let first = sim.add_vehicle(&car(), link, 30.0, 0.0);
    let second = sim.add_vehicle(&car(), link, 60.0, 0.0);
    sim.add_vehicle(&car(), link, 90.0, 0.0);

    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    let collector = Counting {
        limit: 2,
        calls: Cell::new(0),
    };
    assert_eq!(leaders.collect(&collector), vec![first, second]);
    assert_eq!(collector.calls.get(), 2);
    // Collecting does not perceive
    assert_eq!(perception.stats().perceived(), 0);
}

#[test]
fn longitudinal_control_leaders() {
    let mut sim = Simulation::new();
    let link = add_link(&mut sim, 1000.0);
    let ego = sim.add_vehicle(&car(), link, 10.0, 10.0);
    let near = sim.add_vehicle(&car(), link, 50.0, 12.0);
    let far = sim.add_vehicle(&car(), link, 250.0, 8.0);

    let perception = sim.perception(ego).unwrap();
    let longitudinal = perception.longitudinal();
    let acc_leader = longitudinal.acc_leader().unwrap().unwrap();
    assert_eq!(acc_leader.id(), near);

    let cacc = longitudinal.cacc_leaders(5).unwrap();
    assert_eq!(cacc.len(), 2);
    assert_eq!(cacc[1].id(), far);
    assert_approx_eq!(cacc[1].distance(), 236.0);
    assert_approx_eq!(cacc[1].speed(), 8.0);
    assert!(longitudinal.cacc_leaders(0).unwrap().is_empty());

    sim.remove_vehicle(near);
    sim.set_vehicle_parameter(ego, &SENSOR_RANGE, 100.0).unwrap();
    let perception = sim.perception(ego).unwrap();
    assert!(perception.longitudinal().acc_leader().unwrap().is_none());
}

#[test]
fn erroneous_perception_is_reproducible() {
    fn run() -> Vec<f64> {
        let mut sim = Simulation::new();
        sim.set_default_perception_config(PerceptionConfig {
            perceived_type: PerceivedType::Delayed {
                estimation: Estimation::Erroneous,
                anticipation: Anticipation::ConstantSpeed,
            },
            seed: 7,
            ..Default::default()
        });
        let link = add_link(&mut sim, 1000.0);
        let ego = sim.add_vehicle(&car(), link, 10.0, 10.0);
        sim.add_vehicle(&car(), link, 60.0, 10.0);

        let mut distances = vec![];
        for _ in 0..10 {
            sim.step(0.5);
            let perception = sim.perception(ego).unwrap();
            let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
            distances.push(leaders.first().unwrap().distance());
        }
        distances
    }

    let distances = run();
    assert_eq!(distances, run());
    assert!(distances.iter().all(|d| d.is_finite()));
}

#[test]
fn missing_reaction_time() {
    let mut parameters = Parameters::with_defaults();
    parameters.reset(&TR);
    let attributes = VehicleAttributes {
        parameters,
        ..car()
    };

    let mut sim = Simulation::new();
    let link = add_link(&mut sim, 500.0);
    let ego = sim.add_vehicle(&attributes, link, 10.0, 0.0);
    sim.add_vehicle(&car(), link, 50.0, 0.0);

    {
        let perception = sim.perception(ego).unwrap();
        let result = perception.neighbors().leaders(RelativeLane::CURRENT);
        assert!(matches!(
            result,
            Err(PerceptionError::Parameter(ParameterError::Missing("tr")))
        ));
        assert!(perception.reaction_window().is_err());
        // Other queries are unaffected
        assert_eq!(
            perception.infrastructure().cross_section().unwrap().as_slice(),
            &[RelativeLane::CURRENT]
        );
    }

    // Communicated states need no reaction time
    sim.set_perception_config(
        ego,
        PerceptionConfig {
            perceived_type: PerceivedType::Copy,
            ..Default::default()
        },
    );
    let perception = sim.perception(ego).unwrap();
    let leaders = perception.neighbors().leaders(RelativeLane::CURRENT).unwrap();
    assert_approx_eq!(leaders.first().unwrap().distance(), 36.0);
}

#[test]
fn delayed_instant_never_moves_back() {
    let mut sim = Simulation::new();
    let link = add_link(&mut sim, 1000.0);
    let ego = sim.add_vehicle(&car(), link, 10.0, 10.0);
    for _ in 0..10 {
        sim.step(0.1);
    }
    let when = sim.perception(ego).unwrap().reaction_window().unwrap().when();
    assert_approx_eq!(when, 0.5);

    sim.set_vehicle_parameter(ego, &TR, 3.0).unwrap();
    sim.step(0.1);
    let window = sim.perception(ego).unwrap().reaction_window().unwrap();
    assert_approx_eq!(window.when(), 0.5);
    assert_approx_eq!(window.reaction_time(), 0.6);
}

#[test]
fn static_reference() {
    let mut sim = Simulation::new();
    let link = add_link(&mut sim, 1000.0);
    let ego = sim.add_vehicle(&car(), link, 10.0, 0.0);
    let other = sim.add_vehicle(&car(), link, 100.0, 10.0);
    for _ in 0..10 {
        sim.step(0.1);
    }

    // Headway to a stop line 30 m ahead of the approaching vehicle
    let perception = sim.perception(ego).unwrap();
    let perceived = perception
        .perceive(other, 30.0, false, Reference::Static { length: 0.0 })
        .unwrap();
    assert_approx_eq!(perceived.distance(), 30.0);
    assert_approx_eq!(perceived.speed(), 10.0);
    assert!(matches!(perceived.kinematics(), Kinematics::Behind { .. }));
}

#[test]
fn infrastructure() {
    let mut sim = Simulation::new();
    let first = add_link(&mut sim, 100.0);
    let last = add_link(&mut sim, 100.0);
    sim.add_link_connection(first, last);
    let ego = sim.add_vehicle(&car(), first, 50.0, 0.0);

    let perception = sim.perception(ego).unwrap();
    let infrastructure = perception.infrastructure();
    assert_approx_eq!(infrastructure.lane_end(RelativeLane::CURRENT).unwrap().unwrap(), 148.0);
    assert_approx_eq!(infrastructure.speed_limit(RelativeLane::CURRENT).unwrap(), 20.0);
    assert_eq!(
        infrastructure.lane_end(RelativeLane::LEFT),
        Err(PerceptionError::LaneNotPerceived(RelativeLane::LEFT))
    );

    let beyond = add_link(&mut sim, 500.0);
    sim.add_link_connection(last, beyond);
    let onwards = add_link(&mut sim, 500.0);
    sim.add_link_connection(beyond, onwards);
    let other = sim.add_vehicle(&car(), first, 10.0, 0.0);
    let perception = sim.perception(other).unwrap();
    assert_eq!(perception.infrastructure().lane_end(RelativeLane::CURRENT), Ok(None));
}
