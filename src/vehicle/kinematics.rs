use std::collections::VecDeque;

/// How long kinematic history is retained, in s.
const HISTORY_SEC: f64 = 10.0;

/// Advances a vehicle at constant acceleration for `dt` seconds, stopping
/// rather than reversing. Returns the distance travelled and the final velocity.
pub fn advance(vel: f64, acc: f64, dt: f64) -> (f64, f64) {
    if acc < 0.0 && vel + acc * dt < 0.0 {
        let t = -vel / acc;
        (0.5 * vel * t, 0.0)
    } else {
        (vel * dt + 0.5 * acc * dt * dt, vel + acc * dt)
    }
}

/// The kinematic state of a vehicle at an instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KinematicState {
    /// The simulation time in s.
    pub time: f64,
    pub odometer: f64,
    pub vel: f64,
    /// The acceleration applied from `time` until the next state.
    pub acc: f64,
}

/// A bounded record of past kinematic states.
#[derive(Clone, Debug)]
pub struct KinematicHistory {
    states: VecDeque<KinematicState>,
}

impl KinematicHistory {
    pub fn new(now: f64, vel: f64) -> Self {
        let mut states = VecDeque::new();
        states.push_back(KinematicState {
            time: now,
            odometer: 0.0,
            vel,
            acc: 0.0,
        });
        Self { states }
    }

    /// Records the state at time `now` and forgets states that are too old.
    pub fn push(&mut self, now: f64, odometer: f64, vel: f64, acc: f64) {
        self.states.push_back(KinematicState {
            time: now,
            odometer,
            vel,
            acc,
        });
        while self.states.len() > 1 && self.states[1].time <= now - HISTORY_SEC {
            self.states.pop_front();
        }
    }

    /// Changes the acceleration applied from `now` onwards.
    pub fn set_acc(&mut self, acc: f64, now: f64) {
        match self.states.back_mut() {
            Some(last) if last.time >= now => last.acc = acc,
            Some(last) => {
                let last = *last;
                let (dist, vel) = advance(last.vel, last.acc, now - last.time);
                self.push(now, last.odometer + dist, vel, acc);
            }
            None => unreachable!("history is never empty"),
        }
    }

    /// The state at time `t`. Times before the retained history
    /// resolve to the oldest known state.
    pub fn state_at(&self, t: f64) -> KinematicState {
        let idx = self.states.partition_point(|s| s.time <= t);
        if idx == 0 {
            return self.states[0];
        }
        let s = self.states[idx - 1];
        let (dist, vel) = advance(s.vel, s.acc, t - s.time);
        KinematicState {
            time: t,
            odometer: s.odometer + dist,
            vel,
            acc: s.acc,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn advance_stops() {
        let (dist, vel) = advance(10.0, -2.0, 10.0);
        assert_approx_eq!(dist, 25.0);
        assert_approx_eq!(vel, 0.0);

        let (dist, vel) = advance(10.0, 1.0, 2.0);
        assert_approx_eq!(dist, 22.0);
        assert_approx_eq!(vel, 12.0);
    }

    #[test]
    fn interpolates_history() {
        let mut history = KinematicHistory::new(0.0, 10.0);
        history.set_acc(2.0, 0.0);
        history.push(1.0, 11.0, 12.0, 2.0);
        history.set_acc(0.0, 1.0);
        history.push(2.0, 23.0, 12.0, 0.0);

        let state = history.state_at(0.5);
        assert_approx_eq!(state.odometer, 5.25);
        assert_approx_eq!(state.vel, 11.0);
        assert_approx_eq!(state.acc, 2.0);

        let state = history.state_at(1.5);
        assert_approx_eq!(state.odometer, 17.0);
        assert_approx_eq!(state.acc, 0.0);

        // Before the history starts
        assert_approx_eq!(history.state_at(-3.0).odometer, 0.0);
    }

    #[test]
    fn forgets_old_states() {
        let mut history = KinematicHistory::new(0.0, 0.0);
        for i in 1..=200 {
            history.push(0.1 * i as f64, 0.0, 0.0, 0.0);
        }
        assert!(history.states.len() < 110);
        assert!(history.states[0].time <= 10.0 + 1e-9);
    }
}
