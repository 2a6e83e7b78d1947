use std::f64::consts::TAU;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{Accuracy, FixError, PositionSource};
use crate::geo;
use crate::hash::draw;
use crate::model::{Coordinate, Fix};

/// Largest heading change per step, radians
const MAX_TURN: f64 = 0.8;

struct Walk {
    position: Coordinate,
    heading: f64,
    tick: u64,
}

/// A deterministic random walk, standing in for a GPS receiver.
///
/// Every request advances the walk by one step. A `failure_ratio` share of
/// requests fail with [FixError::Unavailable] to exercise the sampler's
/// tolerance for dropouts.
pub struct SimulatedSource {
    walk: Mutex<Walk>,
    step_m: f64,
    failure_ratio: f64,
    seed: u64,
}

impl SimulatedSource {
    pub fn new(start: Coordinate, step_m: f64, failure_ratio: f64, seed: u64) -> Self {
        Self {
            walk: Mutex::new(Walk {
                position: start,
                heading: draw(seed, 0, 0) * TAU,
                tick: 0,
            }),
            step_m: step_m.max(0.0),
            failure_ratio: failure_ratio.clamp(0.0, 1.0),
            seed,
        }
    }

    fn step(&self, accuracy: Accuracy) -> Result<Fix, FixError> {
        let mut walk = self.walk.lock().unwrap_or_else(PoisonError::into_inner);
        walk.tick += 1;
        let tick = walk.tick;

        if draw(self.seed, tick, 1) < self.failure_ratio {
            return Err(FixError::Unavailable("simulated signal loss".into()));
        }

        walk.heading = (walk.heading + (draw(self.seed, tick, 2) - 0.5) * 2.0 * MAX_TURN).rem_euclid(TAU);
        let distance_km = self.step_m * (0.5 + draw(self.seed, tick, 3)) / 1000.0;
        let (lat, lon) = geo::offset(walk.position.lat, walk.position.lon, distance_km, walk.heading);
        walk.position = Coordinate::new(lat, lon);

        let base_accuracy = match accuracy {
            Accuracy::Best => 3.0,
            Accuracy::Balanced => 15.0,
            Accuracy::Coarse => 100.0,
        };
        let accuracy_m = base_accuracy * (1.0 + 3.0 * draw(self.seed, tick, 4));

        Ok(Fix::new(lat, lon, Some(accuracy_m)))
    }
}

impl PositionSource for SimulatedSource {
    fn get_fix(
        &self,
        accuracy: Accuracy,
        _timeout: Duration,
    ) -> impl Future<Output = Result<Fix, FixError>> + Send {
        let res = self.step(accuracy);
        async move { res }
    }
}
