use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Convenience alias for UTC timestamps
pub type UtcDT = DateTime<Utc>;

/// Current time truncated to the microsecond precision the store keeps
pub fn now_micros() -> UtcDT {
    Utc::now().trunc_subsecs(6)
}

/// A geographic coordinate in signed degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A single reported position from a [crate::tracking::PositionSource]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius, absent when the provider doesn't report one
    pub accuracy_meters: Option<f64>,
}

impl Fix {
    pub fn new(lat: f64, lon: f64, accuracy_meters: Option<f64>) -> Self {
        Self {
            coordinate: Coordinate::new(lat, lon),
            accuracy_meters: accuracy_meters.filter(|a| a.is_finite() && *a >= 0.0),
        }
    }
}

/// A sample that has been accepted by the sampler but not yet persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewSample {
    pub coordinate: Coordinate,
    pub accuracy_meters: Option<f64>,
    pub timestamp: UtcDT,
}

impl NewSample {
    pub fn from_fix(fix: Fix, timestamp: UtcDT) -> Self {
        Self {
            coordinate: fix.coordinate,
            accuracy_meters: fix.accuracy_meters,
            timestamp,
        }
    }

    /// Attach the id the store assigned on insert
    pub fn with_id(self, id: i64) -> PositionSample {
        PositionSample {
            id,
            lat: self.coordinate.lat,
            lon: self.coordinate.lon,
            accuracy_meters: self.accuracy_meters,
            timestamp: self.timestamp,
        }
    }
}

/// A persisted position sample. Immutable once stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub accuracy_meters: Option<f64>,
    pub timestamp: UtcDT,
}

impl PositionSample {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}
