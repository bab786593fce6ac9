//! Shared spatial/kinematic data model used by both the Track Manager and
//! the Threat Assessor.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Geodetic position: latitude/longitude in degrees, altitude in meters
/// above ground level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self { latitude, longitude, altitude }
    }

    /// Range check only; altitude is unconstrained (AGL can be negative in
    /// terrain-following scenarios).
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoreError::InvalidPosition { latitude: self.latitude, longitude: self.longitude })
        }
    }
}

/// NED-frame velocity in meters/second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityVector {
    pub north: f64,
    pub east: f64,
    pub down: f64,
}

impl VelocityVector {
    pub fn new(north: f64, east: f64, down: f64) -> Self {
        Self { north, east, down }
    }

    pub fn speed(&self) -> f64 {
        (self.north * self.north + self.east * self.east + self.down * self.down).sqrt()
    }

    /// Degrees from true north, normalized to `[0, 360)`.
    pub fn heading(&self) -> f64 {
        let mut hdg = self.east.atan2(self.north).to_degrees();
        if hdg < 0.0 {
            hdg += 360.0;
        }
        hdg
    }

    pub fn climb_rate(&self) -> f64 {
        -self.down
    }
}

/// Pixel rectangle associating a track with a video frame. Opaque to the
/// core beyond validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub camera_id: String,
    pub timestamp_ms: i64,
}

impl BoundingBox {
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Which sensor modality produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionSource {
    Radar,
    RfDetector,
    Camera,
    Combined,
    Manual,
}

/// Track classification. `Unknown` doubles as "no opinion" / "rule does
/// not wish to force a classification".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackClassification {
    #[default]
    Unknown,
    Friendly,
    Hostile,
    Pending,
    Neutral,
}

/// Track lifecycle state. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackState {
    #[default]
    Initiated,
    Active,
    Coasting,
    Dropped,
}

/// A single sensor report handed to the Track Manager. `metadata` is
/// stored verbatim and never interpreted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub sensor_id: String,
    pub position: GeoPosition,
    pub velocity: Option<VelocityVector>,
    pub signal_strength: Option<f64>,
    pub confidence: f64,
    pub timestamp_ms: i64,
    pub source: DetectionSource,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_validity() {
        assert!(GeoPosition::new(34.05, -118.24, 100.0).is_valid());
        assert!(!GeoPosition::new(91.0, 0.0, 0.0).is_valid());
        assert!(!GeoPosition::new(0.0, -181.0, 0.0).is_valid());
    }

    #[test]
    fn velocity_derived_scalars() {
        let v = VelocityVector::new(3.0, 4.0, -2.0);
        assert!((v.speed() - 29.0_f64.sqrt()).abs() < 1e-9);
        assert!((v.heading() - 53.13010235).abs() < 1e-5);
        assert_eq!(v.climb_rate(), 2.0);
    }

    #[test]
    fn heading_wraps_into_0_360() {
        let v = VelocityVector::new(-1.0, -1.0, 0.0);
        assert!(v.heading() >= 0.0 && v.heading() < 360.0);
    }
}
