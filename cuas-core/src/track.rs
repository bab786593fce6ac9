//! The central mutable entity: one airborne object fused from one or more
//! detections over time.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use chrono::Utc;

use crate::geo;
use crate::model::{
    BoundingBox, DetectionSource, GeoPosition, TrackClassification, TrackState, VelocityVector,
};

/// Bound on retained position-history samples (matches the original
/// implementation's `MAX_HISTORY_SIZE`).
pub const MAX_HISTORY_SIZE: usize = 100;

/// A change produced by a `Track` mutation, for the owning Track Manager
/// to translate into a bus event. `Track` never holds a reference to the
/// event bus itself -- see the module docs on why observers only ever see
/// an id, never a back-pointer into the track store.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackChange {
    PositionChanged,
    VelocityChanged,
    ClassificationChanged(TrackClassification),
    ThreatLevelChanged(i32, i32),
    StateChanged(TrackState),
    BoundingBoxChanged,
    /// Coalesced catch-all, always emitted alongside a more specific
    /// change.
    Updated,
}

#[derive(Debug, Clone)]
pub struct Track {
    track_id: String,
    position: GeoPosition,
    velocity: VelocityVector,
    classification: TrackClassification,
    classification_confidence: f64,
    threat_level: i32,
    state: TrackState,
    coast_count: u32,
    detection_sources: HashSet<DetectionSource>,

    created_time_ms: i64,
    last_update_time_ms: i64,
    /// Monotonic instant of the last genuine sensor detection. Distinct
    /// from `last_update_time_ms`, which also advances on assessor
    /// writebacks -- lifecycle decisions must use this field, not the
    /// wall-clock one, so a chatty assessor cannot itself keep a track
    /// out of `Coasting`.
    last_detection_instant: Instant,
    created_instant: Instant,

    associated_camera_id: Option<String>,
    visually_tracked: bool,
    bounding_box: Option<BoundingBox>,

    track_quality: f64,
    position_history: VecDeque<(GeoPosition, i64)>,
}

impl Track {
    pub fn new(track_id: impl Into<String>, position: GeoPosition, timestamp_ms: i64) -> Self {
        let now = Instant::now();
        Self {
            track_id: track_id.into(),
            position,
            velocity: VelocityVector::default(),
            classification: TrackClassification::default(),
            classification_confidence: 0.0,
            threat_level: 1,
            state: TrackState::default(),
            coast_count: 0,
            detection_sources: HashSet::new(),
            created_time_ms: timestamp_ms,
            last_update_time_ms: timestamp_ms,
            last_detection_instant: now,
            created_instant: now,
            associated_camera_id: None,
            visually_tracked: false,
            bounding_box: None,
            track_quality: 1.0,
            position_history: VecDeque::new(),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn position(&self) -> GeoPosition {
        self.position
    }

    pub fn velocity(&self) -> VelocityVector {
        self.velocity
    }

    pub fn classification(&self) -> TrackClassification {
        self.classification
    }

    pub fn classification_confidence(&self) -> f64 {
        self.classification_confidence
    }

    pub fn threat_level(&self) -> i32 {
        self.threat_level
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn coast_count(&self) -> u32 {
        self.coast_count
    }

    pub fn detection_sources(&self) -> &HashSet<DetectionSource> {
        &self.detection_sources
    }

    pub fn has_source(&self, source: DetectionSource) -> bool {
        self.detection_sources.contains(&source)
    }

    pub fn created_time_ms(&self) -> i64 {
        self.created_time_ms
    }

    pub fn last_update_time_ms(&self) -> i64 {
        self.last_update_time_ms
    }

    pub fn track_age(&self) -> std::time::Duration {
        self.created_instant.elapsed()
    }

    /// Time since the last genuine sensor detection (not assessor
    /// bookkeeping). What the lifecycle tick acts on.
    pub fn time_since_detection(&self) -> std::time::Duration {
        self.last_detection_instant.elapsed()
    }

    pub fn associated_camera_id(&self) -> Option<&str> {
        self.associated_camera_id.as_deref()
    }

    pub fn is_visually_tracked(&self) -> bool {
        self.visually_tracked
    }

    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.bounding_box.as_ref()
    }

    pub fn track_quality(&self) -> f64 {
        self.track_quality
    }

    pub fn position_history(&self) -> &VecDeque<(GeoPosition, i64)> {
        &self.position_history
    }

    fn touch(&mut self) {
        self.last_update_time_ms = Utc::now().timestamp_millis();
    }

    /// Records that a genuine detection (not an assessor writeback) was
    /// just applied. Resets the coasting counter.
    fn touch_detection(&mut self) {
        self.last_detection_instant = Instant::now();
        self.coast_count = 0;
        self.touch();
    }

    pub fn set_position(&mut self, pos: GeoPosition) -> Vec<TrackChange> {
        self.position = pos;
        self.touch();
        vec![TrackChange::PositionChanged, TrackChange::Updated]
    }

    pub fn set_velocity(&mut self, vel: VelocityVector) -> Vec<TrackChange> {
        self.velocity = vel;
        self.touch();
        vec![TrackChange::VelocityChanged, TrackChange::Updated]
    }

    /// Does not alter `classification_confidence`; callers that want a
    /// confidence-bearing change should set both explicitly.
    pub fn set_classification(&mut self, cls: TrackClassification) -> Vec<TrackChange> {
        if self.classification == cls {
            return Vec::new();
        }
        self.classification = cls;
        self.touch();
        vec![TrackChange::ClassificationChanged(cls), TrackChange::Updated]
    }

    pub fn set_classification_confidence(&mut self, confidence: f64) {
        self.classification_confidence = confidence.clamp(0.0, 1.0);
        self.touch();
    }

    pub fn set_threat_level(&mut self, level: i32) -> Vec<TrackChange> {
        let clamped = level.clamp(1, 5);
        if self.threat_level == clamped {
            return Vec::new();
        }
        let old = self.threat_level;
        self.threat_level = clamped;
        self.touch();
        vec![TrackChange::ThreatLevelChanged(old, clamped), TrackChange::Updated]
    }

    /// One-way lifecycle transition. Callers are responsible for only
    /// requesting forward transitions; this does not itself enforce
    /// ordering, since the Track Manager already drives transitions
    /// through its own state machine.
    pub fn set_state(&mut self, state: TrackState) -> Vec<TrackChange> {
        if self.state == state {
            return Vec::new();
        }
        self.state = state;
        self.touch();
        vec![TrackChange::StateChanged(state), TrackChange::Updated]
    }

    pub fn set_associated_camera_id(&mut self, camera_id: impl Into<String>) -> Vec<TrackChange> {
        self.associated_camera_id = Some(camera_id.into());
        self.touch();
        vec![TrackChange::Updated]
    }

    pub fn set_visually_tracked(&mut self, tracked: bool) -> Vec<TrackChange> {
        self.visually_tracked = tracked;
        self.touch();
        vec![TrackChange::Updated]
    }

    pub fn set_bounding_box(&mut self, bbox: BoundingBox) -> Vec<TrackChange> {
        self.bounding_box = Some(bbox);
        vec![TrackChange::BoundingBoxChanged]
    }

    pub fn set_track_quality(&mut self, quality: f64) {
        self.track_quality = quality.clamp(0.0, 1.0);
        self.touch();
    }

    pub fn add_detection_source(&mut self, source: DetectionSource) {
        self.detection_sources.insert(source);
    }

    pub fn increment_coast_count(&mut self) {
        self.coast_count += 1;
    }

    pub fn reset_coast_count(&mut self) {
        self.coast_count = 0;
    }

    /// Applies a fresh sensor measurement: position/velocity, source
    /// provenance, and the coasting reset -- everything a successful
    /// correlation match does to the winning track.
    pub fn apply_detection(
        &mut self,
        pos: GeoPosition,
        vel: VelocityVector,
        source: DetectionSource,
    ) -> Vec<TrackChange> {
        self.position = pos;
        self.velocity = vel;
        self.detection_sources.insert(source);
        self.touch_detection();
        vec![TrackChange::PositionChanged, TrackChange::VelocityChanged, TrackChange::Updated]
    }

    pub fn add_position_history(&mut self, pos: GeoPosition, timestamp_ms: i64) {
        self.position_history.push_back((pos, timestamp_ms));
        while self.position_history.len() > MAX_HISTORY_SIZE {
            self.position_history.pop_front();
        }
    }

    pub fn clear_history(&mut self) {
        self.position_history.clear();
    }

    /// Evicts history samples older than `retention_ms` relative to `now_ms`.
    pub fn prune_history_older_than(&mut self, now_ms: i64, retention_ms: i64) {
        while let Some(&(_, ts)) = self.position_history.front() {
            if now_ms - ts > retention_ms {
                self.position_history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Linear extrapolation by the current NED velocity; does not mutate
    /// the track.
    pub fn predicted_position(&self, delta_ms: i64) -> GeoPosition {
        let dt = delta_ms as f64 / 1000.0;
        let meters_per_lon = 111_000.0 * self.position.latitude.to_radians().cos();
        let mut predicted = self.position;
        predicted.latitude += (self.velocity.north * dt) / 111_000.0;
        predicted.longitude += (self.velocity.east * dt) / meters_per_lon;
        predicted.altitude -= self.velocity.down * dt;
        predicted
    }

    pub fn distance_to(&self, pos: &GeoPosition) -> f64 {
        geo::haversine(&self.position, pos)
    }

    pub fn distance_to_track(&self, other: &Track) -> f64 {
        self.distance_to(&other.position)
    }

    pub fn bearing_to(&self, pos: &GeoPosition) -> f64 {
        geo::bearing(&self.position, pos)
    }

    /// Merge on correlation: copies kinematics, unions detection sources,
    /// replaces classification only if `other`'s confidence is strictly
    /// higher, resets the coasting counter, refreshes the update time.
    pub fn update_from(&mut self, other: &Track) -> Vec<TrackChange> {
        self.position = other.position;
        self.velocity = other.velocity;

        let mut changes = vec![TrackChange::PositionChanged, TrackChange::VelocityChanged];

        if other.classification_confidence > self.classification_confidence {
            if self.classification != other.classification {
                changes.push(TrackChange::ClassificationChanged(other.classification));
            }
            self.classification = other.classification;
            self.classification_confidence = other.classification_confidence;
        }

        for &source in &other.detection_sources {
            self.detection_sources.insert(source);
        }

        self.touch_detection();
        changes.push(TrackChange::Updated);
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_at(lat: f64, lon: f64) -> Track {
        Track::new("TRK-0001", GeoPosition::new(lat, lon, 100.0), 0)
    }

    #[test]
    fn threat_level_clamps_on_every_write() {
        let mut t = track_at(34.0, -118.0);
        t.set_threat_level(99);
        assert_eq!(t.threat_level(), 5);
        t.set_threat_level(-10);
        assert_eq!(t.threat_level(), 1);
    }

    #[test]
    fn classification_confidence_clamps() {
        let mut t = track_at(34.0, -118.0);
        t.set_classification_confidence(1.5);
        assert_eq!(t.classification_confidence(), 1.0);
        t.set_classification_confidence(-0.5);
        assert_eq!(t.classification_confidence(), 0.0);
    }

    #[test]
    fn position_history_caps_at_max_size() {
        let mut t = track_at(34.0, -118.0);
        for i in 0..(MAX_HISTORY_SIZE as i64 + 20) {
            t.add_position_history(GeoPosition::new(34.0, -118.0, 0.0), i);
        }
        assert_eq!(t.position_history().len(), MAX_HISTORY_SIZE);
        assert_eq!(t.position_history().front().unwrap().1, 20);
    }

    #[test]
    fn update_from_only_overrides_classification_on_higher_confidence() {
        let mut a = track_at(34.0, -118.0);
        a.set_classification(TrackClassification::Friendly);
        a.set_classification_confidence(0.9);

        let mut b = track_at(34.0, -118.0);
        b.set_classification(TrackClassification::Hostile);
        b.set_classification_confidence(0.5);

        a.update_from(&b);
        assert_eq!(a.classification(), TrackClassification::Friendly);
        assert_eq!(a.classification_confidence(), 0.9);
    }

    #[test]
    fn update_from_overrides_when_other_confidence_is_higher() {
        let mut a = track_at(34.0, -118.0);
        a.set_classification(TrackClassification::Pending);
        a.set_classification_confidence(0.3);

        let mut b = track_at(34.0, -118.0);
        b.set_classification(TrackClassification::Hostile);
        b.set_classification_confidence(0.95);

        a.update_from(&b);
        assert_eq!(a.classification(), TrackClassification::Hostile);
        assert_eq!(a.classification_confidence(), 0.95);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let t = track_at(34.0522, -118.2437);
        assert_eq!(t.distance_to(&t.position()), 0.0);
    }

    #[test]
    fn setters_no_op_when_value_unchanged() {
        let mut t = track_at(34.0, -118.0);
        assert!(t.set_threat_level(1).is_empty());
        assert!(t.set_state(TrackState::Initiated).is_empty());
    }
}
