//! Owns the set of live tracks, correlates incoming detections against
//! them, runs the lifecycle tick, and publishes track events. The hardest
//! subsystem in the core.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::filter::{FilterConfig, SmoothingFilter};
use crate::geo;
use crate::model::{DetectionReport, DetectionSource, GeoPosition, TrackClassification, TrackState, VelocityVector};
use crate::track::{Track, TrackChange};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackManagerConfig {
    pub update_rate_hz: u32,
    pub correlation_distance_m: f64,
    pub correlation_velocity_mps: f64,
    pub coasting_timeout_ms: i64,
    pub drop_timeout_ms: i64,
    pub max_coast_count: u32,
    pub enable_kalman_filter: bool,
    pub max_tracks: usize,
    pub history_retention_ms: i64,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: 10,
            correlation_distance_m: 100.0,
            correlation_velocity_mps: 10.0,
            coasting_timeout_ms: 5000,
            drop_timeout_ms: 15000,
            max_coast_count: 10,
            enable_kalman_filter: true,
            max_tracks: 200,
            history_retention_ms: 60000,
        }
    }
}

impl TrackManagerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.update_rate_hz == 0 {
            return Err(CoreError::InvalidConfig("update_rate_hz must be > 0".into()));
        }
        if self.drop_timeout_ms <= self.coasting_timeout_ms {
            return Err(CoreError::InvalidConfig(
                "drop_timeout_ms must be greater than coasting_timeout_ms".into(),
            ));
        }
        if self.max_tracks == 0 {
            return Err(CoreError::InvalidConfig("max_tracks must be > 0".into()));
        }
        Ok(())
    }

    fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_rate_hz as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_tracks_created: u64,
    pub total_tracks_dropped: u64,
    pub current_active_count: usize,
    pub current_coasting_count: usize,
    pub correlation_success_count: u64,
    pub last_update_time_ms: i64,
}

struct TrackSlot {
    track: Track,
    filter: SmoothingFilter,
    created_seq: u64,
}

/// The track map itself. Held behind an outer `RwLock` that callers take
/// *shared* for lookups and correlation scans and *exclusive* only to
/// insert or remove an entry -- every per-track mutation goes through that
/// track's own `RwLock<TrackSlot>` instead, so two callers touching
/// disjoint tracks never block each other (spec §5).
struct Inner {
    tracks: HashMap<String, RwLock<TrackSlot>>,
}

/// Multi-sensor fusion engine. Cheaply cloneable: every clone shares the
/// same track store, event bus, and running flag, the same way the
/// teacher's `Session` shares one `Arc<RwLock<SessionInner>>` across
/// handles.
#[derive(Clone)]
pub struct TrackManager {
    config: TrackManagerConfig,
    inner: Arc<RwLock<Inner>>,
    /// Kept outside `Inner` so bumping a counter never requires the
    /// exclusive side of the track map's lock.
    stats: Arc<Mutex<Statistics>>,
    bus: EventBus,
    running: Arc<AtomicBool>,
    next_track_number: Arc<AtomicU64>,
    tick_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl TrackManager {
    pub fn new(config: TrackManagerConfig, bus: EventBus) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Arc::new(RwLock::new(Inner { tracks: HashMap::new() })),
            stats: Arc::new(Mutex::new(Statistics::default())),
            bus,
            running: Arc::new(AtomicBool::new(false)),
            next_track_number: Arc::new(AtomicU64::new(1)),
            tick_handle: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &TrackManagerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the periodic lifecycle tick. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = self.clone();
        let period = self.config.tick_period();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if !manager.running.load(Ordering::SeqCst) {
                    break;
                }
                manager.lifecycle_tick();
            }
        });
        *self.tick_handle.lock().unwrap() = Some(handle);
    }

    /// Stops the periodic tick and joins it. In-flight ingests already in
    /// progress complete; subsequent ingests are rejected with
    /// `NotRunning`.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.tick_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn generate_track_id(&self) -> (String, u64) {
        let n = self.next_track_number.fetch_add(1, Ordering::SeqCst);
        (format!("TRK-{n:04}"), n)
    }

    fn new_filter(&self) -> SmoothingFilter {
        if self.config.enable_kalman_filter {
            SmoothingFilter::new_kalman(FilterConfig::default())
        } else {
            SmoothingFilter::new_passthrough()
        }
    }

    fn publish_all(&self, track_id: &str, changes: Vec<TrackChange>) {
        for change in changes {
            let event = match change {
                TrackChange::PositionChanged | TrackChange::VelocityChanged => {
                    Event::TrackUpdated { track_id: track_id.to_string() }
                }
                TrackChange::ClassificationChanged(c) => {
                    Event::TrackClassificationChanged { track_id: track_id.to_string(), classification: c }
                }
                TrackChange::ThreatLevelChanged(old, new) => {
                    Event::TrackThreatLevelChanged { track_id: track_id.to_string(), old_level: old, new_level: new }
                }
                TrackChange::StateChanged(s) => {
                    if s == TrackState::Dropped {
                        Event::TrackDropped { track_id: track_id.to_string() }
                    } else {
                        Event::TrackStateChanged { track_id: track_id.to_string(), state: s }
                    }
                }
                TrackChange::BoundingBoxChanged => continue,
                TrackChange::Updated => Event::TrackUpdated { track_id: track_id.to_string() },
            };
            self.bus.publish(event);
        }
    }

    // ---- Detection ingestion -------------------------------------------

    pub fn process_radar_detection(
        &self,
        pos: GeoPosition,
        vel: VelocityVector,
        _quality: f64,
        timestamp_ms: i64,
    ) -> CoreResult<String> {
        self.on_sensor_data(pos, Some(vel), DetectionSource::Radar, timestamp_ms)
    }

    pub fn process_rf_detection(
        &self,
        pos: GeoPosition,
        _signal_strength: f64,
        timestamp_ms: i64,
    ) -> CoreResult<String> {
        self.on_sensor_data(pos, None, DetectionSource::RfDetector, timestamp_ms)
    }

    /// A camera sighting is itself the visual-confirmation signal: the
    /// resolved track is marked visually tracked before the id is handed
    /// back, so the threat assessor's visual-confirmation gates see it on
    /// the very next tick.
    pub fn process_camera_detection(
        &self,
        pos: GeoPosition,
        timestamp_ms: i64,
    ) -> CoreResult<String> {
        let track_id = self.on_sensor_data(pos, None, DetectionSource::Camera, timestamp_ms)?;
        self.set_track_visually_tracked(&track_id, true)?;
        Ok(track_id)
    }

    pub fn process_detection_report(&self, report: &DetectionReport) -> CoreResult<String> {
        self.on_sensor_data(report.position, report.velocity, report.source, report.timestamp_ms)
    }

    /// The common ingestion pipeline shared by every typed entry point:
    /// correlate, then associate-or-create, then emit.
    pub fn on_sensor_data(
        &self,
        pos: GeoPosition,
        vel: Option<VelocityVector>,
        source: DetectionSource,
        timestamp_ms: i64,
    ) -> CoreResult<String> {
        if !self.is_running() {
            return Err(CoreError::NotRunning);
        }
        if let Err(e) = pos.validate() {
            log::warn!("rejecting detection with invalid position: {e}");
            return Err(e);
        }

        let velocity = vel.unwrap_or_default();

        // Correlation and, on a hit, the update itself only need the outer
        // lock's shared side plus the winning track's own lock -- two
        // ingests against disjoint tracks never block each other.
        {
            let inner = self.inner.read().unwrap();
            let winner = find_correlated_track(
                &inner.tracks,
                &pos,
                vel,
                self.config.correlation_distance_m,
                self.config.correlation_velocity_mps,
            );

            if let Some(track_id) = winner {
                self.stats.lock().unwrap().correlation_success_count += 1;

                let slot_lock = inner.tracks.get(&track_id).expect("winner id must exist");
                let mut slot = slot_lock.write().unwrap();
                let dt = slot.track.time_since_detection().as_secs_f64();
                slot.filter.update(pos.latitude, pos.longitude, dt);
                if slot.filter.is_degenerate() {
                    log::warn!("filter for {track_id} degenerate, reinitializing from raw measurement");
                    slot.filter.initialize(pos.latitude, pos.longitude);
                }
                let (sx, sy) = slot.filter.position();
                let (vx, vy) = slot.filter.velocity();
                let (north, east) = geo::degrees_per_sec_to_ned(vx, vy, sx);
                let smoothed_pos = GeoPosition::new(sx, sy, pos.altitude);
                let smoothed_vel = VelocityVector::new(north, east, velocity.down);

                let mut changes = slot.track.apply_detection(smoothed_pos, smoothed_vel, source);
                slot.track.add_position_history(smoothed_pos, timestamp_ms);
                if slot.track.state() == TrackState::Initiated {
                    changes.extend(slot.track.set_state(TrackState::Active));
                }
                drop(slot);
                drop(inner);
                self.publish_all(&track_id, changes);
                return Ok(track_id);
            }
        }

        // No correlated track: inserting a new entry reshapes the map, so
        // it needs a narrow exclusive upgrade, held only for the insert.
        let mut inner = self.inner.write().unwrap();
        if inner.tracks.len() >= self.config.max_tracks {
            return Err(CoreError::TrackCapacity { max_tracks: self.config.max_tracks });
        }

        let (track_id, seq) = self.generate_track_id();
        let mut track = Track::new(track_id.clone(), pos, timestamp_ms);
        track.set_classification(TrackClassification::Pending);
        track.apply_detection(pos, velocity, source);
        track.add_position_history(pos, timestamp_ms);

        let mut filter = self.new_filter();
        filter.initialize(pos.latitude, pos.longitude);

        inner.tracks.insert(track_id.clone(), RwLock::new(TrackSlot { track, filter, created_seq: seq }));
        drop(inner);

        let mut stats = self.stats.lock().unwrap();
        stats.total_tracks_created += 1;
        stats.last_update_time_ms = Utc::now().timestamp_millis();
        drop(stats);

        // A single `track_created` event, not the individual
        // classification/position changes that built up the initial state
        // -- spec §4.4.1 step 3 emits one event for creation.
        self.bus.publish(Event::TrackCreated { track_id: track_id.clone() });
        Ok(track_id)
    }

    // ---- Lifecycle tick --------------------------------------------------

    fn lifecycle_tick(&self) {
        // Tracks already `Dropped` coming into this tick have had at least
        // one full tick to be observed via their drop event; prune them
        // before processing so a dropped track is retained for exactly one
        // tick, never zero and never indefinitely. Pruning reshapes the
        // map, so it takes the narrow exclusive upgrade; the per-track tick
        // below only needs the shared side.
        {
            let mut inner = self.inner.write().unwrap();
            inner.tracks.retain(|_, slot| slot.get_mut().unwrap().track.state() != TrackState::Dropped);
        }

        let dt = 1.0 / self.config.update_rate_hz as f64;
        let coasting_timeout = self.config.coasting_timeout_ms;
        let drop_timeout = self.config.drop_timeout_ms;
        let max_coast = self.config.max_coast_count;
        let retention = self.config.history_retention_ms;

        let mut active = 0usize;
        let mut coasting = 0usize;
        let mut dropped_ids = Vec::new();

        let inner = self.inner.read().unwrap();
        for (track_id, slot_lock) in inner.tracks.iter() {
            let mut slot = slot_lock.write().unwrap();
            let age_ms = slot.track.time_since_detection().as_millis() as i64;
            let now_ms = Utc::now().timestamp_millis();
            slot.track.prune_history_older_than(now_ms, retention);

            let mut changes = Vec::new();
            match slot.track.state() {
                TrackState::Initiated => {}
                TrackState::Active => {
                    if age_ms > coasting_timeout {
                        changes.extend(slot.track.set_state(TrackState::Coasting));
                        slot.track.increment_coast_count();
                    }
                }
                TrackState::Coasting => {
                    slot.filter.predict(dt);
                    if age_ms > drop_timeout || slot.track.coast_count() >= max_coast {
                        changes.extend(slot.track.set_state(TrackState::Dropped));
                        dropped_ids.push(track_id.clone());
                    } else {
                        slot.track.increment_coast_count();
                    }
                }
                TrackState::Dropped => {}
            }

            match slot.track.state() {
                TrackState::Active => active += 1,
                TrackState::Coasting => coasting += 1,
                _ => {}
            }

            drop(slot);
            self.publish_all(track_id, changes);
        }
        drop(inner);

        let mut stats = self.stats.lock().unwrap();
        stats.current_active_count = active;
        stats.current_coasting_count = coasting;
        stats.total_tracks_dropped += dropped_ids.len() as u64;
        stats.last_update_time_ms = Utc::now().timestamp_millis();
    }

    /// Removes tracks that have been `Dropped` for at least one tick.
    pub fn prune_dropped_tracks(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.tracks.retain(|_, slot| slot.get_mut().unwrap().track.state() != TrackState::Dropped);
    }

    pub fn clear_all_tracks(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.tracks.clear();
    }

    pub fn statistics(&self) -> Statistics {
        *self.stats.lock().unwrap()
    }

    // ---- Manual operations ------------------------------------------------

    pub fn drop_track(&self, track_id: &str) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        let changes = slot.write().unwrap().track.set_state(TrackState::Dropped);
        drop(inner);
        self.publish_all(track_id, changes);
        Ok(())
    }

    pub fn promote_track(&self, track_id: &str) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        slot.write().unwrap().track.set_classification_confidence(1.0);
        Ok(())
    }

    pub fn merge_track(&self, source_id: &str, target_id: &str) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let source_track = {
            let source_slot =
                inner.tracks.get(source_id).ok_or_else(|| CoreError::UnknownTrack(source_id.into()))?;
            source_slot.read().unwrap().track.clone()
        };
        let changes = {
            let target_slot =
                inner.tracks.get(target_id).ok_or_else(|| CoreError::UnknownTrack(target_id.into()))?;
            target_slot.write().unwrap().track.update_from(&source_track)
        };
        let source_changes = {
            let source_slot = inner.tracks.get(source_id).unwrap();
            source_slot.write().unwrap().track.set_state(TrackState::Dropped)
        };
        drop(inner);
        self.publish_all(target_id, changes);
        self.publish_all(source_id, source_changes);
        Ok(())
    }

    pub fn set_track_classification(
        &self,
        track_id: &str,
        cls: TrackClassification,
        confidence: f64,
    ) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        let mut guard = slot.write().unwrap();
        let changes = guard.track.set_classification(cls);
        guard.track.set_classification_confidence(confidence);
        drop(guard);
        drop(inner);
        self.publish_all(track_id, changes);
        Ok(())
    }

    pub fn set_track_threat_level(&self, track_id: &str, level: i32) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        let changes = slot.write().unwrap().track.set_threat_level(level);
        drop(inner);
        self.publish_all(track_id, changes);
        Ok(())
    }

    pub fn set_track_bounding_box(&self, track_id: &str, bbox: crate::model::BoundingBox) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        slot.write().unwrap().track.set_bounding_box(bbox);
        Ok(())
    }

    pub fn associate_camera(&self, track_id: &str, camera_id: &str) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        let changes = slot.write().unwrap().track.set_associated_camera_id(camera_id);
        drop(inner);
        self.publish_all(track_id, changes);
        Ok(())
    }

    /// Marks (or clears) visual confirmation on a track. Feeds the threat
    /// assessor's `has_visual` rule context and auto-slew suppression.
    pub fn set_track_visually_tracked(&self, track_id: &str, tracked: bool) -> CoreResult<()> {
        let inner = self.inner.read().unwrap();
        let slot = inner.tracks.get(track_id).ok_or_else(|| CoreError::UnknownTrack(track_id.into()))?;
        let changes = slot.write().unwrap().track.set_visually_tracked(tracked);
        drop(inner);
        self.publish_all(track_id, changes);
        Ok(())
    }

    // ---- Queries -----------------------------------------------------------

    pub fn track_count(&self) -> usize {
        self.inner.read().unwrap().tracks.len()
    }

    pub fn all_tracks(&self) -> Vec<Track> {
        self.inner.read().unwrap().tracks.values().map(|s| s.read().unwrap().track.clone()).collect()
    }

    pub fn track(&self, track_id: &str) -> Option<Track> {
        self.inner.read().unwrap().tracks.get(track_id).map(|s| s.read().unwrap().track.clone())
    }

    pub fn tracks_by_classification(&self, cls: TrackClassification) -> Vec<Track> {
        self.all_tracks().into_iter().filter(|t| t.classification() == cls).collect()
    }

    pub fn tracks_by_threat_level(&self, min_level: i32) -> Vec<Track> {
        self.all_tracks().into_iter().filter(|t| t.threat_level() >= min_level).collect()
    }

    pub fn tracks_in_radius(&self, center: &GeoPosition, radius_m: f64) -> Vec<Track> {
        self.all_tracks().into_iter().filter(|t| t.distance_to(center) <= radius_m).collect()
    }

    pub fn hostile_tracks(&self) -> Vec<Track> {
        self.tracks_by_classification(TrackClassification::Hostile)
    }

    pub fn pending_tracks(&self) -> Vec<Track> {
        self.tracks_by_classification(TrackClassification::Pending)
    }

    pub fn highest_threat_track(&self) -> Option<Track> {
        self.all_tracks().into_iter().max_by_key(|t| t.threat_level())
    }
}

/// Scans all non-`Dropped` tracks for the best correlation match. Returns
/// the winning track id, or `None` if no candidate satisfies both gates.
fn find_correlated_track(
    tracks: &HashMap<String, RwLock<TrackSlot>>,
    pos: &GeoPosition,
    vel: Option<VelocityVector>,
    max_distance_m: f64,
    max_velocity_mps: f64,
) -> Option<String> {
    let mut best: Option<(String, f64, u64)> = None;

    for (id, slot) in tracks.iter() {
        let slot = slot.read().unwrap();
        if slot.track.state() == TrackState::Dropped {
            continue;
        }

        let position_gap = geo::flat_distance(&slot.track.position(), pos);
        if position_gap > max_distance_m {
            continue;
        }

        let velocity_gap = match vel {
            Some(v) => {
                let current = slot.track.velocity();
                let dn = v.north - current.north;
                let de = v.east - current.east;
                (dn * dn + de * de).sqrt()
            }
            None => 0.0,
        };
        if velocity_gap > max_velocity_mps {
            continue;
        }

        let candidate = (id.clone(), position_gap, slot.created_seq);
        best = Some(match best {
            None => candidate,
            Some(current) => {
                if candidate.1 < current.1 || (candidate.1 == current.1 && candidate.2 < current.2) {
                    candidate
                } else {
                    current
                }
            }
        });
    }

    best.map(|(id, _, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TrackManager {
        let m = TrackManager::new(TrackManagerConfig::default(), EventBus::new(64)).unwrap();
        m.running.store(true, Ordering::SeqCst);
        m
    }

    #[test]
    fn invalid_config_rejected() {
        let mut cfg = TrackManagerConfig::default();
        cfg.drop_timeout_ms = cfg.coasting_timeout_ms;
        assert!(TrackManager::new(cfg, EventBus::new(16)).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = TrackManagerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrackManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn fresh_detection_creates_exactly_one_track() {
        let m = manager();
        let pos = GeoPosition::new(34.0522, -118.2437, 100.0);
        let id = m
            .process_radar_detection(pos, VelocityVector::default(), 1.0, 0)
            .unwrap();
        assert_eq!(m.track_count(), 1);
        let t = m.track(&id).unwrap();
        assert_eq!(t.classification(), TrackClassification::Pending);
        assert_eq!(t.threat_level(), 1);
    }

    #[test]
    fn second_nearby_detection_correlates_instead_of_creating() {
        let m = manager();
        let pos1 = GeoPosition::new(34.0522, -118.2437, 100.0);
        let id1 = m.process_radar_detection(pos1, VelocityVector::default(), 1.0, 0).unwrap();

        let pos2 = GeoPosition::new(34.05270, -118.2437, 100.0); // ~55m north
        let id2 = m.process_radar_detection(pos2, VelocityVector::default(), 1.0, 500).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(m.track_count(), 1);
    }

    #[test]
    fn ingest_rejected_when_not_running() {
        let m = TrackManager::new(TrackManagerConfig::default(), EventBus::new(16)).unwrap();
        let pos = GeoPosition::new(34.0, -118.0, 0.0);
        let result = m.process_radar_detection(pos, VelocityVector::default(), 1.0, 0);
        assert_eq!(result, Err(CoreError::NotRunning));
    }

    #[test]
    fn invalid_position_rejected_with_no_track_created() {
        let m = manager();
        let pos = GeoPosition::new(200.0, 0.0, 0.0);
        let result = m.process_radar_detection(pos, VelocityVector::default(), 1.0, 0);
        assert!(result.is_err());
        assert_eq!(m.track_count(), 0);
    }

    #[test]
    fn max_tracks_enforced() {
        let mut cfg = TrackManagerConfig::default();
        cfg.max_tracks = 1;
        let m = TrackManager::new(cfg, EventBus::new(16)).unwrap();
        m.running.store(true, Ordering::SeqCst);

        m.process_radar_detection(GeoPosition::new(10.0, 10.0, 0.0), VelocityVector::default(), 1.0, 0)
            .unwrap();
        let result = m.process_radar_detection(
            GeoPosition::new(40.0, 40.0, 0.0),
            VelocityVector::default(),
            1.0,
            0,
        );
        assert_eq!(result, Err(CoreError::TrackCapacity { max_tracks: 1 }));
    }

    #[test]
    fn unknown_track_operations_return_error() {
        let m = manager();
        assert_eq!(m.drop_track("TRK-9999"), Err(CoreError::UnknownTrack("TRK-9999".into())));
        assert_eq!(
            m.set_track_threat_level("TRK-9999", 3),
            Err(CoreError::UnknownTrack("TRK-9999".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_tick_transitions_to_coasting_then_dropped() {
        let mut cfg = TrackManagerConfig::default();
        cfg.update_rate_hz = 10;
        cfg.coasting_timeout_ms = 100;
        cfg.drop_timeout_ms = 300;
        cfg.max_coast_count = 1000;
        let m = TrackManager::new(cfg, EventBus::new(64)).unwrap();
        m.start();

        let pos = GeoPosition::new(34.0, -118.0, 0.0);
        let id = m.process_radar_detection(pos, VelocityVector::default(), 1.0, 0).unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert_eq!(m.track(&id).unwrap().state(), TrackState::Coasting);

        tokio::time::advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
        assert_eq!(m.track(&id).unwrap().state(), TrackState::Dropped);

        m.stop().await;
    }
}
