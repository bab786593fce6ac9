//! Periodic re-rater of every live track against defended-asset geometry
//! and the configured rule set. Writebacks go back through the Track
//! Manager's own locked setters -- the assessor never mutates a `Track`
//! directly -- so every change is still atomic per field and still
//! publishes its usual event. Also owns the de-duplicated alert queue and
//! the prioritized threat queue.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::geo;
use crate::model::{DetectionSource, GeoPosition, TrackClassification, TrackState};
use crate::threat::{AssetAndRuleStore, DefendedAsset, RuleContext, ThreatAlert, ThreatRule};
use crate::track::Track;
use crate::track_manager::TrackManager;

/// Classification confidence at/above which a currently `Friendly` track
/// is immune to rule-driven threat-level and classification writebacks.
/// The original reference applies `force_classification` unconditionally
/// once a rule matches, which would flip a confirmed `Friendly` track to
/// `Hostile`; this is the resolution called for explicitly by the
/// friendly-immunity scenario.
const FRIENDLY_IMMUNITY_CONFIDENCE: f64 = 0.8;

/// Sliding window for alert de-duplication, measured on the monotonic
/// clock rather than the externally-reported wall-clock timestamp carried
/// on the alert itself.
const ALERT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessorConfig {
    pub assessment_interval_ms: u64,
    pub alert_queue_max_size: usize,
    pub auto_slew_to_highest_threat: bool,
    pub high_threat_threshold: i32,
    pub heading_tolerance_deg: f64,
}

impl Default for ThreatAssessorConfig {
    fn default() -> Self {
        Self {
            assessment_interval_ms: 500,
            alert_queue_max_size: 100,
            auto_slew_to_highest_threat: true,
            high_threat_threshold: 4,
            heading_tolerance_deg: 30.0,
        }
    }
}

impl ThreatAssessorConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.assessment_interval_ms == 0 {
            return Err(CoreError::InvalidConfig("assessment_interval_ms must be > 0".into()));
        }
        if self.alert_queue_max_size == 0 {
            return Err(CoreError::InvalidConfig("alert_queue_max_size must be > 0".into()));
        }
        if !(1..=5).contains(&self.high_threat_threshold) {
            return Err(CoreError::InvalidConfig("high_threat_threshold must be in 1..=5".into()));
        }
        Ok(())
    }

    fn tick_period(&self) -> Duration {
        Duration::from_millis(self.assessment_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThreatMetrics {
    pub hostile_count: usize,
    pub pending_count: usize,
    pub high_threat_count: usize,
    pub avg_threat_level: f64,
    pub closest_distance_m: Option<f64>,
    pub last_assessment_ms: i64,
    pub eval_error_count: u64,
}

struct AlertRecord {
    alert: ThreatAlert,
    emitted_at: Instant,
}

struct Inner {
    store: AssetAndRuleStore,
    alerts: VecDeque<AlertRecord>,
    metrics: ThreatMetrics,
}

/// Cheaply cloneable, same shape as [`crate::track_manager::TrackManager`]:
/// every clone shares the same asset/rule store, alert queue, and running
/// flag.
#[derive(Clone)]
pub struct ThreatAssessor {
    config: ThreatAssessorConfig,
    track_manager: TrackManager,
    bus: EventBus,
    inner: Arc<RwLock<Inner>>,
    running: Arc<AtomicBool>,
    next_alert_number: Arc<AtomicU64>,
    eval_error_count: Arc<AtomicU64>,
    tick_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl ThreatAssessor {
    pub fn new(
        config: ThreatAssessorConfig,
        track_manager: TrackManager,
        bus: EventBus,
    ) -> CoreResult<Self> {
        config.validate()?;
        let mut store = AssetAndRuleStore::new();
        store.load_default_rules();
        Ok(Self {
            config,
            track_manager,
            bus,
            inner: Arc::new(RwLock::new(Inner {
                store,
                alerts: VecDeque::new(),
                metrics: ThreatMetrics::default(),
            })),
            running: Arc::new(AtomicBool::new(false)),
            next_alert_number: Arc::new(AtomicU64::new(1)),
            eval_error_count: Arc::new(AtomicU64::new(0)),
            tick_handle: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &ThreatAssessorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the periodic assessment tick. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let assessor = self.clone();
        let period = self.config.tick_period();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if !assessor.running.load(Ordering::SeqCst) {
                    break;
                }
                assessor.assess_all_tracks();
            }
        });
        *self.tick_handle.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.tick_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ---- Defended assets & rules (delegated to the store) -------------------

    pub fn add_defended_asset(&self, asset: DefendedAsset) {
        self.inner.write().unwrap().store.add_asset(asset);
    }

    pub fn remove_defended_asset(&self, id: &str) {
        self.inner.write().unwrap().store.remove_asset(id);
    }

    pub fn clear_defended_assets(&self) {
        self.inner.write().unwrap().store.clear_assets();
    }

    pub fn defended_assets(&self) -> Vec<DefendedAsset> {
        self.inner.read().unwrap().store.assets().to_vec()
    }

    pub fn nearest_asset(&self, pos: &GeoPosition) -> Option<(DefendedAsset, f64)> {
        self.inner.read().unwrap().store.nearest_asset(pos).map(|(a, d)| (a.clone(), d))
    }

    pub fn add_rule(&self, rule: ThreatRule) {
        self.inner.write().unwrap().store.add_rule(rule);
    }

    pub fn remove_rule(&self, id: &str) {
        self.inner.write().unwrap().store.remove_rule(id);
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) {
        self.inner.write().unwrap().store.set_rule_enabled(id, enabled);
    }

    pub fn clear_rules(&self) {
        self.inner.write().unwrap().store.clear_rules();
    }

    pub fn rules(&self) -> Vec<ThreatRule> {
        self.inner.read().unwrap().store.rules().to_vec()
    }

    pub fn load_default_rules(&self) {
        self.inner.write().unwrap().store.load_default_rules();
    }

    // ---- Assessment -----------------------------------------------------------

    pub fn assess_track(&self, track_id: &str) {
        let Some(track) = self.track_manager.track(track_id) else {
            return;
        };
        if track.state() == TrackState::Dropped {
            return;
        }
        self.assess_one(&track);
    }

    /// Scores, rule-applies, and writes back every non-`Dropped` track,
    /// then refreshes the summary metrics and publishes
    /// `assessment_complete`. A panic evaluating one track is caught and
    /// counted rather than aborting the rest of the cycle (spec §4.6.6).
    pub fn assess_all_tracks(&self) {
        let tracks = self.track_manager.all_tracks();

        let mut hostile = 0usize;
        let mut pending = 0usize;
        let mut high_threat = 0usize;
        let mut total_level = 0i64;
        let mut count = 0usize;
        let mut closest: Option<f64> = None;

        for track in &tracks {
            if track.state() == TrackState::Dropped {
                continue;
            }
            if panic::catch_unwind(AssertUnwindSafe(|| self.assess_one(track))).is_err() {
                self.eval_error_count.fetch_add(1, Ordering::Relaxed);
                log::warn!("threat assessment panicked for track {}; skipping", track.track_id());
            }

            let current = self.track_manager.track(track.track_id()).unwrap_or_else(|| track.clone());
            count += 1;
            total_level += current.threat_level() as i64;
            match current.classification() {
                TrackClassification::Hostile => hostile += 1,
                TrackClassification::Pending => pending += 1,
                _ => {}
            }
            if current.threat_level() >= self.config.high_threat_threshold {
                high_threat += 1;
            }
            if let Some((_, dist)) = self.nearest_asset(&current.position()) {
                closest = Some(closest.map_or(dist, |c: f64| c.min(dist)));
            }
        }

        {
            let mut inner = self.inner.write().unwrap();
            inner.metrics = ThreatMetrics {
                hostile_count: hostile,
                pending_count: pending,
                high_threat_count: high_threat,
                avg_threat_level: if count > 0 { total_level as f64 / count as f64 } else { 0.0 },
                closest_distance_m: closest,
                last_assessment_ms: Utc::now().timestamp_millis(),
                eval_error_count: self.eval_error_count.load(Ordering::Relaxed),
            };
        }

        self.bus.publish(Event::AssessmentComplete);
    }

    /// Scores one track, applies the rule set on top, and writes back only
    /// the fields that changed (spec §4.6.4). `track` is a snapshot read
    /// from the Track Manager; the writeback itself re-enters the Track
    /// Manager's own locked setters rather than mutating this snapshot.
    fn assess_one(&self, track: &Track) {
        let old_level = track.threat_level();

        let (mut level, mut classification, pending_alerts) = {
            let guard = self.inner.read().unwrap();

            let friendly_immune = track.classification() == TrackClassification::Friendly
                && track.classification_confidence() >= FRIENDLY_IMMUNITY_CONFIDENCE;

            let mut level = self.calculate_base_level(track, &guard.store);
            let mut classification = track.classification();
            let mut pending_alerts = Vec::new();

            if !friendly_immune {
                self.apply_rules(track, &guard.store, &mut level, &mut classification, &mut pending_alerts);
            }
            (level, classification, pending_alerts)
        };

        level = level.clamp(1, 5);

        if level != old_level {
            let _ = self.track_manager.set_track_threat_level(track.track_id(), level);
            if level >= self.config.high_threat_threshold
                && !track.is_visually_tracked()
                && self.config.auto_slew_to_highest_threat
            {
                self.bus.publish(Event::SlewCameraRequest {
                    camera_id: track.associated_camera_id().map(|s| s.to_string()),
                    position: track.position(),
                });
            }
        }

        if classification != track.classification() && classification != TrackClassification::Unknown {
            let _ = self.track_manager.set_track_classification(track.track_id(), classification, 1.0);
        }

        for rule in pending_alerts {
            self.emit_alert(track, &rule, level);
        }
    }

    /// §4.6.1 steps 1-6: the additive score before the rule set runs. With
    /// no defended assets registered the track's current level is left
    /// untouched rather than guessing at a proximity contribution with
    /// nothing to measure against -- matches the original reference and
    /// the spec's boundary behavior that an empty asset store fires no
    /// proximity rule.
    fn calculate_base_level(&self, track: &Track, store: &AssetAndRuleStore) -> i32 {
        if store.assets().is_empty() {
            return track.threat_level();
        }
        if track.classification() == TrackClassification::Friendly {
            return 1;
        }

        let mut level = 1;
        level += match track.classification() {
            TrackClassification::Hostile => 2,
            TrackClassification::Pending => 1,
            _ => 0,
        };

        if let Some((asset, distance)) = store.nearest_asset(&track.position()) {
            if distance < asset.critical_radius_m {
                level += 3;
            } else if distance < asset.warning_radius_m {
                level += 2;
            } else if distance < asset.warning_radius_m * 2.0 {
                level += 1;
            }
            if self.is_heading_toward_asset(track, asset) {
                level += 1;
            }
        }

        if track.velocity().speed() > 30.0 {
            level += 1;
        }
        if track.classification_confidence() < 0.5 {
            level = (level - 1).max(1);
        }

        level
    }

    fn is_heading_toward_asset(&self, track: &Track, asset: &DefendedAsset) -> bool {
        let diff = geo::bearing_diff(track.velocity().heading(), track.bearing_to(&asset.position));
        diff < self.config.heading_tolerance_deg
    }

    /// §4.6.2: rules run in declaration order. A later `set_threat_level`
    /// replaces the working level rather than composing with an earlier
    /// additive change, and a later `force_classification` replaces an
    /// earlier one -- the documented behavior when rule order matters.
    /// Matched alerts are collected rather than emitted immediately so
    /// the de-dup check in `emit_alert` always sees the final, post-rule
    /// threat level.
    fn apply_rules(
        &self,
        track: &Track,
        store: &AssetAndRuleStore,
        level: &mut i32,
        classification: &mut TrackClassification,
        pending_alerts: &mut Vec<ThreatRule>,
    ) {
        let (nearest, proximity) = match store.nearest_asset(&track.position()) {
            Some((asset, dist)) => (Some(asset), dist),
            None => (None, f64::MAX),
        };
        let heading_to_asset = nearest
            .map(|asset| geo::bearing_diff(track.velocity().heading(), track.bearing_to(&asset.position)));

        let ctx = RuleContext {
            proximity_m: proximity,
            velocity_mps: track.velocity().speed(),
            heading_to_asset_deg: heading_to_asset,
            has_rf: track.has_source(DetectionSource::RfDetector),
            has_visual: track.is_visually_tracked(),
        };

        for rule in store.rules() {
            if !rule.enabled || !rule.matches(&ctx) {
                continue;
            }
            if rule.set_threat_level >= 0 {
                *level = rule.set_threat_level;
            } else {
                *level += rule.threat_level_increase;
            }
            if rule.force_classification != TrackClassification::Unknown {
                *classification = rule.force_classification;
            }
            if rule.generate_alert {
                pending_alerts.push(rule.clone());
            }
        }
    }

    /// §4.6.3: suppresses a new alert for `track_id` when an
    /// unacknowledged alert for the same track was emitted within the
    /// last 30 seconds (monotonic). `%TRACK%` in the rule's message
    /// template is replaced with the track id before storage.
    fn emit_alert(&self, track: &Track, rule: &ThreatRule, level_at_emit: i32) {
        let now = Instant::now();
        let alert = {
            let mut inner = self.inner.write().unwrap();

            let already_alerted = inner.alerts.iter().any(|r| {
                r.alert.track_id == track.track_id()
                    && !r.alert.acknowledged
                    && now.duration_since(r.emitted_at) < ALERT_DEDUP_WINDOW
            });
            if already_alerted {
                return;
            }

            let alert_id =
                format!("ALERT-{:06}", self.next_alert_number.fetch_add(1, Ordering::SeqCst));
            let message = rule.alert_message.replace("%TRACK%", track.track_id());
            let alert = ThreatAlert {
                alert_id,
                track_id: track.track_id().to_string(),
                message,
                threat_level_at_emit: level_at_emit,
                timestamp_ms: Utc::now().timestamp_millis(),
                acknowledged: false,
                acknowledged_by: None,
                acknowledged_time_ms: None,
            };

            inner.alerts.push_back(AlertRecord { alert: alert.clone(), emitted_at: now });
            while inner.alerts.len() > self.config.alert_queue_max_size {
                inner.alerts.pop_front();
            }
            alert
        };

        log::warn!("threat alert: {}", alert.message);
        self.bus.publish(Event::ThreatAlertNew {
            alert_id: alert.alert_id.clone(),
            track_id: alert.track_id.clone(),
        });
    }

    // ---- Threat queue -----------------------------------------------------------

    /// All non-`Dropped` `Hostile`/`Pending` tracks, sorted by threat level
    /// descending then proximity to nearest asset ascending. Stable for
    /// equal keys.
    pub fn threat_queue(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = self
            .track_manager
            .all_tracks()
            .into_iter()
            .filter(|t| {
                t.state() != TrackState::Dropped
                    && matches!(t.classification(), TrackClassification::Hostile | TrackClassification::Pending)
            })
            .collect();

        let proximity =
            |t: &Track| -> f64 { self.nearest_asset(&t.position()).map(|(_, d)| d).unwrap_or(f64::MAX) };
        tracks.sort_by(|a, b| {
            b.threat_level().cmp(&a.threat_level()).then(proximity(a).total_cmp(&proximity(b)))
        });
        tracks
    }

    pub fn highest_unconfirmed_threat(&self) -> Option<Track> {
        self.threat_queue().into_iter().find(|t| !t.is_visually_tracked())
    }

    pub fn metrics(&self) -> ThreatMetrics {
        self.inner.read().unwrap().metrics
    }

    // ---- Alerts -----------------------------------------------------------------

    pub fn alerts(&self) -> Vec<ThreatAlert> {
        self.inner.read().unwrap().alerts.iter().map(|r| r.alert.clone()).collect()
    }

    pub fn unacknowledged_alerts(&self) -> Vec<ThreatAlert> {
        self.inner
            .read()
            .unwrap()
            .alerts
            .iter()
            .filter(|r| !r.alert.acknowledged)
            .map(|r| r.alert.clone())
            .collect()
    }

    pub fn acknowledge_alert(&self, alert_id: &str, operator_id: &str) {
        let mut inner = self.inner.write().unwrap();
        let Some(record) = inner.alerts.iter_mut().find(|r| r.alert.alert_id == alert_id) else {
            return;
        };
        record.alert.acknowledged = true;
        record.alert.acknowledged_by = Some(operator_id.to_string());
        record.alert.acknowledged_time_ms = Some(Utc::now().timestamp_millis());
        drop(inner);
        self.bus.publish(Event::ThreatAlertAcknowledged { alert_id: alert_id.to_string() });
    }

    pub fn clear_alerts(&self) {
        self.inner.write().unwrap().alerts.clear();
    }
}
