//! # CUAS Core
//!
//! Platform-independent track fusion and threat assessment library for a
//! Counter-UAS command-and-control system.
//!
//! This crate contains pure fusion and scoring logic with **no network or
//! process I/O** -- the only side effect it owns is its internal periodic
//! tick, driven by Tokio timers. Everything a caller observes from the
//! outside happens through the [`EventBus`] or through explicit query
//! methods on [`TrackManager`] and [`ThreatAssessor`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  cuas-core (no network I/O)                                 │
//! │  ├── model/geo      (spatial/kinematic primitives)          │
//! │  ├── filter         (per-track Kalman / alpha-beta smoothing)│
//! │  ├── track          (single-track entity + lifecycle)        │
//! │  ├── track_manager   (correlation, lifecycle tick, ingestion) │
//! │  ├── threat         (defended assets + rule set store)       │
//! │  ├── threat_assessor (periodic scoring, alerts, threat queue)│
//! │  └── events         (broadcast fan-out of observable changes)│
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲                           ▲
//!    ┌────────────┴────────────┐   ┌─────────┴─────────┐
//!    │  cuas-runtime           │   │ other consumers   │
//!    │  (CLI + sensor wiring)  │   │ (simulation, test)│
//!    └─────────────────────────┘   └───────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`model`] - Geodetic position, NED velocity, detection reports
//! - [`geo`] - Great-circle distance, bearing, geodetic offset
//! - [`filter`] - Per-track position smoothing (Kalman / alpha-beta / passthrough)
//! - [`track`] - The `Track` entity and its lifecycle state machine
//! - [`track_manager`] - Correlates detections into tracks and runs the lifecycle tick
//! - [`threat`] - Defended assets and the threat-rule set
//! - [`threat_assessor`] - Periodic re-scoring, alert de-duplication, threat queue
//! - [`events`] - Typed publish-subscribe event bus
//! - [`error`] - Error types returned by the core
//!
//! ## Example: Wiring a Track Manager and Threat Assessor
//!
//! ```rust,no_run
//! use cuas_core::{EventBus, TrackManager, TrackManagerConfig, ThreatAssessor, ThreatAssessorConfig};
//! use cuas_core::model::{GeoPosition, VelocityVector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::default();
//! let tracks = TrackManager::new(TrackManagerConfig::default(), bus.clone())?;
//! tracks.start();
//!
//! let assessor = ThreatAssessor::new(ThreatAssessorConfig::default(), tracks.clone(), bus)?;
//! assessor.start();
//!
//! let id = tracks.process_radar_detection(
//!     GeoPosition::new(34.0522, -118.2437, 150.0),
//!     VelocityVector::default(),
//!     1.0,
//!     0,
//! )?;
//! println!("fused into {id}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod filter;
pub mod geo;
pub mod model;
pub mod threat;
pub mod threat_assessor;
pub mod track;
pub mod track_manager;

pub use error::{CoreError, CoreResult};
pub use events::{Event, EventBus};
pub use filter::{AlphaBetaFilter2D, FilterConfig, KalmanFilter2D, SmoothingFilter};
pub use model::{
    BoundingBox, DetectionReport, DetectionSource, GeoPosition, TrackClassification, TrackState,
    VelocityVector,
};
pub use threat::{AssetAndRuleStore, DefendedAsset, RuleContext, ThreatAlert, ThreatRule};
pub use threat_assessor::{ThreatAssessor, ThreatAssessorConfig, ThreatMetrics};
pub use track::{Track, TrackChange};
pub use track_manager::{Statistics, TrackManager, TrackManagerConfig};

/// End-to-end scenarios spanning the Track Manager and Threat Assessor
/// together, the true cross-module tests -- everything single-component
/// is tested beside the component that owns it instead.
#[cfg(test)]
mod integration_tests {
    use std::time::Duration;

    use crate::model::{GeoPosition, TrackClassification, TrackState, VelocityVector};
    use crate::threat::DefendedAsset;
    use crate::{EventBus, ThreatAssessor, ThreatAssessorConfig, TrackManager, TrackManagerConfig};

    fn wired() -> (TrackManager, ThreatAssessor) {
        let bus = EventBus::new(128);
        let tm = TrackManager::new(TrackManagerConfig::default(), bus.clone()).unwrap();
        let assessor = ThreatAssessor::new(ThreatAssessorConfig::default(), tm.clone(), bus).unwrap();
        (tm, assessor)
    }

    #[tokio::test]
    async fn scenario_fresh_track_creation() {
        let (tm, _assessor) = wired();
        tm.start();

        let pos = GeoPosition::new(34.0522, -118.2437, 150.0);
        let id = tm.process_radar_detection(pos, VelocityVector::default(), 1.0, 0).unwrap();

        let track = tm.track(&id).unwrap();
        assert_eq!(track.classification(), TrackClassification::Pending);
        assert_eq!(track.threat_level(), 1);
        assert_eq!(track.state(), TrackState::Initiated);
        assert_eq!(tm.track_count(), 1);

        tm.stop().await;
    }

    #[tokio::test]
    async fn scenario_correlation_association() {
        let (tm, _assessor) = wired();
        tm.start();

        let first = GeoPosition::new(34.0522, -118.2437, 150.0);
        let id1 = tm.process_radar_detection(first, VelocityVector::default(), 1.0, 0).unwrap();

        // ~30m away and 200ms later: inside both the default position and
        // velocity correlation gates.
        let second = GeoPosition::new(34.05247, -118.2437, 150.0);
        let id2 = tm.process_radar_detection(second, VelocityVector::default(), 1.0, 200).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(tm.track_count(), 1);
        assert_eq!(tm.track(&id1).unwrap().state(), TrackState::Active);

        tm.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_lifecycle_coasting_then_drop() {
        let mut cfg = TrackManagerConfig::default();
        cfg.coasting_timeout_ms = 100;
        cfg.drop_timeout_ms = 300;
        cfg.max_coast_count = 1000;
        let bus = EventBus::new(64);
        let tm = TrackManager::new(cfg, bus).unwrap();
        tm.start();

        let pos = GeoPosition::new(34.0, -118.0, 0.0);
        let id = tm.process_radar_detection(pos, VelocityVector::default(), 1.0, 0).unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert_eq!(tm.track(&id).unwrap().state(), TrackState::Coasting);

        tokio::time::advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
        assert_eq!(tm.track(&id).unwrap().state(), TrackState::Dropped);

        tm.stop().await;
    }

    #[tokio::test]
    async fn scenario_threat_elevation_by_proximity() {
        let (tm, assessor) = wired();
        tm.start();
        assessor.add_defended_asset(DefendedAsset {
            critical_radius_m: 500.0,
            warning_radius_m: 1500.0,
            ..DefendedAsset::new("BASE-01", "HQ", GeoPosition::new(34.0522, -118.2437, 0.0))
        });

        let pos = GeoPosition::new(34.0525, -118.2437, 100.0); // ~33m from asset
        let id = tm.process_radar_detection(pos, VelocityVector::default(), 1.0, 0).unwrap();

        assessor.assess_all_tracks();

        let track = tm.track(&id).unwrap();
        assert!(track.threat_level() >= 4);
        assert_eq!(track.classification(), TrackClassification::Hostile);
        assert_eq!(assessor.alerts().len(), 1);

        tm.stop().await;
    }

    #[tokio::test]
    async fn scenario_friendly_track_is_never_elevated_or_reclassified() {
        let (tm, assessor) = wired();
        tm.start();
        assessor.add_defended_asset(DefendedAsset {
            critical_radius_m: 500.0,
            warning_radius_m: 1500.0,
            ..DefendedAsset::new("BASE-01", "HQ", GeoPosition::new(34.0522, -118.2437, 0.0))
        });

        let pos = GeoPosition::new(34.0525, -118.2437, 100.0);
        let id = tm.process_radar_detection(pos, VelocityVector::default(), 1.0, 0).unwrap();
        tm.set_track_classification(&id, TrackClassification::Friendly, 1.0).unwrap();

        assessor.assess_all_tracks();

        let track = tm.track(&id).unwrap();
        assert_eq!(track.threat_level(), 1);
        assert_eq!(track.classification(), TrackClassification::Friendly);
        assert!(assessor.alerts().is_empty());

        tm.stop().await;
    }

    #[tokio::test]
    async fn scenario_alert_acknowledgement() {
        let (tm, assessor) = wired();
        tm.start();
        assessor.add_defended_asset(DefendedAsset {
            critical_radius_m: 500.0,
            warning_radius_m: 1500.0,
            ..DefendedAsset::new("BASE-01", "HQ", GeoPosition::new(34.0522, -118.2437, 0.0))
        });

        let pos = GeoPosition::new(34.0525, -118.2437, 100.0);
        tm.process_radar_detection(pos, VelocityVector::default(), 1.0, 0).unwrap();
        assessor.assess_all_tracks();

        let alert_id = assessor.alerts()[0].alert_id.clone();
        assessor.acknowledge_alert(&alert_id, "OP-01");

        let alert = assessor.alerts().into_iter().find(|a| a.alert_id == alert_id).unwrap();
        assert!(alert.acknowledged);
        assert_eq!(alert.acknowledged_by.as_deref(), Some("OP-01"));
        assert!(assessor.unacknowledged_alerts().is_empty());

        tm.stop().await;
    }
}
