//! Error types surfaced by the fusion core.

use thiserror::Error;

/// Errors the core returns to callers. Internally-recoverable conditions
/// (filter reinit, subscriber lag) are logged and handled without ever
/// reaching here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Latitude/longitude outside their valid ranges.
    #[error("invalid position: lat={latitude}, lon={longitude}")]
    InvalidPosition { latitude: f64, longitude: f64 },

    /// Config construction failed a cross-field check.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// `max_tracks` has been reached; creation rejected.
    #[error("track capacity reached ({max_tracks} tracks)")]
    TrackCapacity { max_tracks: usize },

    /// Operation targeted a track id that does not exist.
    #[error("unknown track: {0}")]
    UnknownTrack(String),

    /// Operation attempted after `stop()`.
    #[error("component is not running")]
    NotRunning,
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
