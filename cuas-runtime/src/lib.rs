//! # CUAS Runtime
//!
//! Process harness that schedules the counter-UAS fusion core's two
//! periodic subsystems -- the Track Manager's lifecycle tick and the
//! Threat Assessor's scoring tick -- and exposes their configuration and
//! event stream over a CLI.
//!
//! ## Architecture
//!
//! The runtime is built on top of [`cuas_core`] for the platform-independent
//! fusion logic, with [`tokio_graceful_shutdown`] driving startup and
//! shutdown of both subsystems plus a small event logger.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      cuas-runtime                          │
//! │  ┌───────────┐  ┌────────────────┐  ┌─────────────────────┐│
//! │  │ Cli (clap)│  │ Session        │  │ event logger        ││
//! │  │           │  │ (Arc<RwLock>)  │  │ (subscribes to bus) ││
//! │  └─────┬─────┘  └───────┬────────┘  └──────────┬──────────┘│
//! │        │                │                      │           │
//! │        ▼                ▼                      ▼           │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │   cuas_core::{TrackManager, ThreatAssessor, EventBus} │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: Starting the Runtime
//!
//! ```rust,no_run
//! use clap::Parser;
//! use cuas_runtime::{Cli, Session};
//! use tokio_graceful_shutdown::Toplevel;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = Cli::parse_from(["cuas-runtime"]);
//!
//!     Toplevel::new(|s| async move {
//!         let _session = Session::new(&s, args).await.unwrap();
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-v` - Increase verbosity (use multiple times)
//! - `-c, --config` - Path to a JSON file overriding the default Track
//!   Manager / Threat Assessor configuration

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use clap::Parser;
use cuas_core::{EventBus, ThreatAssessor, ThreatAssessorConfig, TrackManager, TrackManagerConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Path to a JSON file overriding the default Track Manager / Threat
    /// Assessor configuration. See [`RuntimeConfig`] for the expected
    /// shape.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// On-disk configuration shape loaded from `--config`. Round-trips through
/// `serde_json`, the teacher's settings-file convention.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub track_manager: TrackManagerConfig,
    #[serde(default)]
    pub threat_assessor: ThreatAssessorConfig,
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }
}

pub struct SessionInner {
    pub args: Cli,
    pub runtime_config: RuntimeConfig,
    pub track_manager: TrackManager,
    pub threat_assessor: ThreatAssessor,
    pub bus: EventBus,
}

/// Owns the fusion core for the process's lifetime. Cheaply cloneable --
/// every clone shares the same `Arc<RwLock<SessionInner>>`, the same shape
/// as the core's own `TrackManager`/`ThreatAssessor` handles.
#[derive(Clone)]
pub struct Session {
    pub inner: Arc<RwLock<SessionInner>>,
}

impl Session {
    pub fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, SessionInner>, PoisonError<RwLockReadGuard<'_, SessionInner>>> {
        self.inner.read()
    }

    pub fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, SessionInner>, PoisonError<RwLockWriteGuard<'_, SessionInner>>> {
        self.inner.write()
    }

    #[cfg(test)]
    pub fn new_fake() -> Self {
        // Builds the core wiring without starting either subsystem --
        // only use for testing.
        Self::new_base(Cli::parse_from(["cuas-runtime"]), RuntimeConfig::default())
            .expect("default runtime config is always valid")
    }

    fn new_base(args: Cli, runtime_config: RuntimeConfig) -> anyhow::Result<Self> {
        let bus = EventBus::default();
        let track_manager = TrackManager::new(runtime_config.track_manager, bus.clone())?;
        let threat_assessor =
            ThreatAssessor::new(runtime_config.threat_assessor, track_manager.clone(), bus.clone())?;
        Ok(Session {
            inner: Arc::new(RwLock::new(SessionInner {
                args,
                runtime_config,
                track_manager,
                threat_assessor,
                bus,
            })),
        })
    }

    pub async fn new(subsystem: &SubsystemHandle, args: Cli) -> anyhow::Result<Self> {
        let runtime_config = match &args.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };
        let session = Self::new_base(args, runtime_config)?;

        let track_manager = session.track_manager();
        subsystem.start(SubsystemBuilder::new("TrackManager", move |subsys| {
            run_track_manager(track_manager, subsys)
        }));

        let threat_assessor = session.threat_assessor();
        subsystem.start(SubsystemBuilder::new("ThreatAssessor", move |subsys| {
            run_threat_assessor(threat_assessor, subsys)
        }));

        let bus = session.read().unwrap().bus.clone();
        subsystem.start(SubsystemBuilder::new("EventLogger", move |subsys| {
            run_event_logger(bus, subsys)
        }));

        Ok(session)
    }

    pub fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }

    pub fn args(&self) -> Cli {
        self.read().unwrap().args.clone()
    }

    pub fn track_manager(&self) -> TrackManager {
        self.read().unwrap().track_manager.clone()
    }

    pub fn threat_assessor(&self) -> ThreatAssessor {
        self.read().unwrap().threat_assessor.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session {{ }}")
    }
}

/// Bridges the Track Manager's own internal tick loop to a
/// graceful-shutdown subsystem: start it, wait for shutdown, then stop and
/// join it. Mirrors the teacher's `CoreLocatorAdapter::run` bridge for its
/// own poll loop.
async fn run_track_manager(
    track_manager: TrackManager,
    subsys: SubsystemHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    track_manager.start();
    subsys.on_shutdown_requested().await;
    track_manager.stop().await;
    Ok(())
}

async fn run_threat_assessor(
    threat_assessor: ThreatAssessor,
    subsys: SubsystemHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    threat_assessor.start();
    subsys.on_shutdown_requested().await;
    threat_assessor.stop().await;
    Ok(())
}

/// Logs every bus event at `info`, reporting its own lag back to the bus
/// metrics when it falls behind -- the one consumer in this crate that
/// polls the bus on its own behalf.
async fn run_event_logger(
    bus: EventBus,
    subsys: SubsystemHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut rx = bus.subscribe();
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => break,
            event = rx.recv() => match event {
                Ok(event) => log::info!("{event:?}"),
                Err(RecvError::Lagged(skipped)) => {
                    bus.record_lag(skipped);
                    log::warn!("event logger lagged, dropped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
