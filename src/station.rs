//! The station: playback controller and control surface.
//!
//! One instance owns the epoch and the supervisor behind a single mutex.
//! Every path that inspects or mutates the running state (lazy starts from
//! viewer requests, pause/resume/seek, the idle watchdog, the stall monitor,
//! the reaper) acquires that one lock, which is what makes "same moment for
//! everyone" hold across transitions. Callers must tolerate the lock being
//! held for up to a few seconds during an encoder relaunch; there is no
//! cancellation of an in-flight start.
//!
//! The viewer registry keeps its own independent map and is only ever
//! touched outside the station lock.

use crate::clock;
use crate::config::{ProfileConfig, StreamConfig};
use crate::epoch::{Epoch, EpochStore};
use crate::error::ControlError;
use crate::supervisor::Supervisor;
use crate::viewers::{self, ViewerRegistry};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Gate result for an artifact request: whether the stream is up and whether
/// the channel is paused. The HTTP layer decides how to serve from this.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactGate {
    pub running: bool,
    pub paused: bool,
}

/// Point-in-time channel status.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub running: bool,
    pub paused: bool,
    pub offset_secs: f64,
    pub video_duration_secs: f64,
    pub progress_percent: f64,
    /// Offset formatted `HH:MM:SS`.
    pub position: String,
    pub viewers: HashMap<String, usize>,
}

struct StationInner {
    epoch: Epoch,
    supervisor: Supervisor,
}

/// The single station instance, shared by the HTTP layer and the background
/// tasks.
pub struct Station {
    inner: Mutex<StationInner>,
    store: EpochStore,
    viewers: Arc<ViewerRegistry>,
    video_duration_secs: f64,
    profiles: Vec<ProfileConfig>,
    timing: StreamConfig,
}

impl Station {
    pub fn new(
        store: EpochStore,
        epoch: Epoch,
        supervisor: Supervisor,
        video_duration_secs: f64,
        profiles: Vec<ProfileConfig>,
        timing: StreamConfig,
    ) -> Self {
        let viewers = Arc::new(ViewerRegistry::new(
            profiles.iter().map(|p| p.name.clone()),
            timing.activity_window_secs,
        ));
        Self {
            inner: Mutex::new(StationInner { epoch, supervisor }),
            store,
            viewers,
            video_duration_secs,
            profiles,
            timing,
        }
    }

    fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Handle an inbound stream artifact request: record viewer liveness,
    /// refresh the idle timer, and lazily start the encoder if the channel
    /// is playing but the encoder is down.
    pub async fn request_artifact(
        &self,
        profile: &str,
        client_id: &str,
    ) -> Result<ArtifactGate, ControlError> {
        if self.profile(profile).is_none() {
            return Err(ControlError::UnknownProfile(profile.to_string()));
        }

        // Registry first, outside the station lock.
        self.viewers.record(profile, client_id);

        let mut inner = self.inner.lock().await;
        inner.supervisor.touch();

        if !inner.epoch.paused && !inner.supervisor.is_running() {
            let offset = clock::current_offset(Utc::now(), &inner.epoch, self.video_duration_secs);
            inner.supervisor.start(offset).await?;
        }

        Ok(ArtifactGate {
            running: inner.supervisor.is_running(),
            paused: inner.epoch.paused,
        })
    }

    /// Freeze playback at the current offset. No-op if already paused.
    pub async fn pause(&self) -> Result<(), ControlError> {
        let mut inner = self.inner.lock().await;
        if inner.epoch.paused {
            return Ok(());
        }

        inner.supervisor.stop().await;

        let offset = clock::current_offset(Utc::now(), &inner.epoch, self.video_duration_secs);
        inner.epoch.paused = true;
        inner.epoch.paused_offset_secs = offset;
        self.persist(&inner.epoch)?;

        tracing::info!(offset_secs = format_args!("{:.2}", offset), "Paused");
        Ok(())
    }

    /// Resume playback from the frozen offset. No-op if not paused.
    ///
    /// Rebases the origin so the offset computed immediately afterward
    /// reproduces the pause offset, then starts the encoder eagerly rather
    /// than waiting for the next viewer request.
    pub async fn resume(&self) -> Result<(), ControlError> {
        let mut inner = self.inner.lock().await;
        if !inner.epoch.paused {
            return Ok(());
        }

        let offset = inner.epoch.paused_offset_secs;
        inner.epoch.origin =
            Utc::now() - ChronoDuration::milliseconds((offset * 1000.0) as i64);
        inner.epoch.paused = false;
        inner.epoch.paused_offset_secs = 0.0;
        self.persist(&inner.epoch)?;

        tracing::info!(offset_secs = format_args!("{:.2}", offset), "Resumed");
        inner.supervisor.start(offset).await
    }

    /// Jump to a target offset, staying paused if paused, relaunching the
    /// encoder immediately if playing.
    pub async fn seek(&self, target_secs: f64) -> Result<(), ControlError> {
        if !(target_secs >= 0.0 && target_secs < self.video_duration_secs) {
            return Err(ControlError::InvalidSeekTarget {
                target_secs,
                duration_secs: self.video_duration_secs,
            });
        }

        let mut inner = self.inner.lock().await;
        inner.supervisor.stop().await;

        if inner.epoch.paused {
            inner.epoch.paused_offset_secs = target_secs;
            self.persist(&inner.epoch)?;
            tracing::info!(target_secs, "Seeked while paused");
            return Ok(());
        }

        inner.epoch.origin =
            Utc::now() - ChronoDuration::milliseconds((target_secs * 1000.0) as i64);
        self.persist(&inner.epoch)?;
        tracing::info!(target_secs, "Seeked");
        inner.supervisor.start(target_secs).await
    }

    /// Point-in-time status for the control surface.
    pub async fn snapshot(&self) -> Snapshot {
        let now = Utc::now();
        let viewers = self.viewers.counts(now);

        let inner = self.inner.lock().await;
        let offset = clock::current_offset(now, &inner.epoch, self.video_duration_secs);

        Snapshot {
            running: inner.supervisor.is_running(),
            paused: inner.epoch.paused,
            offset_secs: offset,
            video_duration_secs: self.video_duration_secs,
            progress_percent: clock::progress_percent(offset, self.video_duration_secs),
            position: clock::format_position(offset),
            viewers,
        }
    }

    /// Idle watchdog tick.
    pub async fn run_idle_check(&self) {
        self.inner.lock().await.supervisor.check_idle().await;
    }

    /// Stall monitor tick.
    pub async fn run_stall_check(&self) {
        self.inner.lock().await.supervisor.check_stall();
    }

    /// Reaper tick.
    pub async fn run_exit_check(&self) {
        self.inner.lock().await.supervisor.check_exit();
    }

    /// Stop the encoder; used on shutdown and after a fatal report.
    pub async fn shutdown(&self) {
        self.inner.lock().await.supervisor.stop().await;
    }

    /// Spawn the periodic background tasks: idle watchdog, stall monitor,
    /// reaper, and viewer sweep.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let station = Arc::clone(self);
        let tick = self.timing.watchdog_interval_secs;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                station.run_idle_check().await;
            }
        }));

        let station = Arc::clone(self);
        let tick = self.timing.watchdog_interval_secs;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                station.run_stall_check().await;
            }
        }));

        let station = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                station.run_exit_check().await;
            }
        }));

        handles.push(viewers::start_sweep_task(
            Arc::clone(&self.viewers),
            self.timing.sweep_interval_secs,
        ));

        handles
    }

    fn persist(&self, epoch: &Epoch) -> Result<(), ControlError> {
        self.store
            .persist(epoch)
            .map_err(|e| ControlError::EpochPersist(e.to_string()))
    }
}
