//! Transcoder supervisor: lifecycle of the external encoder process.
//!
//! The supervisor owns the encoder child and a small state machine
//! (`Stopped -> Starting -> Running -> Stopping -> Stopped`). It has no lock
//! of its own: every method takes `&mut self` and the station serializes all
//! access behind its single mutex, so a lazy start from a viewer request can
//! never race a pause or seek.
//!
//! Anomalies are split per the error taxonomy: a playlist that never appears
//! is surfaced to the caller and the supervisor returns to `Stopped` (safe to
//! retry); a launch failure, an unexpected child exit, or a stalled playlist
//! are reported on the fatal channel and end the process under external
//! supervision. There is no in-process retry.

use crate::clock;
use crate::config::{ProfileConfig, StreamConfig};
use crate::error::{ControlError, Fatal};
use loopcast_av::{evict_stale_segments, EncodeJob, OutputSpec, Transcoder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::process::Child;
use tokio::sync::mpsc;

/// Supervisor state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Owns the encoder child process and drives its lifecycle.
pub struct Supervisor {
    transcoder: Arc<dyn Transcoder>,
    source: PathBuf,
    output_dir: PathBuf,
    profiles: Vec<ProfileConfig>,
    timing: StreamConfig,
    fatal_tx: mpsc::UnboundedSender<Fatal>,

    phase: Phase,
    /// Valid iff the phase is `Starting` or `Running`.
    child: Option<Child>,
    last_activity: Instant,
}

impl Supervisor {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        source: PathBuf,
        output_dir: PathBuf,
        profiles: Vec<ProfileConfig>,
        timing: StreamConfig,
        fatal_tx: mpsc::UnboundedSender<Fatal>,
    ) -> Self {
        Self {
            transcoder,
            source,
            output_dir,
            profiles,
            timing,
            fatal_tx,
            phase: Phase::Stopped,
            child: None,
            last_activity: Instant::now(),
        }
    }

    /// Whether the encoder is up (or coming up).
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Starting | Phase::Running)
    }

    /// Refresh the idle timer. Called on every inbound stream request.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn output_spec(&self, profile: &ProfileConfig, offset_secs: f64) -> OutputSpec {
        OutputSpec {
            dir: self.output_dir.join(&profile.name),
            playlist_name: profile.playlist_name.clone(),
            segment_duration_secs: profile.segment_duration_secs,
            segment_extension: profile.segment_extension.clone(),
            start_number: clock::segment_sequence(
                offset_secs,
                f64::from(profile.segment_duration_secs),
            ),
            list_size: profile.list_size,
        }
    }

    /// Path of the primary profile's playlist, the artifact the playlist
    /// wait and the stall monitor both watch.
    pub fn primary_playlist(&self) -> PathBuf {
        let primary = &self.profiles[0];
        self.output_dir
            .join(&primary.name)
            .join(&primary.playlist_name)
    }

    /// Launch the encoder at the given offset. No-op if already up.
    ///
    /// Evicts stale segments from every profile directory first, then spawns
    /// the encoder with one output per profile (each with its own starting
    /// sequence number), then blocks until the primary playlist appears or
    /// the bounded wait expires.
    pub async fn start(&mut self, offset_secs: f64) -> Result<(), ControlError> {
        if self.is_running() {
            return Ok(());
        }

        self.phase = Phase::Starting;

        let outputs: Vec<OutputSpec> = self
            .profiles
            .iter()
            .map(|p| self.output_spec(p, offset_secs))
            .collect();

        for output in &outputs {
            match evict_stale_segments(output) {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(dir = %output.dir.display(), removed, "Evicted stale segments");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(dir = %output.dir.display(), error = %e, "Stale segment eviction failed");
                }
            }
        }

        let job = EncodeJob {
            source: self.source.clone(),
            seek_offset_secs: offset_secs,
            outputs,
        };

        tracing::info!(
            offset_secs = format_args!("{:.2}", offset_secs),
            "Starting encoder"
        );

        let child = match self.transcoder.launch(&job) {
            Ok(child) => child,
            Err(e) => {
                self.phase = Phase::Stopped;
                let message = e.to_string();
                tracing::error!(error = %message, "Encoder launch failed");
                let _ = self.fatal_tx.send(Fatal::LaunchFailed(message.clone()));
                return Err(ControlError::LaunchFailed(message));
            }
        };

        self.child = Some(child);
        self.phase = Phase::Running;
        self.touch();

        // Block the caller until the stream is actually servable.
        let playlist = self.primary_playlist();
        let waited_secs = self.timing.playlist_wait_secs;
        let deadline = Instant::now() + Duration::from_secs(waited_secs);
        while !playlist.exists() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    playlist = %playlist.display(),
                    waited_secs,
                    "Playlist did not appear, stopping encoder"
                );
                self.stop().await;
                return Err(ControlError::PlaylistTimeout { waited_secs });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::info!(playlist = %playlist.display(), "Encoder running");
        Ok(())
    }

    /// Terminate the encoder gracefully. No-op if already stopped.
    ///
    /// Transitions to `Stopped` unconditionally afterward, even when the
    /// termination signal fails, so the supervisor cannot wedge.
    pub async fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }

        self.phase = Phase::Stopping;

        if let Some(mut child) = self.child.take() {
            tracing::info!("Stopping encoder");
            terminate(&mut child, Duration::from_secs(self.timing.stop_grace_secs)).await;
        }

        self.phase = Phase::Stopped;
    }

    /// Idle watchdog tick: stop the encoder when no viewer activity has been
    /// recorded within the idle timeout.
    pub async fn check_idle(&mut self) {
        if self.phase != Phase::Running {
            return;
        }

        let idle = self.last_activity.elapsed();
        if idle > Duration::from_secs(self.timing.idle_timeout_secs) {
            tracing::info!(idle_secs = idle.as_secs(), "Idle timeout reached");
            self.stop().await;
        }
    }

    /// Stall monitor tick: the primary playlist must keep advancing while
    /// the encoder runs; a frozen playlist with a live process is fatal.
    pub fn check_stall(&mut self) {
        if self.phase != Phase::Running {
            return;
        }

        let playlist = self.primary_playlist();
        let modified = match std::fs::metadata(&playlist).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return,
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age > Duration::from_secs(self.timing.stall_timeout_secs) {
            let stalled_secs = age.as_secs();
            tracing::error!(
                playlist = %playlist.display(),
                stalled_secs,
                "Stream stalled"
            );
            let _ = self.fatal_tx.send(Fatal::Stalled {
                playlist: playlist.display().to_string(),
                stalled_secs,
            });
        }
    }

    /// Reaper tick: observe the child's exit independently of stop(). An
    /// exit while the supervisor still believes it should be running is
    /// fatal; a partially-written segment set with no producer is worse than
    /// a hard restart.
    pub fn check_exit(&mut self) {
        if self.phase != Phase::Running {
            return;
        }

        let Some(child) = self.child.as_mut() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::error!(%status, "Encoder exited unexpectedly");
                self.child = None;
                self.phase = Phase::Stopped;
                let _ = self.fatal_tx.send(Fatal::UnexpectedExit {
                    status: status.to_string(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll encoder status");
            }
        }
    }
}

/// Send a graceful termination signal, wait up to `grace`, then kill.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!(error = %e, "SIGTERM failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(%status, "Encoder exited");
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Error waiting for encoder exit");
        }
        Err(_) => {
            tracing::warn!(grace_secs = grace.as_secs(), "Encoder ignored SIGTERM, killing");
            let _ = child.start_kill();
            let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
        }
    }
}
