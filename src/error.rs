//! Core error taxonomy.
//!
//! Two families, deliberately kept apart: [`ControlError`] covers conditions
//! the immediate caller can handle (reject a bad seek, retry a stream start),
//! while [`Fatal`] covers conditions where the whole process should die and be
//! restarted by an external supervisor. The core only ever *reports* a
//! [`Fatal`] over a channel; translating it into process exit is the entry
//! point's job.

/// Recoverable or surfaced-to-caller errors from the control surface.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Seek target outside `[0, videoDuration)`.
    #[error("seek target {target_secs}s outside [0, {duration_secs}s)")]
    InvalidSeekTarget { target_secs: f64, duration_secs: f64 },

    /// The encoder launched but its playlist never appeared on disk.
    #[error("encoder playlist did not appear within {waited_secs}s")]
    PlaylistTimeout { waited_secs: u64 },

    /// Request referenced a profile that is not configured.
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    /// The encoder process could not be spawned. Also reported as
    /// [`Fatal::LaunchFailed`]; this variant fails the triggering request
    /// while the process winds down.
    #[error("encoder launch failed: {0}")]
    LaunchFailed(String),

    /// Writing the epoch file failed mid-transition.
    #[error("failed to persist epoch: {0}")]
    EpochPersist(String),
}

/// Process-ending conditions.
///
/// Resilience is delegated to an external restart policy; nothing in the core
/// retries these.
#[derive(Debug, thiserror::Error)]
pub enum Fatal {
    /// The encoder process could not be spawned. Treated as a persistent
    /// environment fault (missing binary, missing hardware acceleration)
    /// rather than a transient one.
    #[error("encoder launch failed: {0}")]
    LaunchFailed(String),

    /// The encoder exited while the supervisor believed it should be running.
    #[error("encoder exited unexpectedly ({status})")]
    UnexpectedExit { status: String },

    /// The encoder is alive but its playlist stopped advancing.
    #[error("stream stalled: {playlist} not updated for {stalled_secs}s")]
    Stalled { playlist: String, stalled_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_display() {
        let err = ControlError::InvalidSeekTarget {
            target_secs: 120.0,
            duration_secs: 100.0,
        };
        assert_eq!(err.to_string(), "seek target 120s outside [0, 100s)");

        let err = ControlError::UnknownProfile("hd".to_string());
        assert_eq!(err.to_string(), "unknown profile: hd");
    }

    #[test]
    fn test_fatal_display() {
        let err = Fatal::Stalled {
            playlist: "live.m3u8".to_string(),
            stalled_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "stream stalled: live.m3u8 not updated for 30s"
        );
    }
}
