//! The persisted epoch: the single source of truth for playback position.
//!
//! The epoch records the instant the channel "went on air" plus any pause or
//! seek overrides. It is created once on first boot, loaded on every boot
//! thereafter, and rewritten synchronously on every mutation so that a
//! process restart reconstructs the exact same playback position.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted playback epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epoch {
    /// The origin instant all offsets are computed from.
    pub origin: DateTime<Utc>,
    /// Whether playback is paused.
    #[serde(default)]
    pub paused: bool,
    /// Frozen offset while paused. Only meaningful when `paused` is true;
    /// always in `[0, videoDuration)`.
    #[serde(default)]
    pub paused_offset_secs: f64,
}

impl Epoch {
    /// A fresh epoch starting playback at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            origin: now,
            paused: false,
            paused_offset_secs: 0.0,
        }
    }
}

/// Loads and persists the epoch file.
#[derive(Debug, Clone)]
pub struct EpochStore {
    path: PathBuf,
}

impl EpochStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted epoch, or create and persist a fresh one if the
    /// file does not exist. An unreadable file is replaced rather than
    /// treated as fatal, matching first-boot behavior.
    pub fn load_or_create(&self, now: DateTime<Utc>) -> Result<Epoch> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Epoch>(&content) {
                Ok(epoch) => {
                    tracing::info!(
                        origin = %epoch.origin,
                        paused = epoch.paused,
                        "Loaded epoch"
                    );
                    Ok(epoch)
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Epoch file unreadable, creating a fresh one"
                    );
                    self.create(now)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.create(now),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read epoch file: {:?}", self.path))
            }
        }
    }

    /// Rewrite the epoch file. Called synchronously on every pause, resume
    /// and seek.
    pub fn persist(&self, epoch: &Epoch) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create epoch dir: {:?}", parent))?;
            }
        }

        let content = serde_json::to_string_pretty(epoch).context("Failed to serialize epoch")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write epoch file: {:?}", self.path))?;

        Ok(())
    }

    fn create(&self, now: DateTime<Utc>) -> Result<Epoch> {
        let epoch = Epoch::new(now);
        self.persist(&epoch)?;
        tracing::info!(origin = %epoch.origin, "Created new epoch");
        Ok(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;

    #[test]
    fn test_create_on_first_boot() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpochStore::new(dir.path().join("epoch.json"));
        let now = Utc::now();

        let epoch = store.load_or_create(now).unwrap();
        assert_eq!(epoch.origin, now);
        assert!(!epoch.paused);
        assert!(store.path().exists());
    }

    #[test]
    fn test_reload_preserves_origin() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpochStore::new(dir.path().join("epoch.json"));
        let now = Utc::now();

        let first = store.load_or_create(now).unwrap();
        let second = store
            .load_or_create(now + chrono::Duration::seconds(500))
            .unwrap();
        assert_eq!(first.origin, second.origin);
    }

    #[test]
    fn test_offset_idempotent_under_restart() {
        // The same wall-clock instant yields the same offset before and
        // after a reload of the persisted epoch.
        let dir = tempfile::tempdir().unwrap();
        let store = EpochStore::new(dir.path().join("epoch.json"));
        let boot = Utc::now();

        let epoch = store.load_or_create(boot).unwrap();
        let later = boot + chrono::Duration::seconds(73);
        let before_restart = clock::current_offset(later, &epoch, 100.0);

        let reloaded = store.load_or_create(later).unwrap();
        let after_restart = clock::current_offset(later, &reloaded, 100.0);
        assert!((before_restart - after_restart).abs() < 1e-6);
    }

    #[test]
    fn test_persist_round_trips_pause_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpochStore::new(dir.path().join("epoch.json"));
        let now = Utc::now();

        let mut epoch = store.load_or_create(now).unwrap();
        epoch.paused = true;
        epoch.paused_offset_secs = 42.25;
        store.persist(&epoch).unwrap();

        let reloaded = store.load_or_create(now).unwrap();
        assert!(reloaded.paused);
        assert_eq!(reloaded.paused_offset_secs, 42.25);
    }

    #[test]
    fn test_corrupt_file_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epoch.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = EpochStore::new(&path);
        let now = Utc::now();
        let epoch = store.load_or_create(now).unwrap();
        assert_eq!(epoch.origin, now);

        // The replacement was persisted.
        let reloaded = store
            .load_or_create(now + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(reloaded.origin, now);
    }
}
