//! Viewer activity tracking per output profile.
//!
//! Tracks recently-active client identifiers with TTL-based expiry. The
//! registry only supplies an activity signal; it never drives the supervisor
//! directly, and it uses its own locking (DashMap) that is never acquired
//! while the station lock is held.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe per-profile viewer registry.
pub struct ViewerRegistry {
    /// profile name -> (client id -> last seen)
    profiles: DashMap<String, DashMap<String, DateTime<Utc>>>,
    /// Window within which a client counts as active.
    activity_window: Duration,
}

impl ViewerRegistry {
    /// Create a registry for the given profile names.
    pub fn new(profile_names: impl IntoIterator<Item = String>, activity_window_secs: u64) -> Self {
        let profiles = DashMap::new();
        for name in profile_names {
            profiles.insert(name, DashMap::new());
        }
        Self {
            profiles,
            activity_window: Duration::seconds(activity_window_secs as i64),
        }
    }

    /// Record activity for a client on a profile. Unknown profiles are
    /// ignored; the caller validates profile names before serving.
    pub fn record(&self, profile: &str, client_id: &str) {
        if let Some(clients) = self.profiles.get(profile) {
            clients.insert(client_id.to_string(), Utc::now());
        }
    }

    /// Count clients seen within the activity window. Read-only: entries
    /// outside the window are reported as inactive but not removed here.
    pub fn active_count(&self, profile: &str, now: DateTime<Utc>) -> usize {
        self.profiles
            .get(profile)
            .map(|clients| {
                clients
                    .iter()
                    .filter(|entry| now - *entry.value() < self.activity_window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Active counts for every profile.
    pub fn counts(&self, now: DateTime<Utc>) -> HashMap<String, usize> {
        self.profiles
            .iter()
            .map(|entry| (entry.key().clone(), self.active_count(entry.key(), now)))
            .collect()
    }

    /// Remove entries older than the activity window, bounding memory to
    /// recently-seen clients.
    ///
    /// # Returns
    /// The number of entries that were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for clients in self.profiles.iter() {
            let profile = clients.key().clone();
            clients.retain(|client_id, last_seen| {
                let inactive = now - *last_seen >= self.activity_window;
                if inactive {
                    tracing::debug!(
                        profile = %profile,
                        client = %client_id,
                        "Expired viewer removed"
                    );
                    removed += 1;
                }
                !inactive
            });
        }

        if removed > 0 {
            tracing::debug!(removed, "Swept expired viewers");
        }

        removed
    }
}

/// Start a background task that periodically sweeps expired viewers.
pub fn start_sweep_task(
    registry: Arc<ViewerRegistry>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            registry.sweep(Utc::now());
        }
    })
}
