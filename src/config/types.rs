use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default = "default_profiles")]
    pub profiles: Vec<ProfileConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            media: MediaConfig::default(),
            stream: StreamConfig::default(),
            tools: ToolsConfig::default(),
            profiles: default_profiles(),
        }
    }
}

impl Config {
    /// Look up a configured output profile by name.
    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// The single source video the channel loops forever.
    #[serde(default)]
    pub source: PathBuf,

    /// Root directory for encoder output; each profile writes into its own
    /// subdirectory.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Path of the persisted epoch file.
    #[serde(default = "default_epoch_path")]
    pub epoch_path: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./stream")
}
fn default_epoch_path() -> PathBuf {
    PathBuf::from("./epoch.json")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            output_dir: default_output_dir(),
            epoch_path: default_epoch_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Seconds without viewer activity before the encoder is stopped.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds the primary playlist may go without advancing before the
    /// stream is considered stalled (fatal).
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,

    /// Seconds `start()` waits for the primary playlist to appear.
    #[serde(default = "default_playlist_wait")]
    pub playlist_wait_secs: u64,

    /// Seconds `stop()` waits for the encoder to exit after SIGTERM.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Seconds a viewer counts as active after its last request.
    #[serde(default = "default_activity_window")]
    pub activity_window_secs: u64,

    /// Tick interval for the idle watchdog and stall monitor.
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_secs: u64,

    /// Tick interval for the viewer registry sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_idle_timeout() -> u64 {
    30
}
fn default_stall_timeout() -> u64 {
    30
}
fn default_playlist_wait() -> u64 {
    10
}
fn default_stop_grace() -> u64 {
    5
}
fn default_activity_window() -> u64 {
    60
}
fn default_watchdog_interval() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    10
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            stall_timeout_secs: default_stall_timeout(),
            playlist_wait_secs: default_playlist_wait(),
            stop_grace_secs: default_stop_grace(),
            activity_window_secs: default_activity_window(),
            watchdog_interval_secs: default_watchdog_interval(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Explicit ffmpeg path; falls back to PATH lookup.
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    /// Explicit ffprobe path; falls back to PATH lookup.
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
}

/// One output rendition. Profiles are read-only configuration; they share
/// the source offset but have independent segment durations and therefore
/// independent sequence numbers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileConfig {
    pub name: String,

    pub segment_duration_secs: u32,

    #[serde(default = "default_segment_extension")]
    pub segment_extension: String,

    #[serde(default = "default_playlist_name")]
    pub playlist_name: String,

    #[serde(default = "default_list_size")]
    pub list_size: u32,
}

fn default_segment_extension() -> String {
    "ts".to_string()
}
fn default_playlist_name() -> String {
    "live.m3u8".to_string()
}
fn default_list_size() -> u32 {
    6
}

/// The two stock profiles: a standard rendition and a low-latency one with
/// shorter segments and a deeper playlist.
pub fn default_profiles() -> Vec<ProfileConfig> {
    vec![
        ProfileConfig {
            name: "standard".to_string(),
            segment_duration_secs: 4,
            segment_extension: default_segment_extension(),
            playlist_name: default_playlist_name(),
            list_size: 6,
        },
        ProfileConfig {
            name: "lowlatency".to_string(),
            segment_duration_secs: 1,
            segment_extension: default_segment_extension(),
            playlist_name: default_playlist_name(),
            list_size: 12,
        },
    ]
}
