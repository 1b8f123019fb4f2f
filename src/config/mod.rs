mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./loopcast.toml",
        "~/.config/loopcast/config.toml",
        "/etc/loopcast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.profiles.is_empty() {
        anyhow::bail!("At least one output profile must be configured");
    }

    let mut seen = std::collections::HashSet::new();
    for profile in &config.profiles {
        if profile.name.is_empty() {
            anyhow::bail!("Profile name cannot be empty");
        }
        if !seen.insert(profile.name.as_str()) {
            anyhow::bail!("Duplicate profile name: '{}'", profile.name);
        }
        if profile.segment_duration_secs == 0 {
            anyhow::bail!("Profile '{}' has zero segment duration", profile.name);
        }
        if profile.list_size == 0 {
            anyhow::bail!("Profile '{}' has zero playlist size", profile.name);
        }
        if profile.segment_extension.is_empty() {
            anyhow::bail!("Profile '{}' has no segment extension", profile.name);
        }
    }

    if !config.media.source.as_os_str().is_empty() && !config.media.source.exists() {
        tracing::warn!("Source video does not exist: {:?}", config.media.source);
    }

    Ok(())
}
