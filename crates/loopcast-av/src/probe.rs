//! FFprobe-based media probing.
//!
//! Loopcast only needs the container duration of the single source video, so
//! the probe surface is deliberately small: one invocation, one number.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Duration and container info for a source video.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    /// Total duration in seconds (fractional).
    pub duration_secs: f64,
    /// Container format name as reported by ffprobe.
    pub container: String,
}

/// Probe a media file with ffprobe and return its duration.
///
/// # Errors
///
/// Fails if ffprobe is missing, exits non-zero, or reports no parseable
/// duration. The caller treats any of these as fatal at boot.
pub fn probe_source(ffprobe: &Path, path: &Path) -> Result<SourceInfo> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    let ff_output: FfprobeOutput = serde_json::from_str(&json_str)?;

    let duration_secs = ff_output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| Error::parse_error("ffprobe", "no duration in format section"))?;

    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(Error::parse_error(
            "ffprobe",
            format!("nonsensical duration: {}", duration_secs),
        ));
    }

    Ok(SourceInfo {
        duration_secs,
        container: ff_output.format.format_name.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_probe_missing_tool() {
        let result = probe_source(
            &PathBuf::from("nonexistent_ffprobe_12345"),
            Path::new("/no/such/file.mp4"),
        );
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[test]
    fn test_parse_duration_json() {
        let json = r#"{"format":{"format_name":"mov,mp4","duration":"5400.120000"}}"#;
        let out: FfprobeOutput = serde_json::from_str(json).unwrap();
        let d = out.format.duration.unwrap().parse::<f64>().unwrap();
        assert!((d - 5400.12).abs() < 1e-9);
    }
}
