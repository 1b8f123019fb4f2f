//! Long-running HLS encoder launch.
//!
//! The encoder is an external ffmpeg process that reads the looping source at
//! a given seek offset and continuously writes a playlist plus numbered
//! segments into one directory per output. Loopcast never repositions a
//! running encoder; a new offset always means terminate-and-relaunch, so the
//! only operation this module exposes is spawning a child at an offset.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// One encoder output: a segmented HLS rendition written into its own
/// directory.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// Directory the playlist and segments are written into.
    pub dir: PathBuf,
    /// Playlist file name, e.g. `live.m3u8`.
    pub playlist_name: String,
    /// Target segment duration in seconds.
    pub segment_duration_secs: u32,
    /// Segment file extension without the dot, e.g. `ts`.
    pub segment_extension: String,
    /// Sequence number of the first segment written by this launch.
    pub start_number: u64,
    /// Number of segments kept in the playlist.
    pub list_size: u32,
}

impl OutputSpec {
    /// Path of the playlist file for this output.
    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(&self.playlist_name)
    }

    /// ffmpeg segment filename pattern for this output.
    pub fn segment_pattern(&self) -> PathBuf {
        self.dir.join(format!("seg%d.{}", self.segment_extension))
    }
}

/// A complete encoder launch description.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// The single source video.
    pub source: PathBuf,
    /// Seconds into the source to start encoding at.
    pub seek_offset_secs: f64,
    /// One entry per output profile.
    pub outputs: Vec<OutputSpec>,
}

/// Seam for launching the external encoder.
///
/// Production uses [`FfmpegTranscoder`]; tests substitute a fake that spawns a
/// cheap long-lived process and writes the playlist itself.
pub trait Transcoder: Send + Sync {
    /// Spawn the encoder for the given job. The returned child runs until
    /// terminated by the caller; a non-zero exit is observed by the caller's
    /// reaper, not here.
    fn launch(&self, job: &EncodeJob) -> Result<Child>;
}

/// Launches a real ffmpeg process encoding all outputs from one input.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
}

impl FfmpegTranscoder {
    /// Create a transcoder using the given ffmpeg binary.
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    fn build_args(job: &EncodeJob) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            // Read at native frame rate so the playlist edge tracks wall
            // clock instead of racing ahead of it.
            "-re".to_string(),
            "-ss".to_string(),
            format!("{:.2}", job.seek_offset_secs),
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            job.source.to_string_lossy().to_string(),
        ];

        for output in &job.outputs {
            args.extend([
                "-map".to_string(),
                "0:v:0".to_string(),
                "-map".to_string(),
                "0:a:0?".to_string(),
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                "fast".to_string(),
                "-crf".to_string(),
                "23".to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                "128k".to_string(),
                "-f".to_string(),
                "hls".to_string(),
                "-hls_time".to_string(),
                output.segment_duration_secs.to_string(),
                "-hls_list_size".to_string(),
                output.list_size.to_string(),
                "-hls_flags".to_string(),
                "delete_segments".to_string(),
                "-start_number".to_string(),
                output.start_number.to_string(),
                "-hls_segment_filename".to_string(),
                output.segment_pattern().to_string_lossy().to_string(),
                output.playlist_path().to_string_lossy().to_string(),
            ]);
        }

        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn launch(&self, job: &EncodeJob) -> Result<Child> {
        if job.outputs.is_empty() {
            return Err(Error::InvalidInput("encode job has no outputs".into()));
        }

        for output in &job.outputs {
            std::fs::create_dir_all(&output.dir)?;
        }

        let args = Self::build_args(job);
        tracing::debug!(ffmpeg = %self.ffmpeg.display(), ?args, "Launching encoder");

        let child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool_failed("ffmpeg", format!("failed to spawn: {}", e)))?;

        Ok(child)
    }
}

/// Delete leftover segment files from a previous run of one output.
///
/// A relaunched encoder starts a fresh playlist; stale segments referenced by
/// the old playlist must not linger next to the new ones.
pub fn evict_stale_segments(output: &OutputSpec) -> Result<usize> {
    let mut removed = 0;
    let entries = match std::fs::read_dir(&output.dir) {
        Ok(entries) => entries,
        // Directory not created yet means nothing to evict.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let suffix = format!(".{}", output.segment_extension);
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(&suffix) || name == output.playlist_name {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dir: &Path) -> OutputSpec {
        OutputSpec {
            dir: dir.to_path_buf(),
            playlist_name: "live.m3u8".to_string(),
            segment_duration_secs: 4,
            segment_extension: "ts".to_string(),
            start_number: 12,
            list_size: 6,
        }
    }

    #[test]
    fn test_build_args_single_output() {
        let job = EncodeJob {
            source: PathBuf::from("/media/movie.mp4"),
            seek_offset_secs: 50.0,
            outputs: vec![spec(Path::new("/tmp/out/standard"))],
        };

        let args = FfmpegTranscoder::build_args(&job);
        assert!(args.contains(&"-stream_loop".to_string()));
        assert!(args.contains(&"50.00".to_string()));
        assert!(args.contains(&"12".to_string()));
        assert!(args.contains(&"delete_segments".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out/standard/live.m3u8");
    }

    #[test]
    fn test_build_args_two_outputs_independent_numbers() {
        let mut low = spec(Path::new("/tmp/out/lowlatency"));
        low.segment_duration_secs = 1;
        low.start_number = 50;

        let job = EncodeJob {
            source: PathBuf::from("/media/movie.mp4"),
            seek_offset_secs: 50.0,
            outputs: vec![spec(Path::new("/tmp/out/standard")), low],
        };

        let args = FfmpegTranscoder::build_args(&job);
        let hls_time_positions: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.as_str() == "-hls_time")
            .map(|(i, _)| args[i + 1].clone())
            .collect();
        assert_eq!(hls_time_positions, vec!["4", "1"]);

        let start_numbers: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.as_str() == "-start_number")
            .map(|(i, _)| args[i + 1].clone())
            .collect();
        assert_eq!(start_numbers, vec!["12", "50"]);
    }

    #[test]
    fn test_evict_stale_segments() {
        let dir = tempfile::tempdir().unwrap();
        let output = spec(dir.path());

        std::fs::write(dir.path().join("seg11.ts"), b"x").unwrap();
        std::fs::write(dir.path().join("seg12.ts"), b"x").unwrap();
        std::fs::write(dir.path().join("live.m3u8"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        let removed = evict_stale_segments(&output).unwrap();
        assert_eq!(removed, 3);
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("seg11.ts").exists());
    }

    #[test]
    fn test_evict_missing_dir_is_noop() {
        let output = spec(Path::new("/no/such/dir/loopcast_test"));
        assert_eq!(evict_stale_segments(&output).unwrap(), 0);
    }
}
