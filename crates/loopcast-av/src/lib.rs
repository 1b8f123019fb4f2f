//! External encoder and probe tooling for loopcast.
//!
//! Everything that touches ffmpeg/ffprobe lives here: tool discovery, the
//! boot-time duration probe, and the long-running HLS encoder launch. The
//! core crate treats the encoder as a black box behind the [`Transcoder`]
//! trait and never builds command lines itself.

mod error;

pub mod encoder;
pub mod probe;
pub mod tools;

pub use encoder::{evict_stale_segments, EncodeJob, FfmpegTranscoder, OutputSpec, Transcoder};
pub use error::{Error, Result};
pub use probe::{probe_source, SourceInfo};
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};
