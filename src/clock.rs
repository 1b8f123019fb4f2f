//! The broadcast clock: pure position math.
//!
//! Every viewer who joins at a given wall-clock instant must see the same
//! frame, so playback position is never tracked as mutable state; it is
//! derived on demand from `now`, the persisted epoch, and the probed video
//! duration. Everything here is a free function over value inputs: no I/O,
//! no locking, fully deterministic.

use crate::epoch::Epoch;
use chrono::{DateTime, Utc};

/// Seconds into the source video at instant `now`, always in
/// `[0, video_duration_secs)`.
///
/// While paused the offset is frozen at the persisted pause offset. While
/// playing it is the elapsed time since the epoch origin, wrapped into the
/// current loop with a floor modulo. Negative elapsed time (clock skew after
/// a restart) clamps to zero rather than wrapping backwards.
pub fn current_offset(now: DateTime<Utc>, epoch: &Epoch, video_duration_secs: f64) -> f64 {
    if epoch.paused {
        return epoch.paused_offset_secs;
    }

    let elapsed = (now - epoch.origin).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return 0.0;
    }

    elapsed % video_duration_secs
}

/// Segment sequence number for a profile with the given segment duration.
///
/// The number is derived from the offset within the *current loop*, not from
/// global elapsed time: when the loop wraps, the sequence resets to near
/// zero. Players observing the wrap instant may therefore see a playlist
/// discontinuity. This is a known limitation of the numbering scheme, kept
/// intentionally; each profile gets its own number from the same offset and
/// its own segment duration, never a shared counter.
pub fn segment_sequence(offset_secs: f64, segment_duration_secs: f64) -> u64 {
    (offset_secs / segment_duration_secs).floor() as u64
}

/// Progress through the loop as a percentage.
pub fn progress_percent(offset_secs: f64, video_duration_secs: f64) -> f64 {
    (offset_secs / video_duration_secs) * 100.0
}

/// Format an offset as `HH:MM:SS` for status displays.
pub fn format_position(offset_secs: f64) -> String {
    let total = offset_secs.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn playing_epoch(origin: DateTime<Utc>) -> Epoch {
        Epoch {
            origin,
            paused: false,
            paused_offset_secs: 0.0,
        }
    }

    #[test]
    fn test_offset_within_first_loop() {
        let origin = Utc::now();
        let now = origin + Duration::seconds(42);
        let offset = current_offset(now, &playing_epoch(origin), 100.0);
        assert!((offset - 42.0).abs() < 1e-6);
    }

    #[test]
    fn test_offset_wraps_after_duration() {
        // elapsed = 250s, duration = 100s -> offset = 50s
        let origin = Utc::now();
        let now = origin + Duration::seconds(250);
        let offset = current_offset(now, &playing_epoch(origin), 100.0);
        assert!((offset - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_offset_wraps_for_any_loop_count() {
        let origin = Utc::now();
        let duration = 100.0;
        for k in [0i64, 1, 7, 1000] {
            let now = origin + Duration::seconds(k * 100 + 37);
            let offset = current_offset(now, &playing_epoch(origin), duration);
            assert!((offset - 37.0).abs() < 1e-6, "k = {}", k);
        }
    }

    #[test]
    fn test_negative_elapsed_clamps_to_zero() {
        // Wall clock behind the persisted origin after a restart.
        let origin = Utc::now();
        let now = origin - Duration::seconds(30);
        let offset = current_offset(now, &playing_epoch(origin), 100.0);
        assert_eq!(offset, 0.0);
    }

    #[test]
    fn test_paused_offset_is_frozen() {
        let origin = Utc::now();
        let epoch = Epoch {
            origin,
            paused: true,
            paused_offset_secs: 61.5,
        };
        let now = origin + Duration::seconds(999);
        assert_eq!(current_offset(now, &epoch, 100.0), 61.5);
    }

    #[test]
    fn test_fractional_elapsed() {
        let origin = Utc::now();
        let now = origin + Duration::milliseconds(1_500);
        let offset = current_offset(now, &playing_epoch(origin), 100.0);
        assert!((offset - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_segment_sequence() {
        // floor(50 / 4) = 12
        assert_eq!(segment_sequence(50.0, 4.0), 12);
        assert_eq!(segment_sequence(0.0, 4.0), 0);
        assert_eq!(segment_sequence(3.999, 4.0), 0);
        assert_eq!(segment_sequence(4.0, 4.0), 1);
    }

    #[test]
    fn test_segment_sequence_per_profile() {
        // Same offset, independent durations, independent numbers.
        let offset = 50.0;
        assert_eq!(segment_sequence(offset, 4.0), 12);
        assert_eq!(segment_sequence(offset, 1.0), 50);
    }

    #[test]
    fn test_sequence_resets_at_wrap() {
        // One second before the wrap vs one second after: the number falls
        // back to near zero instead of continuing to grow.
        let duration = 100.0;
        let origin = Utc::now();
        let before =
            current_offset(origin + Duration::seconds(99), &playing_epoch(origin), duration);
        let after =
            current_offset(origin + Duration::seconds(101), &playing_epoch(origin), duration);
        assert!(segment_sequence(before, 4.0) > segment_sequence(after, 4.0));
        assert_eq!(segment_sequence(after, 4.0), 0);
    }

    #[test]
    fn test_seek_then_immediate_read() {
        // seek(10) then immediate read must yield 10 and sequence 2 for the
        // 4-second profile.
        let now = Utc::now();
        let epoch = Epoch {
            origin: now - Duration::seconds(10),
            paused: false,
            paused_offset_secs: 0.0,
        };
        let offset = current_offset(now, &epoch, 100.0);
        assert!((offset - 10.0).abs() < 1e-6);
        assert_eq!(segment_sequence(offset, 4.0), 2);
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0.0), "00:00:00");
        assert_eq!(format_position(61.2), "00:01:01");
        assert_eq!(format_position(3_725.0), "01:02:05");
    }

    #[test]
    fn test_progress_percent() {
        assert!((progress_percent(50.0, 100.0) - 50.0).abs() < 1e-9);
        assert!((progress_percent(0.0, 100.0)).abs() < 1e-9);
    }
}
