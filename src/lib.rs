//! loopcast: a single-channel linear broadcast station.
//!
//! One source video loops forever against a persisted epoch; every viewer
//! sees the same moment. The station lazily runs an HLS encoder while
//! viewers are watching and tears it down when they leave.

pub mod clock;
pub mod config;
pub mod epoch;
pub mod error;
pub mod server;
pub mod station;
pub mod supervisor;
pub mod viewers;
