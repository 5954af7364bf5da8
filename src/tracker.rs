//! ByteTrack multi-object tracker producing per-stream ephemeral track IDs.

mod byte_tracker;
mod config;
mod kalman_filter;
mod matching;
mod rect;
mod strack;

pub use byte_tracker::{ByteTracker, TrackedBox};
pub use config::{TRACKER_RECORD_FILE, TrackerConfig, parse_threshold};
pub use matching::Detection;
pub use rect::{PixelBounds, Rect};
pub use strack::{STrack, TrackState};
