//! Track-to-identity assignment across parallel streams.
//!
//! Background [`TrackSource`]s sample batches into per-stream
//! [`ReviewBuffer`]s; the foreground [`ConfirmationController`] lets an
//! annotator name tracks and saves crops of named tracks on confirmation.

mod controller;
mod identity_map;
mod review_buffer;
mod roster;
mod session;
mod storage;
mod track_source;

/// Position of a stream in the session, starting at 0.
pub type StreamId = usize;
/// Tracker-assigned identifier, only meaningful within one stream.
pub type TrackId = u64;

pub use controller::{
    ConfirmReport, ConfirmationController, ReviewBox, SavedCrop, StreamPhase, StreamView,
};
pub use identity_map::IdentityMap;
pub use review_buffer::{Batch, Delivery, ReviewBuffer};
pub use roster::{
    Color, IdentitySlot, MIN_COLOR_DISTANCE, NO_LABEL, Roster, SENTINEL_COLOR, color_distance,
};
pub use session::{JOIN_TIMEOUT, Session, SessionConfig, StreamInput};
pub use storage::{CropWriter, DatasetWriter, crop};
pub use track_source::{
    CancellationToken, SAMPLE_INTERVAL, StreamSummary, TRAIL_LENGTH, TrackHistory, TrackSource,
};
