//! Semi-automatic identity labeling for multi-object tracking.
//!
//! Videos are tracked in parallel with ByteTrack. Sampled frames are handed
//! to an annotator who names each track once; crops of named tracks are then
//! saved per identity for training re-identification or classification
//! models.

pub mod error;
pub mod integration;
pub mod labeling;
pub mod tracker;

pub use error::{LabelError, Result};
pub use integration::{
    DetectionBuilder, DetectionSource, Frame, FrameSource, FrameTracker, ImageSequence,
    MotDetections, TrackerPipeline,
};
pub use labeling::{
    ConfirmReport, ConfirmationController, IdentitySlot, Roster, Session, SessionConfig,
    StreamInput,
};
pub use tracker::{ByteTracker, Detection, Rect, TrackedBox, TrackerConfig};
