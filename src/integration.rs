//! Collaborators of the labeling core: frame decoding, detection and the
//! per-stream tracker pipeline.

mod builder;
mod detector;
mod frames;
mod mot;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, FrameTracker};
pub use frames::{
    Frame, FrameSource, IMAGE_EXTENSIONS, ImageSequence, SequenceInput, discover_sequences,
};
pub use mot::MotDetections;
pub use pipeline::{TrackerPipeline, suppress_overlaps};
