//! Seams to the detector and tracker that run on every decoded frame.

use crate::error::Result;
use crate::integration::frames::Frame;
use crate::tracker::{Detection, TrackedBox};

/// Object detector run on every decoded frame.
///
/// Implement this trait to plug any detection model into a stream.
///
/// # Example
///
/// ```ignore
/// use tracklabel::{DetectionSource, Detection, Frame};
///
/// struct MyDetector;
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    type Error;

    /// Run inference on one frame.
    fn detect(&mut self, frame: &Frame) -> std::result::Result<Vec<Detection>, Self::Error>;
}

/// Per-frame tracker as seen by a stream: boxes with ephemeral track IDs.
///
/// Called once per decoded frame, in frame order. An error ends the stream.
pub trait FrameTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedBox>>;
}

impl<T: FrameTracker + ?Sized> FrameTracker for Box<T> {
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedBox>> {
        (**self).track(frame)
    }
}
