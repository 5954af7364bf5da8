//! Detector plus ByteTrack bundled as the per-stream frame tracker.

use std::fmt::Display;

use crate::error::{LabelError, Result};
use crate::integration::{DetectionSource, Frame, FrameTracker};
use crate::tracker::{ByteTracker, Detection, TrackedBox, TrackerConfig};

/// Runs detection, confidence filtering and NMS, then ByteTrack association.
pub struct TrackerPipeline<D: DetectionSource> {
    detector: D,
    tracker: ByteTracker,
}

impl<D: DetectionSource> TrackerPipeline<D> {
    pub fn new(detector: D, config: TrackerConfig) -> Self {
        Self {
            detector,
            tracker: ByteTracker::new(config),
        }
    }

    pub fn with_default_config(detector: D) -> Self {
        Self::new(detector, TrackerConfig::default())
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn tracker(&self) -> &ByteTracker {
        &self.tracker
    }
}

impl<D> FrameTracker for TrackerPipeline<D>
where
    D: DetectionSource,
    D::Error: Display,
{
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedBox>> {
        let detections = self
            .detector
            .detect(frame)
            .map_err(|err| LabelError::detector(err.to_string()))?;

        let config = self.tracker.config();
        let kept: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.score >= config.conf_thresh)
            .collect();
        let kept = suppress_overlaps(kept, config.iou_thresh);
        Ok(self.tracker.update(kept))
    }
}

/// Greedy non-maximum suppression: keep the strongest of every group of
/// boxes overlapping by more than `iou_thresh`.
pub fn suppress_overlaps(mut detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_thresh) {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct MockDetector {
        detections: Vec<Detection>,
    }

    impl DetectionSource for MockDetector {
        type Error = std::convert::Infallible;

        fn detect(&mut self, _frame: &Frame) -> std::result::Result<Vec<Detection>, Self::Error> {
            Ok(self.detections.clone())
        }
    }

    struct FailingDetector;

    impl DetectionSource for FailingDetector {
        type Error = String;

        fn detect(&mut self, _frame: &Frame) -> std::result::Result<Vec<Detection>, Self::Error> {
            Err("weights missing".to_string())
        }
    }

    fn frame() -> Frame {
        Frame {
            index: 0,
            image: RgbImage::new(640, 480),
        }
    }

    #[test]
    fn test_tracker_pipeline() {
        let detector = MockDetector {
            detections: vec![
                Detection::new(10.0, 20.0, 50.0, 80.0, 0.9),
                // duplicate of the first box, suppressed
                Detection::new(11.0, 20.0, 51.0, 80.0, 0.8),
                // under the confidence threshold
                Detection::new(300.0, 20.0, 340.0, 80.0, 0.1),
            ],
        };

        let mut pipeline = TrackerPipeline::with_default_config(detector);
        let tracks = pipeline.track(&frame()).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
    }

    #[test]
    fn test_detector_error_is_reported() {
        let mut pipeline = TrackerPipeline::with_default_config(FailingDetector);
        assert!(matches!(
            pipeline.track(&frame()),
            Err(LabelError::Detector(msg)) if msg == "weights missing"
        ));
    }

    #[test]
    fn test_suppress_overlaps_keeps_disjoint() {
        let dets = vec![
            Detection::new(0.0, 0.0, 10.0, 10.0, 0.5),
            Detection::new(20.0, 0.0, 30.0, 10.0, 0.7),
        ];
        let kept = suppress_overlaps(dets, 0.5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.7);
    }
}
