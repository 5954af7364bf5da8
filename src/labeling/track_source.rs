//! Background decode-and-track loop feeding one stream's review buffer.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::error::Result;
use crate::integration::{FrameSource, FrameTracker};
use crate::labeling::TrackId;
use crate::labeling::review_buffer::{Batch, ReviewBuffer};
use crate::tracker::TrackedBox;

/// Frames between two sampled batches.
pub const SAMPLE_INTERVAL: u64 = 100;
/// Center points kept per track.
pub const TRAIL_LENGTH: usize = 90;

/// Shared stop flag, checked by every stream before each frame read.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounded trailing centers of the tracks currently visible on a stream.
///
/// A track unseen for `capacity` recorded frames has no point left inside
/// the trail window and is forgotten.
#[derive(Debug, Clone)]
pub struct TrackHistory {
    capacity: usize,
    frame: u64,
    trails: HashMap<TrackId, Trail>,
}

#[derive(Debug, Clone, Default)]
struct Trail {
    last_seen: u64,
    points: VecDeque<(f32, f32)>,
}

impl Default for TrackHistory {
    fn default() -> Self {
        Self::with_capacity(TRAIL_LENGTH)
    }
}

impl TrackHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            frame: 0,
            trails: HashMap::new(),
        }
    }

    /// Append the centers of one frame's tracks and drop stale trails.
    pub fn record(&mut self, tracks: &[TrackedBox]) {
        self.frame += 1;
        for track in tracks {
            let trail = self.trails.entry(track.track_id).or_default();
            trail.last_seen = self.frame;
            trail.points.push_back(track.bbox.center());
            while trail.points.len() > self.capacity {
                trail.points.pop_front();
            }
        }
        let (frame, window) = (self.frame, self.capacity as u64);
        self.trails.retain(|_, t| frame - t.last_seen < window);
    }

    pub fn trail(&self, track_id: TrackId) -> Vec<(f32, f32)> {
        self.trails
            .get(&track_id)
            .map(|t| t.points.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of tracks with a live trail.
    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    fn snapshot(&self, tracks: &[TrackedBox]) -> HashMap<TrackId, Vec<(f32, f32)>> {
        tracks
            .iter()
            .map(|t| (t.track_id, self.trail(t.track_id)))
            .collect()
    }
}

/// How a stream's loop ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: u64,
    pub batches: u64,
    pub cancelled: bool,
    /// Set when decoding or tracking failed and ended the stream early.
    pub error: Option<String>,
}

/// Publishes the end marker however the loop exits, panics included.
struct EndGuard(Arc<ReviewBuffer>);

impl Drop for EndGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// One video with its tracker, sampling a batch every `sample_interval`
/// processed frames into its review buffer.
pub struct TrackSource<F, T> {
    name: String,
    frames: F,
    tracker: T,
    buffer: Arc<ReviewBuffer>,
    sample_interval: u64,
    history: TrackHistory,
}

impl<F: FrameSource, T: FrameTracker> TrackSource<F, T> {
    pub fn new(
        name: impl Into<String>,
        frames: F,
        tracker: T,
        buffer: Arc<ReviewBuffer>,
        sample_interval: u64,
    ) -> Self {
        Self {
            name: name.into(),
            frames,
            tracker,
            buffer,
            sample_interval: sample_interval.max(1),
            history: TrackHistory::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until the frames run out, the token is cancelled or a
    /// collaborator fails. The end marker is always published.
    pub fn run(mut self, cancel: &CancellationToken) -> StreamSummary {
        let _end = EndGuard(Arc::clone(&self.buffer));
        let mut summary = StreamSummary::default();

        log::info!("stream {} started", self.name);
        match self.pump(cancel, &mut summary) {
            Ok(()) if summary.cancelled => log::info!(
                "stream {} cancelled after {} frames",
                self.name,
                summary.frames
            ),
            Ok(()) => log::info!(
                "stream {} finished: {} frames, {} batches",
                self.name,
                summary.frames,
                summary.batches
            ),
            Err(err) => {
                log::error!(
                    "stream {} failed after {} frames: {}",
                    self.name,
                    summary.frames,
                    err
                );
                summary.error = Some(err.to_string());
            }
        }
        summary
    }

    fn pump(&mut self, cancel: &CancellationToken, summary: &mut StreamSummary) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(());
            }
            let Some(frame) = self.frames.next_frame()? else {
                return Ok(());
            };
            let tracks = self.tracker.track(&frame)?;
            self.history.record(&tracks);

            if summary.frames % self.sample_interval == 0 {
                log::debug!(
                    "stream {} sampled frame {} with {} tracks",
                    self.name,
                    frame.index,
                    tracks.len()
                );
                let trails = self.history.snapshot(&tracks);
                self.buffer.publish_batch(Batch {
                    frame_index: frame.index,
                    frame: Arc::new(frame.image),
                    tracks,
                    trails,
                });
                summary.batches += 1;
            }
            summary.frames += 1;
        }
    }
}

impl<F, T> TrackSource<F, T>
where
    F: FrameSource + Send + 'static,
    T: FrameTracker + Send + 'static,
{
    /// Move the loop onto its own named thread.
    pub fn spawn(self, cancel: CancellationToken) -> io::Result<JoinHandle<StreamSummary>> {
        thread::Builder::new()
            .name(format!("track-{}", self.name))
            .spawn(move || self.run(&cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LabelError;
    use crate::integration::Frame;
    use crate::labeling::review_buffer::Delivery;
    use crate::tracker::Rect;
    use image::RgbImage;

    struct CountingFrames {
        next: u64,
        total: u64,
        fail_at: Option<u64>,
    }

    impl FrameSource for CountingFrames {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if Some(self.next) == self.fail_at {
                return Err(LabelError::frame_source("corrupt frame"));
            }
            if self.next >= self.total {
                return Ok(None);
            }
            let frame = Frame {
                index: self.next,
                image: RgbImage::new(16, 16),
            };
            self.next += 1;
            Ok(Some(frame))
        }
    }

    /// Reports one track drifting right by one pixel per frame.
    struct DriftTracker;

    impl FrameTracker for DriftTracker {
        fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedBox>> {
            Ok(vec![TrackedBox {
                track_id: 1,
                bbox: Rect::new(frame.index as f32, 0.0, 4.0, 4.0),
                score: 0.9,
            }])
        }
    }

    fn frames(total: u64) -> CountingFrames {
        CountingFrames {
            next: 0,
            total,
            fail_at: None,
        }
    }

    fn drain(buffer: &ReviewBuffer) -> (Vec<Batch>, bool) {
        let mut batches = Vec::new();
        loop {
            match buffer.try_take() {
                Some(Delivery::Batch(b)) => batches.push(b),
                Some(Delivery::End) => return (batches, true),
                None => return (batches, false),
            }
        }
    }

    #[test]
    fn test_samples_every_interval() {
        let buffer = Arc::new(ReviewBuffer::new());
        let source = TrackSource::new("a", frames(25), DriftTracker, Arc::clone(&buffer), 10);

        let summary = source.run(&CancellationToken::new());
        assert_eq!(summary.frames, 25);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.error, None);

        // frames 0 and 10 were overwritten by frame 20
        assert_eq!(buffer.overwritten(), 2);
        let (batches, ended) = drain(&buffer);
        assert!(ended);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].frame_index, 20);
        assert_eq!(batches[0].trails[&1].len(), 21);
        assert_eq!(batches[0].trails[&1].last(), Some(&(22.0, 2.0)));
    }

    #[test]
    fn test_failure_ends_stream() {
        let buffer = Arc::new(ReviewBuffer::new());
        let frames = CountingFrames {
            next: 0,
            total: 10,
            fail_at: Some(3),
        };
        let summary = TrackSource::new("b", frames, DriftTracker, Arc::clone(&buffer), 1)
            .run(&CancellationToken::new());

        assert_eq!(summary.frames, 3);
        assert!(summary.error.unwrap().contains("corrupt frame"));
        assert!(drain(&buffer).1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let buffer = Arc::new(ReviewBuffer::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handle = TrackSource::new("c", frames(1000), DriftTracker, Arc::clone(&buffer), 1)
            .spawn(cancel)
            .unwrap();
        let summary = handle.join().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);
        assert!(matches!(buffer.take_next(), Delivery::End));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = TrackHistory::with_capacity(3);
        for i in 0..5 {
            history.record(&[TrackedBox {
                track_id: 4,
                bbox: Rect::new(i as f32, 0.0, 2.0, 2.0),
                score: 1.0,
            }]);
        }
        assert_eq!(history.trail(4), vec![(3.0, 1.0), (4.0, 1.0), (5.0, 1.0)]);
        assert!(history.trail(5).is_empty());
    }

    #[test]
    fn test_history_forgets_vanished_tracks() {
        let mut history = TrackHistory::with_capacity(3);
        let boxed = |track_id| TrackedBox {
            track_id,
            bbox: Rect::new(0.0, 0.0, 2.0, 2.0),
            score: 1.0,
        };
        history.record(&[boxed(1), boxed(2)]);
        history.record(&[boxed(2)]);
        history.record(&[boxed(2)]);
        assert_eq!(history.len(), 2);

        // track 1 was last seen three frames ago
        history.record(&[boxed(2)]);
        assert_eq!(history.len(), 1);
        assert!(history.trail(1).is_empty());
        assert_eq!(history.trail(2).len(), 3);

        for id in 100..1100 {
            history.record(&[boxed(id)]);
        }
        assert!(history.len() <= 3);
    }
}
