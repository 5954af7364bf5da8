//! Labeling session: setup gating, one tracking thread per stream and the
//! foreground controller driving review.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{LabelError, Result};
use crate::integration::{FrameSource, FrameTracker};
use crate::labeling::controller::{ConfirmReport, ConfirmationController, StreamView};
use crate::labeling::review_buffer::ReviewBuffer;
use crate::labeling::storage::{CropWriter, DatasetWriter};
use crate::labeling::track_source::{
    CancellationToken, SAMPLE_INTERVAL, StreamSummary, TrackSource,
};
use crate::labeling::{IdentityMap, IdentitySlot, MIN_COLOR_DISTANCE, Roster, StreamId, TrackId};
use crate::tracker::TrackerConfig;

/// Bounded wait used when a session is dropped.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed before processing may start.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub output_dir: PathBuf,
    pub roster: Roster,
    pub tracker: TrackerConfig,
    pub sample_interval: u64,
    pub image_ext: String,
    pub min_color_distance: f32,
}

impl SessionConfig {
    pub fn new(output_dir: impl Into<PathBuf>, roster: Roster) -> Self {
        Self {
            output_dir: output_dir.into(),
            roster,
            tracker: TrackerConfig::default(),
            sample_interval: SAMPLE_INTERVAL,
            image_ext: "png".to_string(),
            min_color_distance: MIN_COLOR_DISTANCE,
        }
    }

    /// Processing gate. Any error here means processing stays disabled.
    pub fn validate(&self, stream_count: usize) -> Result<()> {
        if stream_count == 0 {
            return Err(LabelError::config("no videos selected"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(LabelError::config("no output directory selected"));
        }
        if self.roster.is_empty() {
            return Err(LabelError::config("declare at least one identity"));
        }
        if self.sample_interval == 0 {
            return Err(LabelError::config("sample interval must be at least 1"));
        }
        if !(self.min_color_distance >= 0.0) {
            return Err(LabelError::config("minimum color distance must not be negative"));
        }
        self.tracker.validate()
    }
}

/// One video handed to [`Session::start`].
pub struct StreamInput {
    pub name: String,
    pub frames: Box<dyn FrameSource + Send>,
    pub tracker: Box<dyn FrameTracker + Send>,
}

impl StreamInput {
    pub fn new<F, T>(name: impl Into<String>, frames: F, tracker: T) -> Self
    where
        F: FrameSource + Send + 'static,
        T: FrameTracker + Send + 'static,
    {
        Self {
            name: name.into(),
            frames: Box::new(frames),
            tracker: Box::new(tracker),
        }
    }
}

/// A running labeling session.
///
/// Dropping it cancels every stream and joins the tracking threads with a
/// bounded wait.
pub struct Session<W: CropWriter = DatasetWriter> {
    controller: ConfirmationController<W>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<StreamSummary>>,
    summaries: Vec<StreamSummary>,
}

impl Session<DatasetWriter> {
    /// Start writing crops under `config.output_dir`.
    pub fn start(config: SessionConfig, streams: Vec<StreamInput>) -> Result<Self> {
        let writer = DatasetWriter::new(&config.output_dir, &config.image_ext)?;
        Self::start_with_writer(config, streams, writer)
    }
}

impl<W: CropWriter> Session<W> {
    /// Start with a custom crop destination. Nothing is spawned unless the
    /// configuration passes [`SessionConfig::validate`].
    pub fn start_with_writer(
        mut config: SessionConfig,
        streams: Vec<StreamInput>,
        mut writer: W,
    ) -> Result<Self> {
        config.validate(streams.len())?;
        if !config.roster.is_frozen() {
            config.roster.freeze(config.min_color_distance)?;
        }
        fs::create_dir_all(&config.output_dir)?;
        config.tracker.save_record(&config.output_dir)?;
        writer.prepare(&config.roster)?;

        let cancel = CancellationToken::new();
        let mut buffers = Vec::with_capacity(streams.len());
        let mut workers = Vec::with_capacity(streams.len());
        for input in streams {
            let buffer = Arc::new(ReviewBuffer::new());
            let source = TrackSource::new(
                input.name.clone(),
                input.frames,
                input.tracker,
                Arc::clone(&buffer),
                config.sample_interval,
            );
            match source.spawn(cancel.clone()) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    cancel.cancel();
                    join_all(workers, JOIN_TIMEOUT);
                    return Err(err.into());
                }
            }
            buffers.push((input.name, buffer));
        }
        log::info!(
            "session started with {} streams, {} identities",
            buffers.len(),
            config.roster.identity_count()
        );

        let controller = ConfirmationController::new(config.roster, buffers, writer)?;
        Ok(Self {
            controller,
            cancel,
            workers,
            summaries: Vec::new(),
        })
    }
}

impl<W: CropWriter> Session<W> {
    pub fn controller(&self) -> &ConfirmationController<W> {
        &self.controller
    }

    /// The frozen roster of this run.
    pub fn roster(&self) -> &Roster {
        self.controller.roster()
    }

    /// Pick up batches that arrived since the last call, without blocking.
    pub fn poll(&mut self) -> usize {
        self.controller.poll()
    }

    /// See [`ConfirmationController::wait_ready`].
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        self.controller.wait_ready(timeout)
    }

    /// Whether every active stream holds a batch, so `confirm` may run.
    pub fn can_confirm(&self) -> bool {
        self.controller.can_confirm()
    }

    /// Whether every stream has ended or the session was cancelled.
    pub fn is_complete(&self) -> bool {
        self.controller.is_complete()
    }

    /// Frames, boxes, labels and colors for rendering.
    pub fn review_state(&self) -> Vec<StreamView> {
        self.controller.review_state()
    }

    pub fn identities(&self, stream: StreamId) -> Result<&IdentityMap> {
        self.controller.identities(stream)
    }

    /// Record an identity choice; nothing is written until [`Session::confirm`].
    pub fn select_identity(
        &mut self,
        stream: StreamId,
        track_id: TrackId,
        slot: IdentitySlot,
    ) -> Result<()> {
        self.controller.select_identity(stream, track_id, slot)
    }

    /// Save crops of every labeled track and advance all streams.
    pub fn confirm(&mut self) -> Result<ConfirmReport> {
        self.controller.confirm()
    }

    /// Stop every stream, discard held batches and join the workers.
    pub fn cancel(&mut self) {
        log::info!("cancelling session");
        self.cancel.cancel();
        let discarded = self.controller.finish_all();
        if discarded > 0 {
            log::info!("{} unconfirmed batches discarded", discarded);
        }
        self.shutdown(JOIN_TIMEOUT);
    }

    /// Join finished tracking threads, waiting at most `timeout`. Returns the
    /// number of threads still running.
    pub fn shutdown(&mut self, timeout: Duration) -> usize {
        let workers = std::mem::take(&mut self.workers);
        let (summaries, running) = join_all(workers, timeout);
        self.summaries.extend(summaries);
        let still_running = running.len();
        self.workers = running;
        still_running
    }

    /// Summaries of the tracking threads joined so far.
    pub fn summaries(&self) -> &[StreamSummary] {
        &self.summaries
    }
}

impl<W: CropWriter> Drop for Session<W> {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.cancel.cancel();
            self.shutdown(JOIN_TIMEOUT);
        }
    }
}

fn join_all(
    workers: Vec<JoinHandle<StreamSummary>>,
    timeout: Duration,
) -> (Vec<StreamSummary>, Vec<JoinHandle<StreamSummary>>) {
    let deadline = Instant::now() + timeout;
    let mut pending = workers;
    let mut summaries = Vec::new();

    loop {
        let (finished, running): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|h| h.is_finished());
        for handle in finished {
            match handle.join() {
                Ok(summary) => summaries.push(summary),
                Err(_) => log::error!("tracking thread panicked"),
            }
        }
        pending = running;
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    if !pending.is_empty() {
        log::warn!("{} tracking threads still running after {:?}", pending.len(), timeout);
    }
    (summaries, pending)
}
