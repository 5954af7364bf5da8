//! Review and confirmation state machine across all streams.
//!
//! Each stream cycles through
//!
//! ```text
//! AwaitingBatch -> ReadyForReview -> (identity selection) -> confirm
//!       ^                                                      |
//!       +--------------------- next batch <--------------------+
//!                                  |
//!                                  +-- end marker --> Done
//! ```
//!
//! Confirmation is a global barrier: it runs only when every stream that is
//! not yet done holds a batch. Finished streams leave the barrier.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::error::{LabelError, Result};
use crate::labeling::review_buffer::{Batch, Delivery, ReviewBuffer};
use crate::labeling::storage::{CropWriter, crop};
use crate::labeling::{
    Color, IdentityMap, IdentitySlot, Roster, SENTINEL_COLOR, StreamId, TrackId,
};
use crate::tracker::Rect;

/// Coarse state of one stream as seen by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingBatch,
    ReadyForReview,
    Done,
}

#[derive(Debug)]
enum StreamState {
    AwaitingBatch,
    ReadyForReview(Batch),
    Done,
}

impl StreamState {
    fn phase(&self) -> StreamPhase {
        match self {
            Self::AwaitingBatch => StreamPhase::AwaitingBatch,
            Self::ReadyForReview(_) => StreamPhase::ReadyForReview,
            Self::Done => StreamPhase::Done,
        }
    }
}

#[derive(Debug)]
struct ReviewStream {
    name: String,
    buffer: Arc<ReviewBuffer>,
    identities: IdentityMap,
    state: StreamState,
    /// Tracks of the held batch already written by an interrupted confirm.
    saved: HashSet<TrackId>,
}

impl ReviewStream {
    /// Pull from the buffer if this stream is waiting. Returns `true` when
    /// the state changed.
    /// Release the held batch; the next poll picks up a new one.
    fn advance(&mut self) {
        if matches!(self.state, StreamState::ReadyForReview(_)) {
            self.state = StreamState::AwaitingBatch;
        }
        self.saved.clear();
    }

    fn poll(&mut self) -> bool {
        if !matches!(self.state, StreamState::AwaitingBatch) {
            return false;
        }
        match self.buffer.try_take() {
            Some(Delivery::Batch(batch)) => {
                // Register before the batch becomes visible to the reviewer.
                let new_tracks = batch
                    .track_ids()
                    .filter(|&id| self.identities.ensure(id))
                    .count();
                log::debug!(
                    "stream {} ready with frame {} ({} tracks, {} new)",
                    self.name,
                    batch.frame_index,
                    batch.tracks.len(),
                    new_tracks
                );
                self.state = StreamState::ReadyForReview(batch);
                true
            }
            Some(Delivery::End) => {
                log::info!("stream {} done", self.name);
                self.state = StreamState::Done;
                true
            }
            None => false,
        }
    }
}

/// A crop written during confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedCrop {
    pub stream: StreamId,
    pub track_id: TrackId,
    pub identity: IdentitySlot,
    pub path: PathBuf,
}

/// Outcome of one [`ConfirmationController::confirm`].
#[derive(Debug, Clone, Default)]
pub struct ConfirmReport {
    pub saved: Vec<SavedCrop>,
    /// Tracks left on the sentinel identity, intentionally not saved.
    pub skipped: usize,
    /// Labeled tracks whose box lay outside the frame.
    pub degenerate: usize,
    /// Streams that reached their end while advancing in this round.
    pub finished: Vec<StreamId>,
    pub complete: bool,
}

/// Render-ready view of one box.
#[derive(Debug, Clone)]
pub struct ReviewBox {
    pub track_id: TrackId,
    pub bbox: Rect,
    pub identity: IdentitySlot,
    pub label: String,
    pub color: Color,
    pub trail: Vec<(f32, f32)>,
}

/// Render-ready view of one stream.
#[derive(Debug, Clone)]
pub struct StreamView {
    pub stream: StreamId,
    pub name: String,
    pub phase: StreamPhase,
    pub frame_index: Option<u64>,
    pub frame: Option<Arc<RgbImage>>,
    pub boxes: Vec<ReviewBox>,
}

/// Drives review across all streams: takes batches, records identity
/// choices and saves crops when every active stream is ready.
///
/// Lives on the foreground; the per-stream identity maps are only touched
/// from here.
pub struct ConfirmationController<W> {
    roster: Roster,
    streams: Vec<ReviewStream>,
    writer: W,
    rounds: u64,
}

impl<W: CropWriter> ConfirmationController<W> {
    /// Build a controller over named stream buffers. Stream IDs are the
    /// positions in `buffers`.
    pub fn new(roster: Roster, buffers: Vec<(String, Arc<ReviewBuffer>)>, writer: W) -> Result<Self> {
        if !roster.is_frozen() {
            return Err(LabelError::RosterNotFrozen);
        }
        if buffers.is_empty() {
            return Err(LabelError::config("no streams to review"));
        }
        let streams = buffers
            .into_iter()
            .enumerate()
            .map(|(id, (name, buffer))| ReviewStream {
                name,
                buffer,
                identities: IdentityMap::new(id),
                state: StreamState::AwaitingBatch,
                saved: HashSet::new(),
            })
            .collect();
        Ok(Self {
            roster,
            streams,
            writer,
            rounds: 0,
        })
    }

    /// The frozen roster identities are chosen from.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Destination of confirmed crops.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Number of streams under review, done ones included.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Confirmations performed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Move waiting streams forward without blocking. Returns how many
    /// streams changed state.
    pub fn poll(&mut self) -> usize {
        self.streams
            .iter_mut()
            .map(ReviewStream::poll)
            .filter(|&changed| changed)
            .count()
    }

    /// Wait up to `timeout` for the barrier to open, polling as buffers fill.
    /// Returns whether confirmation (or completion) is reachable now.
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll();
        while !self.can_confirm() && !self.is_complete() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if let Some(waiting) = self
                .streams
                .iter()
                .find(|s| matches!(s.state, StreamState::AwaitingBatch))
            {
                waiting.buffer.wait_pending(remaining);
            }
            self.poll();
        }
        true
    }

    /// Current phase of `stream`.
    pub fn phase(&self, stream: StreamId) -> Result<StreamPhase> {
        Ok(self.stream(stream)?.state.phase())
    }

    /// Whether every stream that is not done holds a batch.
    pub fn can_confirm(&self) -> bool {
        let mut active = self
            .streams
            .iter()
            .filter(|s| !matches!(s.state, StreamState::Done))
            .peekable();
        active.peek().is_some()
            && active.all(|s| matches!(s.state, StreamState::ReadyForReview(_)))
    }

    /// Whether every stream has delivered its end marker.
    pub fn is_complete(&self) -> bool {
        self.streams
            .iter()
            .all(|s| matches!(s.state, StreamState::Done))
    }

    /// Identity choices made so far on `stream`.
    pub fn identities(&self, stream: StreamId) -> Result<&IdentityMap> {
        Ok(&self.stream(stream)?.identities)
    }

    /// Give `track_id` on `stream` an identity. No storage side effect; may be
    /// repeated to change the choice until the next confirmation.
    pub fn select_identity(
        &mut self,
        stream: StreamId,
        track_id: TrackId,
        slot: IdentitySlot,
    ) -> Result<()> {
        if !self.roster.contains(slot) {
            return Err(LabelError::UnknownIdentity(slot.0));
        }
        let target = self
            .streams
            .get_mut(stream)
            .ok_or(LabelError::UnknownStream(stream))?;
        target.identities.assign(track_id, slot)
    }

    /// Save every labeled track of the held batches, then advance each
    /// stream to its next batch.
    ///
    /// Unlabeled tracks are skipped. If a write fails the batches stay held
    /// and the call may be retried; crops written before the failure are
    /// not written again.
    pub fn confirm(&mut self) -> Result<ConfirmReport> {
        if !self.can_confirm() {
            return Err(LabelError::BarrierNotSatisfied);
        }
        let mut report = ConfirmReport::default();

        for (stream_id, stream) in self.streams.iter_mut().enumerate() {
            let StreamState::ReadyForReview(batch) = &stream.state else {
                continue;
            };
            for track in &batch.tracks {
                if stream.saved.contains(&track.track_id) {
                    continue;
                }
                let slot = stream
                    .identities
                    .resolve(track.track_id)
                    .unwrap_or(IdentitySlot::UNASSIGNED);
                if !slot.is_assigned() {
                    report.skipped += 1;
                    continue;
                }
                let identity = self
                    .roster
                    .name(slot)
                    .ok_or(LabelError::UnknownIdentity(slot.0))?;
                let Some(piece) = crop(&batch.frame, &track.bbox) else {
                    log::warn!(
                        "track {} on stream {} lies outside frame {}, not saved",
                        track.track_id,
                        stream.name,
                        batch.frame_index
                    );
                    report.degenerate += 1;
                    continue;
                };
                let path = self.writer.write_crop(identity, &piece)?;
                stream.saved.insert(track.track_id);
                report.saved.push(SavedCrop {
                    stream: stream_id,
                    track_id: track.track_id,
                    identity: slot,
                    path,
                });
            }
        }

        let done_before: Vec<bool> = self
            .streams
            .iter()
            .map(|s| matches!(s.state, StreamState::Done))
            .collect();
        for stream in &mut self.streams {
            stream.advance();
        }
        self.poll();
        self.rounds += 1;

        report.finished = self
            .streams
            .iter()
            .zip(done_before)
            .enumerate()
            .filter(|(_, (s, was_done))| !was_done && matches!(s.state, StreamState::Done))
            .map(|(id, _)| id)
            .collect();
        report.complete = self.is_complete();
        log::info!(
            "confirmation {}: {} crops saved, {} unlabeled skipped",
            self.rounds,
            report.saved.len(),
            report.skipped
        );
        if report.complete {
            log::info!("all streams done");
        }
        Ok(report)
    }

    /// End every stream without saving what is held. Returns the number of
    /// batches discarded.
    pub fn finish_all(&mut self) -> usize {
        let mut discarded = 0;
        for stream in &mut self.streams {
            if matches!(stream.state, StreamState::ReadyForReview(_)) {
                discarded += 1;
            }
            stream.state = StreamState::Done;
            stream.saved.clear();
        }
        discarded
    }

    /// Everything the reviewer needs to draw the current state.
    pub fn review_state(&self) -> Vec<StreamView> {
        self.streams
            .iter()
            .enumerate()
            .map(|(id, stream)| self.view(id, stream))
            .collect()
    }

    fn view(&self, id: StreamId, stream: &ReviewStream) -> StreamView {
        let mut view = StreamView {
            stream: id,
            name: stream.name.clone(),
            phase: stream.state.phase(),
            frame_index: None,
            frame: None,
            boxes: Vec::new(),
        };
        if let StreamState::ReadyForReview(batch) = &stream.state {
            view.frame_index = Some(batch.frame_index);
            view.frame = Some(Arc::clone(&batch.frame));
            view.boxes = batch
                .tracks
                .iter()
                .map(|track| {
                    let identity = stream
                        .identities
                        .resolve(track.track_id)
                        .unwrap_or(IdentitySlot::UNASSIGNED);
                    ReviewBox {
                        track_id: track.track_id,
                        bbox: track.bbox,
                        identity,
                        label: self.roster.name(identity).unwrap_or_default().to_string(),
                        color: self.roster.color(identity).unwrap_or(SENTINEL_COLOR),
                        trail: batch.trails.get(&track.track_id).cloned().unwrap_or_default(),
                    }
                })
                .collect();
        }
        view
    }

    fn stream(&self, stream: StreamId) -> Result<&ReviewStream> {
        self.streams
            .get(stream)
            .ok_or(LabelError::UnknownStream(stream))
    }
}
