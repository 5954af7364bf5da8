//! Single-slot mailbox between a stream's tracking thread and the reviewer.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::labeling::TrackId;
use crate::tracker::TrackedBox;

/// Snapshot of one sampled frame and the tracks seen on it.
#[derive(Debug, Clone)]
pub struct Batch {
    pub frame_index: u64,
    pub frame: Arc<RgbImage>,
    pub tracks: Vec<TrackedBox>,
    /// Recent center points of every track in `tracks`, oldest first.
    pub trails: HashMap<TrackId, Vec<(f32, f32)>>,
}

impl Batch {
    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.iter().map(|t| t.track_id)
    }
}

/// What a consumer receives from a [`ReviewBuffer`].
#[derive(Debug, Clone)]
pub enum Delivery {
    Batch(Batch),
    /// The producer is finished; nothing else will arrive.
    End,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Batch>,
    ended: bool,
    overwritten: u64,
}

/// Capacity-one, latest-wins handoff.
///
/// Publishing never blocks: an unconsumed batch is replaced by the newer one.
/// The end marker is kept apart from the slot so the final batch is still
/// delivered before [`Delivery::End`].
#[derive(Debug, Default)]
pub struct ReviewBuffer {
    slot: Mutex<Slot>,
    available: Condvar,
}

impl ReviewBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer side. Batches published after the end marker are ignored.
    pub fn publish(&self, delivery: Delivery) {
        let mut slot = self.lock();
        match delivery {
            Delivery::Batch(batch) => {
                if slot.ended {
                    log::warn!("batch for frame {} published after end", batch.frame_index);
                    return;
                }
                if let Some(old) = slot.pending.replace(batch) {
                    slot.overwritten += 1;
                    log::debug!("unreviewed batch for frame {} overwritten", old.frame_index);
                }
            }
            Delivery::End => slot.ended = true,
        }
        drop(slot);
        self.available.notify_all();
    }

    pub fn publish_batch(&self, batch: Batch) {
        self.publish(Delivery::Batch(batch));
    }

    pub fn finish(&self) {
        self.publish(Delivery::End);
    }

    /// Whether a batch or the end marker is waiting to be taken.
    pub fn has_pending(&self) -> bool {
        let slot = self.lock();
        slot.pending.is_some() || slot.ended
    }

    /// Take whatever is available without waiting.
    pub fn try_take(&self) -> Option<Delivery> {
        Self::take_locked(&mut self.lock())
    }

    /// Block until a batch or the end marker is available.
    pub fn take_next(&self) -> Delivery {
        let slot = self.lock();
        let mut slot = self
            .available
            .wait_while(slot, |s| s.pending.is_none() && !s.ended)
            .unwrap_or_else(PoisonError::into_inner);
        Self::take_locked(&mut slot).unwrap_or(Delivery::End)
    }

    /// Wait up to `timeout` for something to become available, without
    /// consuming it.
    pub fn wait_pending(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while slot.pending.is_none() && !slot.ended {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            slot = self
                .available
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Batches replaced before anyone took them.
    pub fn overwritten(&self) -> u64 {
        self.lock().overwritten
    }

    fn take_locked(slot: &mut Slot) -> Option<Delivery> {
        match slot.pending.take() {
            Some(batch) => Some(Delivery::Batch(batch)),
            None if slot.ended => Some(Delivery::End),
            None => None,
        }
    }
}
