//! Per-stream mapping from ephemeral track IDs to roster slots.

use std::collections::BTreeMap;

use crate::error::{LabelError, Result};
use crate::labeling::{IdentitySlot, StreamId, TrackId};

/// Identities assigned on one stream.
///
/// Every stream owns its own map; track IDs from different streams never
/// share entries even when their values collide.
#[derive(Debug, Clone)]
pub struct IdentityMap {
    stream: StreamId,
    slots: BTreeMap<TrackId, IdentitySlot>,
}

impl IdentityMap {
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            slots: BTreeMap::new(),
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Register a track with the sentinel slot. Returns `true` if the track
    /// was new; a known track keeps its current slot.
    pub fn ensure(&mut self, track_id: TrackId) -> bool {
        let mut inserted = false;
        self.slots.entry(track_id).or_insert_with(|| {
            inserted = true;
            IdentitySlot::UNASSIGNED
        });
        inserted
    }

    /// Overwrite the slot of a registered track.
    pub fn assign(&mut self, track_id: TrackId, slot: IdentitySlot) -> Result<()> {
        match self.slots.get_mut(&track_id) {
            Some(current) => {
                *current = slot;
                Ok(())
            }
            None => {
                log::error!(
                    "assignment to unregistered track {} on stream {}",
                    track_id,
                    self.stream
                );
                Err(LabelError::UnknownTrack {
                    stream: self.stream,
                    track_id,
                })
            }
        }
    }

    pub fn resolve(&self, track_id: TrackId) -> Option<IdentitySlot> {
        self.slots.get(&track_id).copied()
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.slots.contains_key(&track_id)
    }

    pub fn snapshot(&self) -> BTreeMap<TrackId, IdentitySlot> {
        self.slots.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_is_idempotent() {
        let mut map = IdentityMap::new(0);
        assert!(map.ensure(7));
        map.assign(7, IdentitySlot(2)).unwrap();

        assert!(!map.ensure(7));
        assert_eq!(map.resolve(7), Some(IdentitySlot(2)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_new_track_starts_unassigned() {
        let mut map = IdentityMap::new(0);
        map.ensure(3);
        assert_eq!(map.resolve(3), Some(IdentitySlot::UNASSIGNED));
        assert_eq!(map.resolve(4), None);
    }

    #[test]
    fn test_reassign_overwrites() {
        let mut map = IdentityMap::new(0);
        map.ensure(1);
        map.assign(1, IdentitySlot(1)).unwrap();
        map.assign(1, IdentitySlot(2)).unwrap();
        assert_eq!(map.snapshot().get(&1), Some(&IdentitySlot(2)));
    }

    #[test]
    fn test_unknown_track_is_rejected() {
        let mut map = IdentityMap::new(3);
        let err = map.assign(9, IdentitySlot(1)).unwrap_err();
        assert!(matches!(err, LabelError::UnknownTrack { stream: 3, track_id: 9 }));
        assert!(map.is_empty());
    }
}
