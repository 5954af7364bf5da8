//! Single object track (STrack) managed by the ByteTrack association steps.

use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::tracker::rect::Rect;

/// Lifecycle of a track inside the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Candidate built from a detection, not yet started
    #[default]
    New,
    Tracked,
    /// Unmatched, kept for re-identification until the track buffer runs out
    Lost,
    Removed,
}

/// Single object track.
#[derive(Debug, Clone)]
pub struct STrack {
    /// Ephemeral identifier, unique within the owning tracker only.
    /// Zero until the track is activated.
    pub track_id: u64,
    pub state: TrackState,
    /// Whether the track has been confirmed by a second observation
    pub is_activated: bool,
    pub score: f32,
    /// Last frame the track was updated on
    pub frame_id: u32,
    pub start_frame: u32,
    pub tracklet_len: u32,
    kalman: Option<(StateMean, StateCovariance)>,
    /// Box of the detection that created or last fed this track
    detection: Rect,
}

impl STrack {
    /// Wrap a detection as a candidate track.
    pub fn new(detection: Rect, score: f32) -> Self {
        Self {
            track_id: 0,
            state: TrackState::New,
            is_activated: false,
            score,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            kalman: None,
            detection,
        }
    }

    /// Current box estimate: the filtered state once the track runs,
    /// otherwise the raw detection.
    pub fn rect(&self) -> Rect {
        match &self.kalman {
            Some((mean, _)) => Rect::from_xyah(
                mean[0] as f32,
                mean[1] as f32,
                mean[2] as f32,
                mean[3] as f32,
            ),
            None => self.detection,
        }
    }

    pub fn end_frame(&self) -> u32 {
        self.frame_id
    }

    /// Start a new track with the identifier handed out by the tracker.
    pub fn activate(&mut self, kalman_filter: &KalmanFilter, track_id: u64, frame_id: u32) {
        self.track_id = track_id;
        self.kalman = Some(kalman_filter.initiate(self.detection.to_xyah()));
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        // Tracks born on the very first frame are trusted immediately.
        self.is_activated = frame_id == 1;
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    /// Revive a lost track with a matching detection, keeping its identifier.
    pub fn re_activate(&mut self, new_track: &STrack, kalman_filter: &KalmanFilter, frame_id: u32) {
        self.correct(new_track, kalman_filter);
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;
    }

    pub fn update(&mut self, new_track: &STrack, kalman_filter: &KalmanFilter, frame_id: u32) {
        self.correct(new_track, kalman_filter);
        self.frame_id = frame_id;
        self.tracklet_len += 1;
        self.state = TrackState::Tracked;
        self.is_activated = true;
    }

    fn correct(&mut self, new_track: &STrack, kalman_filter: &KalmanFilter) {
        if let Some((mean, cov)) = &self.kalman {
            self.kalman = Some(kalman_filter.update(mean, cov, new_track.detection.to_xyah()));
        }
        self.detection = new_track.detection;
        self.score = new_track.score;
    }

    pub fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if let Some((mean, cov)) = &self.kalman {
            let mut mean = *mean;
            if self.state != TrackState::Tracked {
                // height velocity is frozen while the track is not observed
                mean[7] = 0.0;
            }
            self.kalman = Some(kalman_filter.predict(&mean, cov));
        }
    }

    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    pub fn multi_predict(stracks: &mut [STrack], kalman_filter: &KalmanFilter) {
        for strack in stracks.iter_mut() {
            strack.predict(kalman_filter);
        }
    }
}
