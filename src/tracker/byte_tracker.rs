//! ByteTrack association loop.
//!
//! Every tracker instance hands out its own track identifiers, so identifiers
//! are only meaningful within the stream the tracker runs on.

use std::collections::HashSet;

use crate::tracker::config::TrackerConfig;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::strack::{STrack, TrackState};

/// Cost limit for matching low-score detections to leftover tracks.
const SECOND_MATCH_THRESH: f32 = 0.5;
/// Cost limit for confirming tracks that were only seen once.
const UNCONFIRMED_MATCH_THRESH: f32 = 0.7;
/// IoU above which a tracked and a lost track are considered duplicates.
const DUPLICATE_IOU: f32 = 0.85;

/// One confirmed track reported for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedBox {
    pub track_id: u64,
    pub bbox: Rect,
    pub score: f32,
}

pub struct ByteTracker {
    tracked_stracks: Vec<STrack>,
    lost_stracks: Vec<STrack>,
    frame_id: u32,
    next_id: u64,
    config: TrackerConfig,
    max_time_lost: u32,
    kalman_filter: KalmanFilter,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracked_stracks: Vec::new(),
            lost_stracks: Vec::new(),
            frame_id: 0,
            next_id: 0,
            max_time_lost: config.max_time_lost(),
            config,
            kalman_filter: KalmanFilter::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Feed one frame of detections and return the active tracks.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedBox> {
        self.frame_id += 1;
        let frame_id = self.frame_id;

        let mut activated_stracks = Vec::new();
        let mut refind_stracks = Vec::new();
        let mut lost_stracks = Vec::new();

        // Step 1: split detections by score
        let (high, low): (Vec<Detection>, Vec<Detection>) = detections
            .into_iter()
            .filter(|d| d.score > self.config.track_low_thresh)
            .partition(|d| d.score >= self.config.track_high_thresh);
        let detections: Vec<STrack> = high.iter().map(|d| STrack::new(d.bbox, d.score)).collect();
        let detections_low: Vec<STrack> =
            low.iter().map(|d| STrack::new(d.bbox, d.score)).collect();

        let (tracked, unconfirmed): (Vec<STrack>, Vec<STrack>) = self
            .tracked_stracks
            .drain(..)
            .partition(|t| t.is_activated);
        let mut unconfirmed = unconfirmed;

        let mut strack_pool = joint_stracks(tracked, &self.lost_stracks);
        STrack::multi_predict(&mut strack_pool, &self.kalman_filter);

        // Step 2: first association with high score detections
        let mut dists = matching::iou_distance(&rects(&strack_pool), &rects(&detections));
        let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
        matching::fuse_score(&mut dists, &scores);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.config.match_thresh);

        for (itracked, idet) in matches {
            let mut track = strack_pool[itracked].clone();
            if track.state == TrackState::Tracked {
                track.update(&detections[idet], &self.kalman_filter, frame_id);
                activated_stracks.push(track);
            } else {
                track.re_activate(&detections[idet], &self.kalman_filter, frame_id);
                refind_stracks.push(track);
            }
        }

        // Step 3: second association with low score detections
        let r_tracked_stracks: Vec<STrack> = unmatched_tracks
            .iter()
            .map(|&idx| &strack_pool[idx])
            .filter(|t| t.state == TrackState::Tracked)
            .cloned()
            .collect();
        let dists_second =
            matching::iou_distance(&rects(&r_tracked_stracks), &rects(&detections_low));
        let second = matching::linear_assignment(&dists_second, SECOND_MATCH_THRESH);

        for (itracked, idet) in second.matches {
            let mut track = r_tracked_stracks[itracked].clone();
            track.update(&detections_low[idet], &self.kalman_filter, frame_id);
            activated_stracks.push(track);
        }
        for idx in second.unmatched_tracks {
            let mut track = r_tracked_stracks[idx].clone();
            track.mark_lost();
            lost_stracks.push(track);
        }

        // Tracks seen on a single frame so far get one chance to confirm.
        let detections_rem: Vec<STrack> = unmatched_detections
            .into_iter()
            .map(|idx| detections[idx].clone())
            .collect();
        let mut dist_unconfirmed =
            matching::iou_distance(&rects(&unconfirmed), &rects(&detections_rem));
        let rem_scores: Vec<f32> = detections_rem.iter().map(|d| d.score).collect();
        matching::fuse_score(&mut dist_unconfirmed, &rem_scores);
        let third = matching::linear_assignment(&dist_unconfirmed, UNCONFIRMED_MATCH_THRESH);

        for (itracked, idet) in third.matches {
            unconfirmed[itracked].update(&detections_rem[idet], &self.kalman_filter, frame_id);
            activated_stracks.push(unconfirmed[itracked].clone());
        }
        for idx in third.unmatched_tracks {
            unconfirmed[idx].mark_removed();
        }

        // Step 4: start new tracks
        for idx in third.unmatched_detections {
            let mut track = detections_rem[idx].clone();
            if track.score < self.config.new_track_thresh {
                continue;
            }
            let track_id = self.allocate_id();
            track.activate(&self.kalman_filter, track_id, frame_id);
            activated_stracks.push(track);
        }

        // Step 5: expire lost tracks
        for mut track in self.lost_stracks.drain(..) {
            if frame_id - track.end_frame() > self.max_time_lost {
                track.mark_removed();
            } else {
                lost_stracks.push(track);
            }
        }

        let tracked_stracks: Vec<STrack> = activated_stracks
            .into_iter()
            .chain(refind_stracks)
            .filter(|t| t.state == TrackState::Tracked)
            .collect();
        let lost_stracks = sub_stracks(lost_stracks, &tracked_stracks);

        let (tracked, lost) = remove_duplicate_stracks(&tracked_stracks, &lost_stracks);
        self.tracked_stracks = tracked;
        self.lost_stracks = lost;

        self.tracked_stracks
            .iter()
            .filter(|t| t.is_activated)
            .map(|t| TrackedBox {
                track_id: t.track_id,
                bbox: t.rect(),
                score: t.score,
            })
            .collect()
    }
}

fn rects(stracks: &[STrack]) -> Vec<Rect> {
    stracks.iter().map(STrack::rect).collect()
}

/// Union of two track lists, first occurrence of an identifier wins.
fn joint_stracks(tlista: Vec<STrack>, tlistb: &[STrack]) -> Vec<STrack> {
    let mut exists: HashSet<u64> = tlista.iter().map(|t| t.track_id).collect();
    let mut res = tlista;
    for t in tlistb {
        if exists.insert(t.track_id) {
            res.push(t.clone());
        }
    }
    res
}

/// Tracks of `tlista` whose identifier does not appear in `tlistb`.
fn sub_stracks(tlista: Vec<STrack>, tlistb: &[STrack]) -> Vec<STrack> {
    let b_ids: HashSet<u64> = tlistb.iter().map(|t| t.track_id).collect();
    tlista
        .into_iter()
        .filter(|t| !b_ids.contains(&t.track_id))
        .collect()
}

/// Drop the younger of every tracked/lost pair that overlaps almost entirely.
fn remove_duplicate_stracks(
    stracksa: &[STrack],
    stracksb: &[STrack],
) -> (Vec<STrack>, Vec<STrack>) {
    let dists = matching::iou_distance(&rects(stracksa), &rects(stracksb));
    let mut dupa = vec![false; stracksa.len()];
    let mut dupb = vec![false; stracksb.len()];

    for ((i, j), dist) in dists.indexed_iter() {
        if 1.0 - dist <= DUPLICATE_IOU {
            continue;
        }
        let age_a = stracksa[i].frame_id - stracksa[i].start_frame;
        let age_b = stracksb[j].frame_id - stracksb[j].start_frame;
        if age_a > age_b {
            dupb[j] = true;
        } else {
            dupa[i] = true;
        }
    }

    let keep = |tracks: &[STrack], dup: &[bool]| -> Vec<STrack> {
        tracks
            .iter()
            .zip(dup)
            .filter(|(_, dup)| !**dup)
            .map(|(t, _)| t.clone())
            .collect()
    };
    (keep(stracksa, &dupa), keep(stracksb, &dupb))
}
