//! Cost matrices and assignment for the ByteTrack association steps.

use crate::tracker::rect::Rect;
use ndarray::Array2;

/// Detector output fed into the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: Rect,
    pub score: f32,
}

impl Detection {
    /// Detection from a TLBR box (x1, y1, x2, y2).
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), score)
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// `1 - IoU` for every (track, detection) pair.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    Array2::from_shape_fn((track_boxes.len(), det_boxes.len()), |(i, j)| {
        1.0 - track_boxes[i].iou(&det_boxes[j])
    })
}

/// Weight IoU similarity by detection confidence.
pub fn fuse_score(cost_matrix: &mut Array2<f32>, scores: &[f32]) {
    for ((_, j), cost) in cost_matrix.indexed_iter_mut() {
        *cost = 1.0 - (1.0 - *cost) * scores[j];
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Solve the rectangular assignment problem, discarding pairs costlier than
/// `thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();
    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: Vec::new(),
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    // lapjv needs a square matrix; padding cells are never worth taking.
    let size = num_rows.max(num_cols);
    let padded = Array2::<f64>::from_shape_fn((size, size), |(i, j)| {
        if i < num_rows && j < num_cols {
            cost_matrix[[i, j]] as f64
        } else {
            1e6
        }
    });

    let mut result = AssignmentResult::default();
    let mut detection_taken = vec![false; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(num_rows) {
                if col < num_cols && cost_matrix[[row, col]] <= thresh {
                    result.matches.push((row, col));
                    detection_taken[col] = true;
                } else {
                    result.unmatched_tracks.push(row);
                }
            }
        }
        Err(err) => {
            log::warn!("linear assignment failed: {:?}", err);
            result.unmatched_tracks = (0..num_rows).collect();
        }
    }

    result.unmatched_detections = detection_taken
        .iter()
        .enumerate()
        .filter_map(|(j, &taken)| (!taken).then_some(j))
        .collect();
    result
}
