//! Tracker parameters and the per-run record written next to the dataset.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LabelError, Result};

/// File name of the tracker record inside the output directory.
pub const TRACKER_RECORD_FILE: &str = "tracker.yaml";

/// Detection filtering and ByteTrack association parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections scoring below this are discarded before tracking.
    pub conf_thresh: f32,
    /// Overlap above which a weaker detection is suppressed.
    pub iou_thresh: f32,
    /// Detections at or above this take part in the first association.
    pub track_high_thresh: f32,
    /// Detections above this (and below the high threshold) take part in the
    /// second association.
    pub track_low_thresh: f32,
    /// Minimum score for an unmatched detection to start a new track.
    pub new_track_thresh: f32,
    /// Frames a lost track is kept for re-identification (at 30 fps).
    pub track_buffer: u32,
    /// Maximum fused IoU cost accepted by the first association.
    pub match_thresh: f32,
    pub frame_rate: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            conf_thresh: 0.2,
            iou_thresh: 0.75,
            track_high_thresh: 0.5,
            track_low_thresh: 0.1,
            new_track_thresh: 0.5,
            track_buffer: 300,
            match_thresh: 0.8,
            frame_rate: 30.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("conf_thresh", self.conf_thresh),
            ("iou_thresh", self.iou_thresh),
            ("track_high_thresh", self.track_high_thresh),
            ("track_low_thresh", self.track_low_thresh),
            ("new_track_thresh", self.new_track_thresh),
            ("match_thresh", self.match_thresh),
        ] {
            check_unit_interval(name, value)?;
        }
        if self.track_buffer == 0 {
            return Err(LabelError::config("track_buffer must be greater than 0"));
        }
        if self.track_low_thresh > self.track_high_thresh {
            return Err(LabelError::config(format!(
                "track_low_thresh ({}) exceeds track_high_thresh ({})",
                self.track_low_thresh, self.track_high_thresh
            )));
        }
        if !(self.frame_rate > 0.0) {
            return Err(LabelError::config("frame_rate must be positive"));
        }
        Ok(())
    }

    /// Number of frames a lost track survives at the configured frame rate.
    pub fn max_time_lost(&self) -> u32 {
        (self.frame_rate / 30.0 * self.track_buffer as f32) as u32
    }

    /// Write the run record into `output_dir` and return its path.
    pub fn save_record(&self, output_dir: &Path) -> Result<PathBuf> {
        let record = TrackerRecord {
            tracker_type: "bytetrack".to_string(),
            params: self.clone(),
            fuse_score: true,
        };
        let path = output_dir.join(TRACKER_RECORD_FILE);
        fs::write(&path, serde_yaml::to_string(&record)?)?;
        log::info!("tracker parameters written to {}", path.display());
        Ok(path)
    }

    pub fn load_record(path: &Path) -> Result<Self> {
        let record: TrackerRecord = serde_yaml::from_str(&fs::read_to_string(path)?)?;
        Ok(record.params)
    }
}

/// Human-readable key/value record of the parameters a run used.
#[derive(Debug, Serialize, Deserialize)]
struct TrackerRecord {
    tracker_type: String,
    #[serde(flatten)]
    params: TrackerConfig,
    fuse_score: bool,
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(LabelError::config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Parse a threshold typed by the operator.
pub fn parse_threshold(name: &str, text: &str) -> Result<f32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LabelError::config(format!("{name} is empty")));
    }
    let value: f32 = trimmed
        .parse()
        .map_err(|_| LabelError::config(format!("{name} is not a number: {trimmed:?}")))?;
    check_unit_interval(name, value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let config = TrackerConfig {
            match_thresh: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LabelError::Config(_))));

        let config = TrackerConfig {
            track_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            track_low_thresh: 0.6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold("iou", " 0.75 ").unwrap(), 0.75);
        assert!(parse_threshold("iou", "").is_err());
        assert!(parse_threshold("iou", "0,75").is_err());
        assert!(parse_threshold("iou", "2").is_err());
    }

    #[test]
    fn test_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            track_buffer: 120,
            ..Default::default()
        };
        let path = config.save_record(dir.path()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("tracker_type: bytetrack"));
        assert!(text.contains("fuse_score: true"));
        assert_eq!(TrackerConfig::load_record(&path).unwrap(), config);
    }
}
