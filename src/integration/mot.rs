//! Precomputed detections in the MOTChallenge `det.txt` layout.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fs;
use std::path::Path;

use crate::error::{LabelError, Result};
use crate::integration::{DetectionBuilder, DetectionSource, Frame};
use crate::tracker::Detection;

/// Detections keyed by zero-based frame index.
///
/// Each line reads `frame,id,left,top,width,height,conf[,x,y,z]` with
/// one-based frame numbers. The `id` column is ignored.
#[derive(Debug, Default, Clone)]
pub struct MotDetections {
    by_frame: HashMap<u64, Vec<Detection>>,
}

impl MotDetections {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            LabelError::config(format!("cannot read detections {}: {err}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut by_frame: HashMap<u64, Vec<Detection>> = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (frame, detection) = parse_line(line).ok_or_else(|| {
                LabelError::detector(format!("malformed detection on line {}: {line}", lineno + 1))
            })?;
            by_frame.entry(frame).or_default().push(detection);
        }
        Ok(Self { by_frame })
    }

    pub fn frame_count(&self) -> usize {
        self.by_frame.len()
    }
}

fn parse_line(line: &str) -> Option<(u64, Detection)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 7 {
        return None;
    }
    let frame: u64 = fields[0].parse().ok()?;
    let mut values = [0f32; 5];
    for (value, field) in values.iter_mut().zip(&fields[2..7]) {
        *value = field.parse().ok()?;
    }
    let [left, top, width, height, conf] = values;
    let detection = DetectionBuilder::new()
        .tlwh(left, top, width, height)
        .score(conf)
        .build();
    Some((frame.checked_sub(1)?, detection))
}

impl DetectionSource for MotDetections {
    type Error = Infallible;

    fn detect(&mut self, frame: &Frame) -> std::result::Result<Vec<Detection>, Self::Error> {
        Ok(self.by_frame.get(&frame.index).cloned().unwrap_or_default())
    }
}
