//! Writing confirmed crops into per-identity folders.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage, imageops};

use crate::error::{LabelError, Result};
use crate::labeling::Roster;
use crate::tracker::Rect;

/// Destination for crops of confirmed identities.
pub trait CropWriter {
    /// Persist `crop` under `identity` and return where it went.
    fn write_crop(&mut self, identity: &str, crop: &RgbImage) -> Result<PathBuf>;

    /// Called once with the frozen roster before any stream starts.
    fn prepare(&mut self, _roster: &Roster) -> Result<()> {
        Ok(())
    }
}

/// Writes `<root>/<identity>/<timestamp>.<ext>`.
///
/// Timestamps have millisecond resolution; a `_N` suffix is appended when a
/// file with the same name already exists, so crops never replace each other.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    root: PathBuf,
    extension: String,
}

impl DatasetWriter {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Result<Self> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if ImageFormat::from_extension(&extension).is_none() {
            return Err(LabelError::config(format!(
                "unsupported image extension {extension:?}"
            )));
        }
        Ok(Self {
            root: root.into(),
            extension,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unique_path(&self, dir: &Path) -> PathBuf {
        let stem = chrono::Local::now().format("%Y%m%d%H%M%S%3f").to_string();
        let mut path = dir.join(format!("{stem}.{}", self.extension));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("{stem}_{suffix}.{}", self.extension));
            suffix += 1;
        }
        path
    }
}

impl CropWriter for DatasetWriter {
    /// Create one folder per declared identity.
    fn prepare(&mut self, roster: &Roster) -> Result<()> {
        for (_, name) in roster.identities() {
            fs::create_dir_all(self.root.join(name))?;
        }
        Ok(())
    }

    fn write_crop(&mut self, identity: &str, crop: &RgbImage) -> Result<PathBuf> {
        let dir = self.root.join(identity);
        fs::create_dir_all(&dir)?;
        let path = self.unique_path(&dir);
        crop.save(&path)?;
        log::debug!("saved {}x{} crop to {}", crop.width(), crop.height(), path.display());
        Ok(path)
    }
}

/// Copy the part of `frame` covered by `rect`, clipped to the frame.
pub fn crop(frame: &RgbImage, rect: &Rect) -> Option<RgbImage> {
    let (x, y, w, h) = rect.pixel_bounds(frame.width(), frame.height())?;
    Some(imageops::crop_imm(frame, x, y, w, h).to_image())
}
