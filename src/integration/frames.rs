//! Decoded frames and the sources that produce them.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{LabelError, Result};

/// Extensions decoded by [`ImageSequence`].
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Frame directory name inside a MOTChallenge sequence.
const MOT_FRAMES_DIR: &str = "img1";
/// Detection file inside a MOTChallenge sequence.
const MOT_DETECTIONS: &str = "det/det.txt";

/// One decoded frame with its zero-based position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

/// Sequential frame decoder for one stream.
pub trait FrameSource {
    /// Decode the next frame, `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

/// Frames stored as individual image files, decoded in file name order.
#[derive(Debug)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    position: usize,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self> {
        let paths = list_images(dir)?;
        if paths.is_empty() {
            return Err(LabelError::frame_source(format!(
                "no frames found in {}",
                dir.display()
            )));
        }
        log::debug!("{} frames in {}", paths.len(), dir.display());
        Ok(Self { paths, position: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        let image = image::open(path)?.to_rgb8();
        let frame = Frame {
            index: self.position as u64,
            image,
        };
        self.position += 1;
        Ok(Some(frame))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// A video stored as a frame directory plus its precomputed detections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInput {
    pub name: String,
    pub frames_dir: PathBuf,
    pub detections: PathBuf,
}

/// Find every sequence directly under `dir`.
///
/// A sequence is a sub-directory holding frames either directly or in
/// `img1/`; its detections are expected at `det/det.txt`.
pub fn discover_sequences(dir: &Path) -> Result<Vec<SequenceInput>> {
    let mut sequences = Vec::new();
    for entry in fs::read_dir(dir)? {
        let root = entry?.path();
        if !root.is_dir() {
            continue;
        }
        let nested = root.join(MOT_FRAMES_DIR);
        let frames_dir = if nested.is_dir() { nested } else { root.clone() };
        if list_images(&frames_dir)?.is_empty() {
            log::debug!("skipping {}: no frames", root.display());
            continue;
        }
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        sequences.push(SequenceInput {
            name,
            frames_dir,
            detections: root.join(MOT_DETECTIONS),
        });
    }
    sequences.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, count: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_pixel(8, 6, Rgb([i as u8, 0, 0]));
            img.save(dir.join(format!("{:06}.png", i + 1))).unwrap();
        }
    }

    #[test]
    fn test_image_sequence_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut seq = ImageSequence::open(dir.path()).unwrap();
        assert_eq!(seq.len(), 3);
        for expected in 0..3u64 {
            let frame = seq.next_frame().unwrap().unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!(frame.image.get_pixel(0, 0)[0], expected as u8);
        }
        assert!(seq.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequence::open(dir.path()),
            Err(LabelError::FrameSource(_))
        ));
    }

    #[test]
    fn test_discover_sequences() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(&dir.path().join("cage-b").join("img1"), 2);
        write_frames(&dir.path().join("cage-a"), 1);
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let found = discover_sequences(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cage-a", "cage-b"]);
        assert!(found[1].frames_dir.ends_with("img1"));
        assert!(found[0].detections.ends_with("det/det.txt"));
    }
}
