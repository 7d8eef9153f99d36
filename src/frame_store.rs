//! Persists accepted frames before they are scored.
//!
//! Path-based scorers read the image back from disk, so every accepted
//! candidate is written to `<image_dir>/<lps>_image.png` first. A retaken
//! target simply overwrites its file.

use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::info;

use crate::error::{CaptureError, CaptureResult};
use crate::frame::CapturedFrame;
use crate::Lps;

/// Writes captured frames into a working directory.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the frame for `lps` is written.
    pub fn path_for(&self, lps: Lps) -> PathBuf {
        self.dir.join(format!("{lps}_image.png"))
    }

    /// Writes `capture` as 8-bit grayscale PNG and returns the path.
    pub fn persist(&self, capture: &CapturedFrame) -> CaptureResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(capture.target());
        let frame = capture.frame();
        let image = GrayImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| CaptureError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
                expected: frame.width() as usize * frame.height() as usize,
                actual: frame.pixels().len(),
            })?;
        image
            .save(&path)
            .map_err(|source| CaptureError::FrameStore {
                path: path.clone(),
                source,
            })?;
        info!(target = capture.target(), path = %path.display(), "captured image saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn test_persist_names_file_by_lps() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path().join("captured_images"));
        let capture = CapturedFrame::new(1, 57, Frame::new(2, 2, vec![0, 64, 128, 255]).unwrap());

        let path = store.persist(&capture).unwrap();
        assert_eq!(path, dir.path().join("captured_images").join("57_image.png"));

        let reloaded = image::open(&path).unwrap().into_luma8();
        assert_eq!(reloaded.into_raw(), vec![0, 64, 128, 255]);
    }
}
