//! Frame source that replays image files from a directory.
//!
//! Handy for re-running a calibration against frames grabbed earlier by the
//! camera vendor's tool. Files are read in name order and the sequence loops.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::frame::{Frame, FrameSource};

/// File extensions the replay source picks up.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff"];

/// Loops over the images found in a directory.
#[derive(Debug)]
pub struct DirectorySource {
    name: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    /// Scans `dir` for images.
    ///
    /// # Errors
    /// Fails if the directory cannot be read or holds no images.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        anyhow::ensure!(!files.is_empty(), "no images found in {}", dir.display());
        debug!(dir = %dir.display(), count = files.len(), "frame directory scanned");
        Ok(Self {
            name: format!("dir:{}", dir.display()),
            files,
            next: 0,
        })
    }

    /// Images in replay order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let path = &self.files[self.next % self.files.len()];
        self.next = self.next.wrapping_add(1);
        let gray = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .into_luma8();
        let (width, height) = gray.dimensions();
        Ok(Some(Frame::new(width, height, gray.into_raw())?))
    }
}
