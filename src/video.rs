//! Video frames and where they come from.
//!
//! Camera acquisition is an external collaborator; a [`FrameSource`] is the
//! seam the session reads through. [`ImageSequenceSource`] plays back still
//! images from disk, which is enough to drive the viewer and the tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{TryOnError, TryOnResult};

/// One decoded camera frame.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// Increases by one per frame of a source.
    pub index: u64,
    pub image: Arc<RgbaImage>,
}

impl VideoFrame {
    pub fn new(index: u64, image: RgbaImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width() as f32, self.height() as f32)
    }
}

/// A camera stream.
pub trait FrameSource {
    /// Acquires the stream. Failing here ends the session.
    fn open(&mut self) -> TryOnResult<()>;

    /// The next frame, or `None` when the stream is closed or exhausted.
    fn next_frame(&mut self) -> Option<VideoFrame>;

    /// Releases the stream.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Loops over a still image or a directory of images.
#[derive(Debug, Default)]
pub struct ImageSequenceSource {
    path: Option<PathBuf>,
    frames: Vec<Arc<RgbaImage>>,
    next_index: u64,
    open: bool,
}

impl ImageSequenceSource {
    /// A source reading `path` when opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// A source over images already in memory.
    pub fn from_images(images: Vec<RgbaImage>) -> Self {
        Self {
            path: None,
            frames: images.into_iter().map(Arc::new).collect(),
            ..Default::default()
        }
    }

    fn read_frames(path: &Path) -> TryOnResult<Vec<Arc<RgbaImage>>> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                })
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        files
            .iter()
            .map(|file| Ok(Arc::new(image::open(file)?.to_rgba8())))
            .collect()
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> TryOnResult<()> {
        if let Some(path) = &self.path {
            self.frames = Self::read_frames(path)
                .map_err(|e| TryOnError::camera(format!("{}: {e}", path.display())))?;
        }
        if self.frames.is_empty() {
            return Err(TryOnError::camera("no frames available"));
        }
        tracing::info!(frames = self.frames.len(), "video source opened");
        self.open = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        if !self.open || self.frames.is_empty() {
            return None;
        }
        let slot = (self.next_index % self.frames.len() as u64) as usize;
        let frame = VideoFrame {
            index: self.next_index,
            image: Arc::clone(&self.frames[slot]),
        };
        self.next_index += 1;
        Some(frame)
    }

    fn close(&mut self) {
        if self.open {
            tracing::debug!("video source closed");
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
