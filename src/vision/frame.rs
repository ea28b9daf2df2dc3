// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Frames handed to a caption backend

use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

use super::image_utils::{decode_image_bytes, ImageError};

/// A single decoded image sent to a caption backend.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<DynamicImage>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Decode a frame from encoded image bytes (PNG, JPEG, WebP, ...)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let (image, _) = decode_image_bytes(bytes)?;
        Ok(Self::new(image))
    }

    /// Read and decode a frame from disk. Blocking.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl From<DynamicImage> for Frame {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

/// Pad `frames` by repeating the last frame until it holds at least `min` entries.
///
/// Multi-image chat backends reject a lone image, so a single frame goes out
/// as two identical parts.
pub fn pad_frames(frames: &[Frame], min: usize) -> Vec<Frame> {
    let mut padded = frames.to_vec();
    if let Some(last) = frames.last() {
        while padded.len() < min {
            padded.push(last.clone());
        }
    }
    padded
}
