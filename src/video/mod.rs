// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Video segmentation and frame sampling through ffmpeg

pub mod ffmpeg;
pub mod segment;

use thiserror::Error;

use crate::vision::ImageError;

pub use ffmpeg::{is_video_path, parse_probe_output, VideoTools, VIDEO_EXTENSIONS};
pub use segment::{plan_segments, sample_indices, segment_stem, Segment, SegmentOptions, VideoInfo};

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Failed to run tool: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} exited with status {status:?}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Frame decode failed: {0}")]
    Frame(#[from] ImageError),
}
