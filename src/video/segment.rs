// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-duration segment planning and evenly spaced frame sampling

use serde::Serialize;
use std::path::Path;

/// Tolerance when converting segment boundaries to frame numbers
const FRAME_EPSILON: f64 = 1e-6;

/// Video metadata needed for planning
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub fps: f64,
    /// Total frames; estimated from duration and fps when the container omits it
    pub frame_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    /// Length of each segment
    pub segment_secs: f64,
    /// Frames sampled per segment and sent to the backend
    pub frames_per_segment: usize,
    /// A trailing partial segment shorter than this is dropped
    pub min_segment_secs: f64,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            segment_secs: 5.0,
            frames_per_segment: 4,
            min_segment_secs: 1.0,
        }
    }
}

impl SegmentOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.segment_secs.is_nan() || self.segment_secs <= 0.0 {
            return Err(format!(
                "segment_secs must be greater than 0, got {}",
                self.segment_secs
            ));
        }
        if self.frames_per_segment == 0 {
            return Err("frames_per_segment must be greater than 0".to_string());
        }
        if self.min_segment_secs < 0.0 || self.min_segment_secs > self.segment_secs {
            return Err(format!(
                "min_segment_secs must be between 0 and segment_secs ({}), got {}",
                self.segment_secs, self.min_segment_secs
            ));
        }
        Ok(())
    }
}

/// One slice of a source video, captioned as an independent item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    /// Frame numbers to sample, ascending
    pub frame_indices: Vec<u64>,
}

impl Segment {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Timestamps of the sampled frames
    pub fn timestamps(&self, fps: f64) -> Vec<f64> {
        self.frame_indices
            .iter()
            .map(|&i| if fps > 0.0 { i as f64 / fps } else { 0.0 })
            .collect()
    }
}

/// `n` evenly spaced integers from `start` to `end`, both inclusive.
///
/// Same as `numpy.linspace(start, end, n).astype(int)`: a single sample is
/// `start`, and no samples are produced for `n == 0` or `end < start`.
pub fn sample_indices(start: u64, end: u64, n: usize) -> Vec<u64> {
    if n == 0 || end < start {
        return Vec::new();
    }
    if n == 1 {
        return vec![start];
    }

    let step = (end - start) as f64 / (n - 1) as f64;
    (0..n)
        .map(|i| {
            if i == n - 1 {
                end
            } else {
                (start as f64 + step * i as f64).floor() as u64
            }
        })
        .collect()
}

/// Cut `info` into consecutive segments of `options.segment_secs`
pub fn plan_segments(info: &VideoInfo, options: &SegmentOptions) -> Vec<Segment> {
    if info.duration_secs <= 0.0 || options.segment_secs <= 0.0 {
        return Vec::new();
    }

    let last_frame = info.frame_count.saturating_sub(1);
    let mut segments = Vec::new();
    let mut start = 0.0_f64;

    while start < info.duration_secs {
        let end = (start + options.segment_secs).min(info.duration_secs);
        let length = end - start;
        let is_partial = length + f64::EPSILON < options.segment_secs;
        // a video shorter than the minimum still yields its one segment
        if is_partial && length < options.min_segment_secs && !segments.is_empty() {
            break;
        }

        // first frame at or after `start`, last frame strictly before `end`
        let first = (((start * info.fps - FRAME_EPSILON).ceil().max(0.0)) as u64).min(last_frame);
        let last = ((((end * info.fps - FRAME_EPSILON).ceil()) as u64).saturating_sub(1))
            .max(first)
            .min(last_frame);

        segments.push(Segment {
            index: segments.len(),
            start_secs: start,
            end_secs: end,
            frame_indices: sample_indices(first, last, options.frames_per_segment),
        });
        start = end;
    }

    segments
}

/// File stem shared by a segment's media file and its sidecar: `<stem>_<index:03>`
pub fn segment_stem(video: &Path, index: usize) -> String {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    format!("{}_{:03}", stem, index)
}
