// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ffprobe/ffmpeg invocation for probing, frame extraction and segment cutting

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::segment::{Segment, VideoInfo};
use super::VideoError;
use crate::vision::Frame;

/// File extensions treated as videos when scanning a dataset folder
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];

/// Whether `path` carries one of the video extensions (case-insensitive)
pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Turn `ffprobe -of json` output into `VideoInfo`
pub fn parse_probe_output(json: &str) -> Result<VideoInfo, VideoError> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|e| VideoError::Probe(e.to_string()))?;
    let stream = output
        .streams
        .first()
        .ok_or_else(|| VideoError::Probe("no video stream".to_string()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| VideoError::Probe("missing frame rate".to_string()))?;

    let duration_secs = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| VideoError::Probe("missing duration".to_string()))?;

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration_secs * fps).round() as u64);

    Ok(VideoInfo {
        duration_secs,
        fps,
        frame_count,
    })
}

/// Locations of the ffmpeg and ffprobe executables
#[derive(Debug, Clone)]
pub struct VideoTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for VideoTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl VideoTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Duration, frame rate and frame count of the first video stream
    pub async fn probe(&self, video: &Path) -> Result<VideoInfo, VideoError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate,avg_frame_rate,nb_frames,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(video);

        let stdout = run(cmd, "ffprobe").await?;
        let json = String::from_utf8_lossy(&stdout);
        let info = parse_probe_output(&json)?;
        debug!(
            "probed {}: {:.2}s at {:.3} fps, {} frames",
            video.display(),
            info.duration_secs,
            info.fps,
            info.frame_count
        );
        Ok(info)
    }

    /// Decode the frame shown at `timestamp_secs`
    pub async fn extract_frame(&self, video: &Path, timestamp_secs: f64) -> Result<Frame, VideoError> {
        let seek = format!("{:.3}", timestamp_secs);
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-ss", seek.as_str(), "-i"])
            .arg(video)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"]);

        let stdout = run(cmd, "ffmpeg").await?;
        if stdout.is_empty() {
            return Err(VideoError::Probe(format!(
                "no frame at {:.3}s in {}",
                timestamp_secs,
                video.display()
            )));
        }
        Ok(Frame::from_bytes(&stdout)?)
    }

    /// Decode every sampled frame of `segment`, in order
    pub async fn extract_segment_frames(
        &self,
        video: &Path,
        segment: &Segment,
        fps: f64,
    ) -> Result<Vec<Frame>, VideoError> {
        let mut frames = Vec::with_capacity(segment.frame_indices.len());
        for timestamp in segment.timestamps(fps) {
            frames.push(self.extract_frame(video, timestamp).await?);
        }
        Ok(frames)
    }

    /// Copy the streams of `segment` into `out` without re-encoding
    pub async fn cut_segment(&self, video: &Path, segment: &Segment, out: &Path) -> Result<(), VideoError> {
        let seek = format!("{:.3}", segment.start_secs);
        let length = format!("{:.3}", segment.duration_secs());
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-ss", seek.as_str(), "-i"])
            .arg(video)
            .args(["-t", length.as_str(), "-c", "copy"])
            .arg(out);

        run(cmd, "ffmpeg").await?;
        debug!("cut segment {} into {}", segment.index, out.display());
        Ok(())
    }
}

async fn run(mut cmd: Command, tool: &'static str) -> Result<Vec<u8>, VideoError> {
    let output = cmd.kill_on_drop(true).output().await?;
    if !output.status.success() {
        return Err(VideoError::ToolFailed {
            tool,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}
