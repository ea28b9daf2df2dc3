// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Batch captioning of image folders and video segments
//!
//! Items are processed one at a time in input order. A failing item is
//! logged, reported and counted; the batch carries on and sidecars that were
//! already written stay on disk.
//!
//! ```rust,no_run
//! use dataset_tagger::batch::BatchCaptioner;
//! use tokio::sync::mpsc;
//! # async fn run(captioner: BatchCaptioner, paths: Vec<std::path::PathBuf>) {
//! let (events_tx, mut events_rx) = mpsc::channel(32);
//! tokio::spawn(async move {
//!     while let Some(event) = events_rx.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//! let summary = captioner.caption_images(&paths, Some(events_tx)).await;
//! # }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::caption::{
    CaptionBackend, CaptionGenerator, CaptionOutcome, CaptionPolicy, CaptionRequest,
    GenerationParams,
};
use crate::config::TaggerConfig;
use crate::sidecar;
use crate::video::{
    is_video_path, plan_segments, segment_stem, Segment, SegmentOptions, VideoError, VideoTools,
};
use crate::vision::{is_image_path, Frame};

/// Progress updates during a batch run
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Batch started with this many items
    Started { total: usize },

    /// Item skipped because its sidecar already exists
    Skipped { index: usize, path: PathBuf },

    /// Caption written
    Captioned {
        index: usize,
        path: PathBuf,
        sidecar: PathBuf,
        outcome: CaptionOutcome,
        attempts: u32,
    },

    /// Item failed; the batch continues
    Failed {
        index: usize,
        path: PathBuf,
        error: String,
    },

    /// Batch complete
    Finished(BatchSummary),
}

/// Counts for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Sidecars written, degraded ones included
    pub succeeded: usize,
    /// Written sidecars whose caption was truncated, filtered or a placeholder
    pub degraded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn merge(&mut self, other: &BatchSummary) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.degraded += other.degraded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Where and how video segments are captioned
#[derive(Debug, Clone, Default)]
pub struct VideoJob {
    pub segments: SegmentOptions,
    /// Directory for segment sidecars and files; defaults to the video's directory
    pub out_dir: Option<PathBuf>,
    /// Also cut each segment into its own file sharing the sidecar's stem
    pub export_segments: bool,
}

enum ItemResult {
    Skipped,
    Written {
        sidecar: PathBuf,
        outcome: CaptionOutcome,
        attempts: u32,
    },
}

/// Captions images and video segments and writes the sidecars
pub struct BatchCaptioner {
    generator: CaptionGenerator,
    params: GenerationParams,
    prompt: String,
    video_prompt: Option<String>,
    segments: SegmentOptions,
    skip_existing: bool,
    tools: VideoTools,
}

impl BatchCaptioner {
    pub fn new(backend: Arc<dyn CaptionBackend>, policy: CaptionPolicy) -> Self {
        Self {
            generator: CaptionGenerator::new(backend, policy),
            params: GenerationParams::default(),
            prompt: String::new(),
            video_prompt: None,
            segments: SegmentOptions::default(),
            skip_existing: false,
            tools: VideoTools::default(),
        }
    }

    /// Captioner with policy, parameters, prompts and segment defaults from `config`
    pub fn from_config(config: &TaggerConfig, backend: Arc<dyn CaptionBackend>) -> Self {
        let mut captioner = Self::new(backend, config.policy())
            .with_params(config.generation_params())
            .with_prompt(config.default_prompt.clone())
            .with_attempt_timeout(config.attempt_timeout());
        captioner.video_prompt = config.video_prompt.clone();
        captioner.segments = config.segments;
        captioner
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Instruction text; blank selects the built-in default prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_video_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.video_prompt = Some(prompt.into());
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.generator = self.generator.with_attempt_timeout(timeout);
        self
    }

    pub fn with_tools(mut self, tools: VideoTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn segment_options(&self) -> &SegmentOptions {
        &self.segments
    }

    fn video_prompt(&self) -> &str {
        self.video_prompt.as_deref().unwrap_or(&self.prompt)
    }

    /// Caption each image in `paths` and write its sidecar
    pub async fn caption_images(
        &self,
        paths: &[PathBuf],
        events: Option<Sender<BatchEvent>>,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            total: paths.len(),
            ..Default::default()
        };
        emit(&events, BatchEvent::Started { total: paths.len() }).await;
        info!("captioning {} images with {}", paths.len(), self.generator.backend_name());

        for (index, path) in paths.iter().enumerate() {
            let result = self.caption_image(path).await;
            record(&mut summary, &events, index, path, result).await;
        }

        info!(
            "batch finished: {} written ({} degraded), {} skipped, {} failed",
            summary.succeeded, summary.degraded, summary.skipped, summary.failed
        );
        emit(&events, BatchEvent::Finished(summary)).await;
        summary
    }

    async fn caption_image(&self, path: &Path) -> Result<ItemResult> {
        if self.skip_existing && sidecar::has_caption(path).await {
            return Ok(ItemResult::Skipped);
        }

        let owned = path.to_path_buf();
        let frame = tokio::task::spawn_blocking(move || Frame::open(owned))
            .await
            .map_err(|e| anyhow!("Image decode task failed: {}", e))?
            .with_context(|| format!("Failed to load {}", path.display()))?;

        let request = CaptionRequest::new(vec![frame], self.prompt.clone()).with_params(self.params);
        self.write_result(path, &request).await
    }

    async fn write_result(&self, media: &Path, request: &CaptionRequest) -> Result<ItemResult> {
        let result = self.generator.generate(request).await?;
        let sidecar = sidecar::write_caption(media, &result.text)
            .await
            .with_context(|| format!("Failed to write caption for {}", media.display()))?;
        Ok(ItemResult::Written {
            sidecar,
            outcome: result.outcome,
            attempts: result.attempts,
        })
    }

    /// Split `video` into segments and caption each one from its sampled frames.
    ///
    /// Probing the video is the only step whose failure aborts the run; a
    /// failing segment is counted and the next one is processed.
    pub async fn caption_video(
        &self,
        video: &Path,
        job: &VideoJob,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchSummary, VideoError> {
        let info = self.tools.probe(video).await?;
        let segments = plan_segments(&info, &job.segments);
        let out_dir = job
            .out_dir
            .clone()
            .or_else(|| video.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        if !out_dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&out_dir).await?;
        }

        let mut summary = BatchSummary {
            total: segments.len(),
            ..Default::default()
        };
        emit(&events, BatchEvent::Started { total: segments.len() }).await;
        info!(
            "captioning {} as {} segments of {}s",
            video.display(),
            segments.len(),
            job.segments.segment_secs
        );

        for segment in &segments {
            let media = segment_media_path(video, &out_dir, segment.index);
            let result = self
                .caption_segment(video, &media, segment, info.fps, job.export_segments)
                .await;
            record(&mut summary, &events, segment.index, &media, result).await;
        }

        emit(&events, BatchEvent::Finished(summary)).await;
        Ok(summary)
    }

    async fn caption_segment(
        &self,
        video: &Path,
        media: &Path,
        segment: &Segment,
        fps: f64,
        export: bool,
    ) -> Result<ItemResult> {
        if self.skip_existing && sidecar::has_caption(media).await {
            return Ok(ItemResult::Skipped);
        }

        let frames = self
            .tools
            .extract_segment_frames(video, segment, fps)
            .await
            .with_context(|| format!("Failed to extract frames for segment {}", segment.index))?;
        let request =
            CaptionRequest::new(frames, self.video_prompt().to_string()).with_params(self.params);
        let written = self.write_result(media, &request).await?;

        if export {
            self.tools
                .cut_segment(video, segment, media)
                .await
                .with_context(|| format!("Failed to cut segment {}", segment.index))?;
        }
        Ok(written)
    }

    /// Caption files and directories: directories are expanded with
    /// `collect_media`, images go through `caption_images` and each video
    /// through `caption_video` with the default segment options.
    pub async fn caption_paths(
        &self,
        inputs: &[PathBuf],
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchSummary> {
        let mut images = Vec::new();
        let mut videos = Vec::new();
        for input in inputs {
            let files = if input.is_dir() {
                collect_media(input).await?
            } else {
                vec![input.clone()]
            };
            for file in files {
                if is_video_path(&file) {
                    videos.push(file);
                } else {
                    images.push(file);
                }
            }
        }

        let mut summary = BatchSummary::default();
        if !images.is_empty() {
            summary.merge(&self.caption_images(&images, events.clone()).await);
        }

        let job = VideoJob {
            segments: self.segments,
            ..Default::default()
        };
        for video in &videos {
            match self.caption_video(video, &job, events.clone()).await {
                Ok(video_summary) => summary.merge(&video_summary),
                Err(e) => {
                    warn!("failed to caption video {}: {}", video.display(), e);
                    summary.total += 1;
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Image and video files directly inside `dir`, sorted by path
pub async fn collect_media(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && (is_image_path(&path) || is_video_path(&path)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Segment media path `<out_dir>/<stem>_<index:03>.<ext>`; its sidecar shares the stem
pub fn segment_media_path(video: &Path, out_dir: &Path, index: usize) -> PathBuf {
    let stem = segment_stem(video, index);
    let name = match video.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy()),
        None => stem,
    };
    out_dir.join(name)
}

async fn emit(events: &Option<Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

async fn record(
    summary: &mut BatchSummary,
    events: &Option<Sender<BatchEvent>>,
    index: usize,
    path: &Path,
    result: Result<ItemResult>,
) {
    let event = match result {
        Ok(ItemResult::Skipped) => {
            summary.skipped += 1;
            info!("skipping {}: caption exists", path.display());
            BatchEvent::Skipped {
                index,
                path: path.to_path_buf(),
            }
        }
        Ok(ItemResult::Written {
            sidecar,
            outcome,
            attempts,
        }) => {
            summary.succeeded += 1;
            if outcome != CaptionOutcome::Accepted {
                summary.degraded += 1;
                warn!("{}: caption {} after {} attempts", path.display(), outcome.as_str(), attempts);
            } else {
                info!("{}: captioned in {} attempts", path.display(), attempts);
            }
            BatchEvent::Captioned {
                index,
                path: path.to_path_buf(),
                sidecar,
                outcome,
                attempts,
            }
        }
        Err(e) => {
            summary.failed += 1;
            warn!("{}: {:#}", path.display(), e);
            BatchEvent::Failed {
                index,
                path: path.to_path_buf(),
                error: format!("{:#}", e),
            }
        }
    };
    emit(events, event).await;
}
