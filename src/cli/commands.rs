// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::batch::{BatchCaptioner, BatchEvent, BatchSummary, VideoJob};
use crate::config::TaggerConfig;
use crate::version;
use crate::vision::VlmClient;

/// Arguments for the caption command
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image or video files, or directories to scan
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Instruction text (overrides [prompts] default)
    #[arg(long)]
    pub prompt: Option<String>,

    /// Leave items that already have a caption file untouched
    #[arg(long)]
    pub skip_existing: bool,
}

/// Arguments for the video command
#[derive(Args, Debug)]
pub struct VideoArgs {
    /// Video file to segment
    pub video: PathBuf,

    /// Segment length in seconds (overrides [video] segment_secs)
    #[arg(long)]
    pub segment_secs: Option<f64>,

    /// Frames sampled per segment (overrides [video] frames_per_segment)
    #[arg(long)]
    pub frames_per_segment: Option<usize>,

    /// Output directory for captions and segment files
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Also cut each segment into its own file
    #[arg(long)]
    pub export_segments: bool,

    /// Instruction text (overrides [prompts] video)
    #[arg(long)]
    pub prompt: Option<String>,

    /// Leave segments that already have a caption file untouched
    #[arg(long)]
    pub skip_existing: bool,
}

fn build_captioner(config: &TaggerConfig) -> Result<BatchCaptioner> {
    let endpoint = config.active_endpoint();
    let client = VlmClient::new(endpoint)?;
    info!(
        "{} using {} at {}",
        version::get_version_string(),
        endpoint.model,
        endpoint.base_url
    );
    Ok(BatchCaptioner::from_config(config, Arc::new(client)))
}

/// Print progress events until the sender side is dropped
fn spawn_progress_printer() -> (mpsc::Sender<BatchEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<BatchEvent>(64);
    let handle = tokio::spawn(async move {
        let mut total = 0;
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Started { total: n } => total = n,
                BatchEvent::Skipped { index, path } => {
                    println!("[{}/{}] skipped {}", index + 1, total, path.display());
                }
                BatchEvent::Captioned {
                    index,
                    sidecar,
                    outcome,
                    attempts,
                    ..
                } => {
                    println!(
                        "[{}/{}] {} ({}, {} attempts)",
                        index + 1,
                        total,
                        sidecar.display(),
                        outcome.as_str(),
                        attempts
                    );
                }
                BatchEvent::Failed { index, path, error } => {
                    println!("[{}/{}] FAILED {}: {}", index + 1, total, path.display(), error);
                }
                BatchEvent::Finished(_) => {}
            }
        }
    });
    (tx, handle)
}

fn report(summary: &BatchSummary) -> Result<()> {
    println!(
        "\nDone: {} items, {} written ({} degraded), {} skipped, {} failed",
        summary.total, summary.succeeded, summary.degraded, summary.skipped, summary.failed
    );
    if summary.has_failures() {
        return Err(anyhow!("{} of {} items failed", summary.failed, summary.total));
    }
    Ok(())
}

pub async fn caption(config_path: &Path, args: CaptionArgs) -> Result<()> {
    let config = TaggerConfig::load(config_path)?;
    let mut captioner = build_captioner(&config)?.with_skip_existing(args.skip_existing);
    if let Some(prompt) = args.prompt {
        captioner = captioner.with_prompt(prompt);
    }

    let (tx, printer) = spawn_progress_printer();
    let summary = captioner.caption_paths(&args.paths, Some(tx)).await?;
    printer.await?;
    report(&summary)
}

pub async fn video(config_path: &Path, args: VideoArgs) -> Result<()> {
    let config = TaggerConfig::load(config_path)?;
    let mut captioner = build_captioner(&config)?.with_skip_existing(args.skip_existing);
    if let Some(prompt) = args.prompt {
        captioner = captioner.with_video_prompt(prompt);
    }

    let mut segments = config.segments;
    if let Some(secs) = args.segment_secs {
        segments.segment_secs = secs;
        segments.min_segment_secs = segments.min_segment_secs.min(secs);
    }
    if let Some(frames) = args.frames_per_segment {
        segments.frames_per_segment = frames;
    }
    segments.validate().map_err(|e| anyhow!(e))?;

    let job = VideoJob {
        segments,
        out_dir: args.out_dir,
        export_segments: args.export_segments,
    };

    let (tx, printer) = spawn_progress_printer();
    let summary = captioner.caption_video(&args.video, &job, Some(tx)).await?;
    printer.await?;
    report(&summary)
}

pub async fn check(config_path: &Path) -> Result<()> {
    let config = TaggerConfig::load(config_path)?;
    let endpoint = config.active_endpoint();
    println!("{}", serde_json::to_string_pretty(&version::get_version_info())?);
    println!("Config: {}", config_path.display());
    println!("Backend: {} ({})", endpoint.kind, endpoint.model);
    println!("Base URL: {}", endpoint.base_url);
    println!(
        "Policy: length {}..={}, {} attempts, {} banned words",
        config.min_length,
        config.max_length,
        config.max_attempts,
        config.banned_words.len()
    );

    let client = VlmClient::new(endpoint)?;
    if !client.health_check().await {
        return Err(anyhow!("backend at {} is not reachable", endpoint.base_url));
    }
    println!("Backend reachable");
    Ok(())
}
