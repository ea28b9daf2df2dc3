// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Batch runs over temporary dataset folders

use async_trait::async_trait;
use dataset_tagger::batch::{BatchCaptioner, BatchEvent, VideoJob};
use dataset_tagger::caption::{
    BackendError, CaptionBackend, CaptionOutcome, CaptionPolicy, GenerationParams,
};
use dataset_tagger::sidecar::{read_caption, sidecar_path, write_caption};
use dataset_tagger::video::{VideoError, VideoTools};
use dataset_tagger::vision::Frame;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Returns replies in order, one per call; fails once the script runs out
struct Scripted {
    replies: Vec<Result<String, u16>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(replies: Vec<Result<&str, u16>>) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CaptionBackend for Scripted {
    async fn complete(
        &self,
        _prompt: &str,
        _frames: &[Frame],
        _params: &GenerationParams,
    ) -> Result<String, BackendError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(idx) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(status)) => Err(BackendError::Status {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            None => Err(BackendError::EmptyResponse),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn write_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::new_rgb8(16, 16).save(&path).unwrap();
    path
}

#[tokio::test]
async fn test_captions_written_next_to_images() {
    let dir = TempDir::new().unwrap();
    let a = write_image(dir.path(), "a.png");
    let b = write_image(dir.path(), "b.png");

    let backend = Scripted::new(vec![
        Ok("a small black square on white"),
        Ok("another small black square"),
    ]);
    let captioner = BatchCaptioner::new(backend.clone(), CaptionPolicy::new(10, 200, 1));
    let summary = captioner.caption_images(&[a.clone(), b.clone()], None).await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        read_caption(&a).await.unwrap().as_deref(),
        Some("a small black square on white")
    );
    assert_eq!(
        std::fs::read_to_string(sidecar_path(&b)).unwrap(),
        "another small black square"
    );
}

#[tokio::test]
async fn test_failure_does_not_stop_batch() {
    let dir = TempDir::new().unwrap();
    let first = write_image(dir.path(), "1.png");
    let broken = dir.path().join("2.png");
    std::fs::write(&broken, b"not an image").unwrap();
    let third = write_image(dir.path(), "3.png");
    let fourth = write_image(dir.path(), "4.png");

    // broken image never reaches the backend; the third item hits a 500
    let backend = Scripted::new(vec![
        Ok("the first caption is fine"),
        Err(500),
        Ok("the fourth caption is fine"),
    ]);
    let captioner = BatchCaptioner::new(backend, CaptionPolicy::new(10, 200, 2));
    let summary = captioner
        .caption_images(&[first.clone(), broken.clone(), third.clone(), fourth.clone()], None)
        .await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert!(read_caption(&first).await.unwrap().is_some());
    assert!(read_caption(&broken).await.unwrap().is_none());
    assert!(read_caption(&third).await.unwrap().is_none());
    assert_eq!(
        read_caption(&fourth).await.unwrap().as_deref(),
        Some("the fourth caption is fine")
    );
}

#[tokio::test]
async fn test_degraded_caption_is_written_and_counted() {
    let dir = TempDir::new().unwrap();
    let img = write_image(dir.path(), "tiny.png");

    let backend = Scripted::new(vec![Ok("meh")]);
    let policy = CaptionPolicy::new(10, 200, 1);
    let placeholder = policy.short_fallback_text.clone();
    let captioner = BatchCaptioner::new(backend, policy);
    let summary = captioner.caption_images(&[img.clone()], None).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.degraded, 1);
    assert_eq!(read_caption(&img).await.unwrap(), Some(placeholder));
}

#[tokio::test]
async fn test_skip_existing_keeps_old_caption() {
    let dir = TempDir::new().unwrap();
    let done = write_image(dir.path(), "done.png");
    let todo = write_image(dir.path(), "todo.png");
    write_caption(&done, "hand written caption").await.unwrap();

    let backend = Scripted::new(vec![Ok("a freshly generated caption")]);
    let captioner = BatchCaptioner::new(backend.clone(), CaptionPolicy::new(10, 200, 1))
        .with_skip_existing(true);
    let summary = captioner.caption_images(&[done.clone(), todo.clone()], None).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        read_caption(&done).await.unwrap().as_deref(),
        Some("hand written caption")
    );
}

#[tokio::test]
async fn test_events_reported_in_order() {
    let dir = TempDir::new().unwrap();
    let ok = write_image(dir.path(), "ok.png");
    let missing = dir.path().join("missing.png");

    let backend = Scripted::new(vec![Ok("a caption that passes")]);
    let captioner = BatchCaptioner::new(backend, CaptionPolicy::new(10, 200, 1));
    let (tx, mut rx) = mpsc::channel(16);
    let summary = captioner.caption_images(&[ok, missing], Some(tx)).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], BatchEvent::Started { total: 2 }));
    assert!(matches!(
        events[1],
        BatchEvent::Captioned {
            index: 0,
            outcome: CaptionOutcome::Accepted,
            attempts: 1,
            ..
        }
    ));
    assert!(matches!(events[2], BatchEvent::Failed { index: 1, .. }));
    match &events[3] {
        BatchEvent::Finished(final_summary) => assert_eq!(*final_summary, summary),
        other => panic!("expected finished event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_caption_paths_expands_directories() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "x.png");
    write_image(dir.path(), "y.jpg");
    std::fs::write(dir.path().join("readme.md"), "ignored").unwrap();

    let backend = Scripted::new(vec![Ok("caption for x image"), Ok("caption for y image")]);
    let captioner = BatchCaptioner::new(backend, CaptionPolicy::new(10, 200, 1));
    let summary = captioner
        .caption_paths(&[dir.path().to_path_buf()], None)
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);
    assert!(dir.path().join("x.txt").exists());
    assert!(dir.path().join("y.txt").exists());
    assert!(!dir.path().join("readme.txt").exists());
}

#[tokio::test]
async fn test_video_without_ffprobe_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let video = dir.path().join("clip.mp4");
    std::fs::write(&video, b"not really a video").unwrap();

    let backend = Scripted::new(vec![]);
    let captioner = BatchCaptioner::new(backend, CaptionPolicy::default())
        .with_tools(VideoTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"));

    let result = captioner.caption_video(&video, &VideoJob::default(), None).await;
    assert!(matches!(result, Err(VideoError::Io(_))));

    let summary = captioner.caption_paths(&[video], None).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.failed, 1);
}
