// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Video captioning end to end with stand-in ffprobe/ffmpeg scripts

use async_trait::async_trait;
use dataset_tagger::batch::{BatchCaptioner, VideoJob};
use dataset_tagger::caption::{BackendError, CaptionBackend, CaptionPolicy, GenerationParams};
use dataset_tagger::sidecar::read_caption;
use dataset_tagger::video::{SegmentOptions, VideoTools};
use dataset_tagger::vision::Frame;
use image::DynamicImage;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records how many frames each request carried and answers with a numbered caption
#[derive(Default)]
struct FrameCounter {
    frames_seen: Mutex<Vec<usize>>,
}

#[async_trait]
impl CaptionBackend for FrameCounter {
    async fn complete(
        &self,
        _prompt: &str,
        frames: &[Frame],
        _params: &GenerationParams,
    ) -> Result<String, BackendError> {
        let mut seen = self.frames_seen.lock().unwrap();
        seen.push(frames.len());
        Ok(format!("a clip of a red barn, request {}", seen.len()))
    }

    fn name(&self) -> &'static str {
        "frame-counter"
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// ffprobe reporting 15 s at 10 fps; ffmpeg serving one PNG per frame
/// request, failing the seek to `fail_seek`, and touching its output on cuts
fn fake_tools(dir: &Path, fail_seek: &str) -> VideoTools {
    let png = dir.join("frame.png");
    DynamicImage::new_rgb8(8, 8).save(&png).unwrap();

    let ffprobe = write_script(
        dir,
        "ffprobe",
        r#"cat <<'JSON'
{"streams": [{"r_frame_rate": "10/1", "avg_frame_rate": "10/1", "nb_frames": "150"}],
 "format": {"duration": "15.000000"}}
JSON
"#,
    );
    let ffmpeg = write_script(
        dir,
        "ffmpeg",
        &format!(
            r#"case "$*" in
  *"-ss {fail} "*) echo "seek failed" >&2; exit 1 ;;
  *image2pipe*) cat "{png}" ;;
  *) for last; do :; done; : > "$last" ;;
esac
"#,
            fail = fail_seek,
            png = png.display()
        ),
    );
    VideoTools::new(ffmpeg, ffprobe)
}

#[tokio::test]
async fn test_video_segments_get_numbered_sidecars() {
    let dir = TempDir::new().unwrap();
    let video = dir.path().join("clip.mp4");
    std::fs::write(&video, b"stand-in video").unwrap();
    let out = dir.path().join("out");

    // second segment samples frame 66, shown at 6.600 s
    let backend = Arc::new(FrameCounter::default());
    let captioner = BatchCaptioner::new(backend.clone(), CaptionPolicy::new(10, 200, 1))
        .with_tools(fake_tools(dir.path(), "6.600"));
    let job = VideoJob {
        segments: SegmentOptions::default(),
        out_dir: Some(out.clone()),
        export_segments: true,
    };

    let summary = captioner.caption_video(&video, &job, None).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    assert_eq!(
        read_caption(&out.join("clip_000.mp4")).await.unwrap().as_deref(),
        Some("a clip of a red barn, request 1")
    );
    assert!(read_caption(&out.join("clip_001.mp4")).await.unwrap().is_none());
    assert_eq!(
        read_caption(&out.join("clip_002.mp4")).await.unwrap().as_deref(),
        Some("a clip of a red barn, request 2")
    );

    assert!(out.join("clip_000.mp4").exists());
    assert!(!out.join("clip_001.mp4").exists());
    assert!(out.join("clip_002.mp4").exists());
    assert_eq!(*backend.frames_seen.lock().unwrap(), vec![4, 4]);
}

#[tokio::test]
async fn test_one_frame_segments_are_padded() {
    let dir = TempDir::new().unwrap();
    let video = dir.path().join("walk.mov");
    std::fs::write(&video, b"stand-in video").unwrap();

    let backend = Arc::new(FrameCounter::default());
    let captioner = BatchCaptioner::new(backend.clone(), CaptionPolicy::new(10, 200, 1))
        .with_tools(fake_tools(dir.path(), "none"));
    let job = VideoJob {
        segments: SegmentOptions {
            frames_per_segment: 1,
            ..SegmentOptions::default()
        },
        out_dir: None,
        export_segments: false,
    };

    let summary = captioner.caption_video(&video, &job, None).await.unwrap();
    assert_eq!(summary.succeeded, 3);
    assert!(dir.path().join("walk_000.txt").exists());
    assert!(dir.path().join("walk_002.txt").exists());
    assert!(!dir.path().join("walk_000.mov").exists());
    assert_eq!(*backend.frames_seen.lock().unwrap(), vec![2, 2, 2]);
}
