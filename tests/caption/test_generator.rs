// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retry and fallback behaviour of caption generation against a mocked backend

use async_trait::async_trait;
use dataset_tagger::caption::{
    generate, BackendError, CaptionBackend, CaptionError, CaptionGenerator, CaptionOutcome,
    CaptionPolicy, CaptionRequest, GenerationParams,
};
use dataset_tagger::vision::Frame;
use image::DynamicImage;
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Backend {}

    #[async_trait]
    impl CaptionBackend for Backend {
        async fn complete(
            &self,
            prompt: &str,
            frames: &[Frame],
            params: &GenerationParams,
        ) -> Result<String, BackendError>;
        fn name(&self) -> &'static str;
    }
}

/// Backend that answers `reply` every time and expects exactly `calls` calls
fn backend_returning(reply: &str, calls: usize) -> MockBackend {
    let reply = reply.to_string();
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");
    backend
        .expect_complete()
        .times(calls)
        .returning(move |_, _, _| Ok(reply.clone()));
    backend
}

fn single_frame_request() -> CaptionRequest {
    CaptionRequest::new(vec![Frame::new(DynamicImage::new_rgb8(8, 8))], "Describe the image.")
}

#[tokio::test]
async fn test_scenario_a_valid_caption_accepted_first_try() {
    let text = "a valid forty-character caption string here";
    let backend = backend_returning(text, 1);
    let policy = CaptionPolicy::new(10, 1000, 3);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, text);
    assert_eq!(result.outcome, CaptionOutcome::Accepted);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn test_scenario_b_too_long_truncated_after_all_attempts() {
    let long = "abcdefghij".repeat(5);
    let backend = backend_returning(&long, 2);
    let policy = CaptionPolicy::new(10, 20, 2);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, format!("{}{}", &long[..20], policy.truncation_marker));
    assert_eq!(
        result.text.chars().count(),
        20 + policy.truncation_marker.chars().count()
    );
    assert_eq!(result.outcome, CaptionOutcome::Truncated);
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn test_scenario_c_banned_word_removed_after_all_attempts() {
    let backend = backend_returning("this text is forbidden content", 2);
    let policy = CaptionPolicy::new(10, 1000, 2).with_banned_words(["forbidden"]);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, "this text is  content");
    assert!(!result.text.to_lowercase().contains("forbidden"));
    assert_eq!(result.outcome, CaptionOutcome::Filtered);
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn test_scenario_d_too_short_uses_placeholder() {
    let backend = backend_returning("short", 1);
    let policy = CaptionPolicy::new(50, 1000, 1);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, policy.short_fallback_text);
    assert_eq!(result.outcome, CaptionOutcome::ShortFallback);
    assert!(result.is_degraded());
}

#[tokio::test]
async fn test_custom_short_placeholder() {
    let backend = backend_returning("no", 2);
    let mut policy = CaptionPolicy::new(10, 100, 2);
    policy.short_fallback_text = "needs manual caption".to_string();

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, "needs manual caption");
}

#[tokio::test]
async fn test_case_insensitive_banned_word_is_removed() {
    let backend = backend_returning("A WATERMARK in the corner of the frame", 1);
    let policy = CaptionPolicy::new(10, 1000, 1).with_banned_words(["watermark"]);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, "A  in the corner of the frame");
}

#[tokio::test]
async fn test_ascii_banned_word_removed_from_cjk_caption() {
    let backend = backend_returning("图片右下角有logo标志", 1);
    let policy = CaptionPolicy::new(1, 1000, 1).with_banned_words(["logo"]);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, "图片右下角有标志");
    assert_eq!(result.outcome, CaptionOutcome::Filtered);
}

#[tokio::test]
async fn test_trailing_newline_kept_on_accepted_caption() {
    let backend = backend_returning("a valid caption string\n", 1);
    let policy = CaptionPolicy::new(10, 1000, 3);

    let result = generate(&single_frame_request(), &policy, &backend).await.unwrap();
    assert_eq!(result.text, "a valid caption string\n");
    assert_eq!(result.outcome, CaptionOutcome::Accepted);
}

#[tokio::test]
async fn test_idempotent_for_fixed_backend() {
    let backend = backend_returning("a calm lake at sunrise with mist", 2);
    let policy = CaptionPolicy::new(10, 1000, 3);
    let request = single_frame_request();

    let first = generate(&request, &policy, &backend).await.unwrap();
    let second = generate(&request, &policy, &backend).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_single_frame_sent_as_two_image_parts() {
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");
    backend
        .expect_complete()
        .withf(|_, frames, _| frames.len() >= 2)
        .times(1)
        .returning(|_, _, _| Ok("two identical frames of a red barn".to_string()));

    let result = generate(&single_frame_request(), &CaptionPolicy::default(), &backend)
        .await
        .unwrap();
    assert_eq!(result.outcome, CaptionOutcome::Accepted);
}

#[tokio::test]
async fn test_many_frames_sent_unchanged() {
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");
    backend
        .expect_complete()
        .withf(|_, frames, _| frames.len() == 5)
        .times(1)
        .returning(|_, _, _| Ok("five frames of a dog running".to_string()));

    let frames = vec![Frame::new(DynamicImage::new_rgb8(4, 4)); 5];
    let request = CaptionRequest::new(frames, "");
    generate(&request, &CaptionPolicy::default(), &backend).await.unwrap();
}

#[tokio::test]
async fn test_blank_prompt_uses_default_prompt() {
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");
    backend
        .expect_complete()
        .withf(|prompt, _, _| prompt == dataset_tagger::caption::DEFAULT_PROMPT)
        .times(1)
        .returning(|_, _, _| Ok("a default prompt was used here".to_string()));

    let request = CaptionRequest::new(vec![Frame::new(DynamicImage::new_rgb8(4, 4))], "   ");
    generate(&request, &CaptionPolicy::default(), &backend).await.unwrap();
}

#[tokio::test]
async fn test_backend_error_is_not_retried() {
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");
    backend.expect_complete().times(1).returning(|_, _, _| {
        Err(BackendError::Status {
            status: 503,
            body: "model loading".to_string(),
        })
    });

    let result = generate(&single_frame_request(), &CaptionPolicy::new(10, 100, 3), &backend).await;
    assert!(matches!(
        result,
        Err(CaptionError::Backend(BackendError::Status { status: 503, .. }))
    ));
}

#[tokio::test]
async fn test_generator_owns_backend() {
    let backend = backend_returning("a shared backend behind an Arc", 1);
    let generator = CaptionGenerator::new(Arc::new(backend), CaptionPolicy::default());

    assert_eq!(generator.backend_name(), "mock");
    let result = generator.generate(&single_frame_request()).await.unwrap();
    assert_eq!(result.attempts, 1);
}
