// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod batch;
pub mod caption;
pub mod cli;
pub mod config;
pub mod sidecar;
pub mod version;
pub mod video;
pub mod vision;

// Re-export main types
pub use batch::{collect_media, BatchCaptioner, BatchEvent, BatchSummary, VideoJob};
pub use caption::{
    generate, AttemptVerdict, BackendError, CaptionBackend, CaptionError, CaptionGenerator,
    CaptionOutcome, CaptionPolicy, CaptionRequest, CaptionResult, GenerationParams,
};
pub use config::{BackendKind, ConfigError, EndpointConfig, TaggerConfig};
pub use video::{Segment, SegmentOptions, VideoError, VideoInfo, VideoTools};
pub use vision::{Frame, ImageError, VlmClient};
