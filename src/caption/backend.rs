// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption backend trait definition

use async_trait::async_trait;

use super::errors::BackendError;
use super::request::GenerationParams;
use crate::vision::Frame;

/// Anything that turns a prompt plus frames into raw caption text
///
/// The HTTP implementation is `vision::VlmClient`. Implementations must not
/// retry on their own; retry policy belongs to `CaptionGenerator`.
#[async_trait]
pub trait CaptionBackend: Send + Sync {
    /// Run one completion and return the raw model text
    ///
    /// # Arguments
    /// * `prompt` - Instruction text, already defaulted by the caller
    /// * `frames` - Images in order, already padded to `min_frames()`
    /// * `params` - Sampling parameters for this attempt
    async fn complete(
        &self,
        prompt: &str,
        frames: &[Frame],
        params: &GenerationParams,
    ) -> Result<String, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Fewest image parts the backend accepts in one request
    fn min_frames(&self) -> usize {
        2
    }
}
