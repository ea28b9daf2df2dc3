// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for caption generation
//!
//! Policy rejections are never errors: they are retried and, once the attempt
//! budget is spent, resolved into a degraded `CaptionResult`. Only transport
//! failures and invalid input surface here.

use std::time::Duration;
use thiserror::Error;

use crate::vision::ImageError;

/// Errors raised by a caption backend while producing raw text
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, body decode failure, ...
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response carried no choices or no message content
    #[error("Backend returned an empty response")]
    EmptyResponse,

    /// A frame could not be encoded for transport
    #[error("Failed to encode frame: {0}")]
    Image(#[from] ImageError),

    /// The attempt did not finish in time
    #[error("Backend attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned by `CaptionGenerator::generate`
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("Caption request has no frames")]
    NoFrames,

    #[error("Invalid caption policy: {0}")]
    InvalidPolicy(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
