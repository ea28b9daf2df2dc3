// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption generation with acceptance policy and bounded retry
//!
//! A backend is asked for a caption; the response is checked against the
//! length bounds and banned word list of a `CaptionPolicy`, retried on
//! rejection, and resolved to a degraded but always writable result once
//! the attempt budget is spent.

pub mod backend;
pub mod errors;
pub mod generator;
pub mod policy;
pub mod request;
pub mod result;

pub use backend::CaptionBackend;
pub use errors::{BackendError, CaptionError};
pub use generator::{generate, CaptionGenerator, MIN_TRANSPORT_FRAMES};
pub use policy::{AttemptVerdict, CaptionPolicy};
pub use request::{CaptionRequest, GenerationParams, DEFAULT_PROMPT};
pub use result::{Attempt, CaptionOutcome, CaptionResult};
