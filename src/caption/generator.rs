// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded-retry caption generation with deterministic fallbacks

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::CaptionBackend;
use super::errors::{BackendError, CaptionError};
use super::policy::{AttemptVerdict, CaptionPolicy};
use super::request::{CaptionRequest, GenerationParams};
use super::result::{Attempt, CaptionOutcome, CaptionResult};
use crate::vision::frame::{pad_frames, Frame};

/// Fewest image parts ever put on the wire
pub const MIN_TRANSPORT_FRAMES: usize = 2;

/// Produce a caption for `request` under `policy`, calling `backend` at most
/// `policy.max_attempts` times.
///
/// Attempts run strictly one after another with the same parameters, unless
/// `policy.escalate_on_retry` is set. Any rejected response is retried until
/// the last attempt, which is resolved instead of rejected:
/// - too long: cut to `max_length` plus a truncation marker
/// - too short: `short_fallback_text`
/// - banned word: banned words stripped, or `filtered_fallback_text` if
///   nothing is left
///
/// Length wins over banned words on the last attempt. Backend failures are
/// not retried.
pub async fn generate(
    request: &CaptionRequest,
    policy: &CaptionPolicy,
    backend: &dyn CaptionBackend,
) -> Result<CaptionResult, CaptionError> {
    run(request, policy, backend, None).await
}

/// Owns the backend and policy so callers only pass requests
#[derive(Clone)]
pub struct CaptionGenerator {
    backend: Arc<dyn CaptionBackend>,
    policy: CaptionPolicy,
    attempt_timeout: Option<Duration>,
}

impl CaptionGenerator {
    pub fn new(backend: Arc<dyn CaptionBackend>, policy: CaptionPolicy) -> Self {
        Self {
            backend,
            policy,
            attempt_timeout: None,
        }
    }

    /// Abort any single backend call that runs longer than `timeout`
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &CaptionPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn generate(&self, request: &CaptionRequest) -> Result<CaptionResult, CaptionError> {
        run(
            request,
            &self.policy,
            self.backend.as_ref(),
            self.attempt_timeout,
        )
        .await
    }
}

async fn run(
    request: &CaptionRequest,
    policy: &CaptionPolicy,
    backend: &dyn CaptionBackend,
    attempt_timeout: Option<Duration>,
) -> Result<CaptionResult, CaptionError> {
    policy.validate()?;
    if request.frames.is_empty() {
        return Err(CaptionError::NoFrames);
    }

    let frames = pad_frames(
        &request.frames,
        MIN_TRANSPORT_FRAMES.max(backend.min_frames()),
    );
    let prompt = request.effective_prompt();
    let max_attempts = policy.max_attempts;

    let mut number = 0;
    loop {
        number += 1;
        let params = request
            .params
            .for_attempt(number, policy.escalate_on_retry);
        let raw = call_backend(backend, prompt, &frames, &params, attempt_timeout).await?;

        let attempt = Attempt {
            number,
            verdict: policy.check(&raw),
            raw,
        };
        debug!(
            "{} attempt {}/{}: {:?}",
            backend.name(),
            attempt.number,
            max_attempts,
            attempt.verdict
        );

        if attempt.verdict.is_pass() {
            return Ok(CaptionResult::new(
                attempt.raw,
                CaptionOutcome::Accepted,
                number,
            ));
        }
        if number < max_attempts {
            continue;
        }

        let result = resolve_final(&attempt, policy);
        warn!(
            "caption degraded after {} attempts: {}",
            number,
            result.outcome.as_str()
        );
        return Ok(result);
    }
}

async fn call_backend(
    backend: &dyn CaptionBackend,
    prompt: &str,
    frames: &[Frame],
    params: &GenerationParams,
    attempt_timeout: Option<Duration>,
) -> Result<String, BackendError> {
    match attempt_timeout {
        Some(limit) => tokio::time::timeout(limit, backend.complete(prompt, frames, params))
            .await
            .map_err(|_| BackendError::Timeout(limit))?,
        None => backend.complete(prompt, frames, params).await,
    }
}

/// Turn the rejected last attempt into a degraded result
fn resolve_final(attempt: &Attempt, policy: &CaptionPolicy) -> CaptionResult {
    match &attempt.verdict {
        AttemptVerdict::TooLong { .. } => CaptionResult::new(
            policy.truncate(&attempt.raw),
            CaptionOutcome::Truncated,
            attempt.number,
        ),
        AttemptVerdict::TooShort { .. } => CaptionResult::new(
            policy.short_fallback_text.clone(),
            CaptionOutcome::ShortFallback,
            attempt.number,
        ),
        AttemptVerdict::ContainsBanned(words) => {
            let stripped = policy.strip_banned(&attempt.raw);
            if stripped == attempt.raw {
                warn!(
                    "banned words {:?} are embedded in longer words and were kept",
                    words
                );
                return CaptionResult::new(
                    attempt.raw.trim(),
                    CaptionOutcome::BannedKept,
                    attempt.number,
                );
            }
            let stripped = stripped.trim();
            if stripped.is_empty() {
                CaptionResult::new(
                    policy.filtered_fallback_text.clone(),
                    CaptionOutcome::FilteredFallback,
                    attempt.number,
                )
            } else {
                CaptionResult::new(stripped, CaptionOutcome::Filtered, attempt.number)
            }
        }
        AttemptVerdict::Pass => CaptionResult::new(
            attempt.raw.clone(),
            CaptionOutcome::Accepted,
            attempt.number,
        ),
    }
}
