// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption outcomes and per-attempt records

use serde::Serialize;

use super::policy::AttemptVerdict;

/// How the final caption text was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionOutcome {
    /// A response passed every check
    Accepted,
    /// Final response was too long and got cut
    Truncated,
    /// Final response was too short; placeholder used
    ShortFallback,
    /// Final response had banned words removed
    Filtered,
    /// Removing banned words left nothing; placeholder used
    FilteredFallback,
    /// Final response had banned words only inside longer words; kept as is
    BannedKept,
}

impl CaptionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionOutcome::Accepted => "accepted",
            CaptionOutcome::Truncated => "truncated",
            CaptionOutcome::ShortFallback => "short_fallback",
            CaptionOutcome::Filtered => "filtered",
            CaptionOutcome::FilteredFallback => "filtered_fallback",
            CaptionOutcome::BannedKept => "banned_kept",
        }
    }
}

/// Text to persist for one media item, plus how it came to be
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionResult {
    pub text: String,
    pub outcome: CaptionOutcome,
    /// Backend calls spent
    pub attempts: u32,
}

impl CaptionResult {
    pub fn new(text: impl Into<String>, outcome: CaptionOutcome, attempts: u32) -> Self {
        Self {
            text: text.into(),
            outcome,
            attempts,
        }
    }

    /// Anything other than an accepted response
    pub fn is_degraded(&self) -> bool {
        self.outcome != CaptionOutcome::Accepted
    }
}

/// One backend call inside a `generate` run
#[derive(Debug, Clone)]
pub struct Attempt {
    pub number: u32,
    pub raw: String,
    pub verdict: AttemptVerdict,
}
