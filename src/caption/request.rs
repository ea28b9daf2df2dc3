// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption request and sampling parameters

use serde::{Deserialize, Serialize};

use crate::vision::Frame;

/// Instruction used when the caller supplies an empty prompt
pub const DEFAULT_PROMPT: &str = "Describe the content of these images as a single training caption. \
     Mention the main subjects, their actions, the setting, lighting and camera framing. \
     Write plain prose without lists, headings or quotation marks.";

const ESCALATION_TEMPERATURE_STEP: f32 = 0.1;
const ESCALATION_TEMPERATURE_CAP: f32 = 1.0;
const ESCALATION_TOKEN_FACTOR: f64 = 0.8;
const ESCALATION_MIN_TOKENS: u32 = 64;

/// Sampling parameters forwarded to the backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl GenerationParams {
    /// Parameters for the given 1-based attempt.
    ///
    /// Without escalation every attempt reuses `self`. With escalation each
    /// retry raises the temperature by 0.1 (capped at 1.0) and shrinks
    /// `max_tokens` by 20% (floored at 64); `top_p` never changes.
    pub fn for_attempt(&self, attempt: u32, escalate: bool) -> Self {
        if !escalate || attempt <= 1 {
            return *self;
        }

        let retries = attempt - 1;
        let temperature = if self.temperature >= ESCALATION_TEMPERATURE_CAP {
            self.temperature
        } else {
            (self.temperature + ESCALATION_TEMPERATURE_STEP * retries as f32)
                .min(ESCALATION_TEMPERATURE_CAP)
        };
        let scaled = self.max_tokens as f64 * ESCALATION_TOKEN_FACTOR.powi(retries as i32);
        let max_tokens = (scaled.floor() as u32).max(ESCALATION_MIN_TOKENS.min(self.max_tokens));

        Self {
            max_tokens,
            temperature,
            top_p: self.top_p,
        }
    }
}

/// One caption request: frames, instruction and sampling parameters
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub frames: Vec<Frame>,
    pub prompt: String,
    pub params: GenerationParams,
}

impl CaptionRequest {
    pub fn new(frames: Vec<Frame>, prompt: impl Into<String>) -> Self {
        Self {
            frames,
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// The prompt actually sent; blank prompts fall back to `DEFAULT_PROMPT`
    pub fn effective_prompt(&self) -> &str {
        if self.prompt.trim().is_empty() {
            DEFAULT_PROMPT
        } else {
            &self.prompt
        }
    }
}
