// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tagger configuration loaded from a TOML file with environment overrides
//!
//! ```toml
//! [caption]
//! backend = "vllm"
//! min_length = 50
//! max_length = 800
//!
//! [vllm]
//! base_url = "http://gpu-box:8000/v1"
//! model = "Qwen/Qwen2.5-VL-7B-Instruct"
//!
//! [prompts]
//! default = "Describe the image for a training caption."
//!
//! [filter]
//! words = "watermark, signature, logo"
//! ```

pub mod endpoint;

pub use endpoint::{BackendKind, EndpointConfig};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::caption::{CaptionPolicy, GenerationParams};
use crate::caption::policy::{
    DEFAULT_FILTERED_FALLBACK, DEFAULT_SHORT_FALLBACK, DEFAULT_TRUNCATION_MARKER,
};
use crate::video::SegmentOptions;
use endpoint::EndpointSection;

/// Default configuration file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tagger.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Banned words written either as `"a, b, c"` or `["a", "b", "c"]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WordList {
    Csv(String),
    List(Vec<String>),
}

impl Default for WordList {
    fn default() -> Self {
        WordList::List(Vec::new())
    }
}

impl WordList {
    fn into_words(self) -> Vec<String> {
        let words = match self {
            WordList::Csv(s) => s.split(',').map(str::to_string).collect::<Vec<_>>(),
            WordList::List(v) => v,
        };
        words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct CaptionSection {
    backend: BackendKind,
    min_length: usize,
    max_length: usize,
    max_attempts: u32,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    escalate_on_retry: bool,
    short_fallback_text: String,
    filtered_fallback_text: String,
    truncation_marker: String,
    mid_word_marker: Option<String>,
    attempt_timeout_secs: Option<u64>,
}

impl Default for CaptionSection {
    fn default() -> Self {
        let policy = CaptionPolicy::default();
        let params = GenerationParams::default();
        Self {
            backend: BackendKind::default(),
            min_length: policy.min_length,
            max_length: policy.max_length,
            max_attempts: policy.max_attempts,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            escalate_on_retry: false,
            short_fallback_text: DEFAULT_SHORT_FALLBACK.to_string(),
            filtered_fallback_text: DEFAULT_FILTERED_FALLBACK.to_string(),
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
            mid_word_marker: None,
            attempt_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PromptsSection {
    default: String,
    video: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FilterSection {
    words: WordList,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct VideoSection {
    segment_secs: f64,
    frames_per_segment: usize,
    min_segment_secs: f64,
}

impl Default for VideoSection {
    fn default() -> Self {
        let options = SegmentOptions::default();
        Self {
            segment_secs: options.segment_secs,
            frames_per_segment: options.frames_per_segment,
            min_segment_secs: options.min_segment_secs,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(alias = "CAPTION")]
    caption: CaptionSection,
    #[serde(alias = "OLLAMA")]
    ollama: EndpointSection,
    #[serde(alias = "VLLM")]
    vllm: EndpointSection,
    #[serde(alias = "PROMPTS")]
    prompts: PromptsSection,
    #[serde(alias = "FILTER", alias = "FILTER_WORDS", alias = "filter_words")]
    filter: FilterSection,
    #[serde(alias = "VIDEO")]
    video: VideoSection,
    /// Tables this crate does not read
    #[serde(flatten)]
    unknown: BTreeMap<String, toml::Value>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TaggerConfig {
    pub backend: BackendKind,
    pub ollama: EndpointConfig,
    pub vllm: EndpointConfig,
    pub default_prompt: String,
    pub video_prompt: Option<String>,
    pub banned_words: Vec<String>,
    pub min_length: usize,
    pub max_length: usize,
    pub max_attempts: u32,
    pub generation: GenerationParams,
    pub escalate_on_retry: bool,
    pub short_fallback_text: String,
    pub filtered_fallback_text: String,
    pub truncation_marker: String,
    pub mid_word_marker: Option<String>,
    pub attempt_timeout_secs: Option<u64>,
    pub segments: SegmentOptions,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

impl TaggerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        for name in raw.unknown.keys() {
            warn!("ignoring unknown config section [{}]", name);
        }
        Ok(Self::from_raw(raw))
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Load from file, apply `TAGGER_*` environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment):
    /// `TAGGER_BACKEND`, then `TAGGER_BASE_URL`, `TAGGER_API_KEY` and
    /// `TAGGER_MODEL` on the active endpoint.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("TAGGER_BACKEND") {
            self.backend = backend.parse().map_err(ConfigError::Invalid)?;
        }

        let endpoint = self.active_endpoint_mut();
        if let Some(url) = lookup("TAGGER_BASE_URL") {
            endpoint.base_url = url;
        }
        if let Some(key) = lookup("TAGGER_API_KEY") {
            endpoint.api_key = if key.trim().is_empty() { None } else { Some(key) };
        }
        if let Some(model) = lookup("TAGGER_MODEL") {
            endpoint.model = model;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for endpoint in [&self.ollama, &self.vllm] {
            url::Url::parse(&endpoint.base_url).map_err(|e| {
                ConfigError::Invalid(format!(
                    "{} base_url '{}' is not a valid URL: {}",
                    endpoint.kind, endpoint.base_url, e
                ))
            })?;
        }

        let endpoint = self.active_endpoint();
        if endpoint.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{} model must not be empty",
                endpoint.kind
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be between 0 and 2, got {}",
                self.generation.temperature
            )));
        }
        if self.generation.top_p <= 0.0 || self.generation.top_p > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "top_p must be in (0, 1], got {}",
                self.generation.top_p
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be greater than 0".to_string()));
        }
        self.segments.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn active_endpoint(&self) -> &EndpointConfig {
        match self.backend {
            BackendKind::Ollama => &self.ollama,
            BackendKind::Vllm => &self.vllm,
        }
    }

    fn active_endpoint_mut(&mut self) -> &mut EndpointConfig {
        match self.backend {
            BackendKind::Ollama => &mut self.ollama,
            BackendKind::Vllm => &mut self.vllm,
        }
    }

    /// Acceptance policy built from the `[caption]` and `[filter]` sections
    pub fn policy(&self) -> CaptionPolicy {
        let mut policy = CaptionPolicy::new(self.min_length, self.max_length, self.max_attempts)
            .with_banned_words(&self.banned_words);
        policy.short_fallback_text = self.short_fallback_text.clone();
        policy.filtered_fallback_text = self.filtered_fallback_text.clone();
        policy.truncation_marker = self.truncation_marker.clone();
        policy.mid_word_marker = self.mid_word_marker.clone();
        policy.escalate_on_retry = self.escalate_on_retry;
        policy
    }

    /// Sampling parameters for the first attempt
    pub fn generation_params(&self) -> GenerationParams {
        self.generation
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }

    /// Prompt for video segments; falls back to the default prompt
    pub fn video_prompt(&self) -> &str {
        self.video_prompt.as_deref().unwrap_or(&self.default_prompt)
    }

    fn from_raw(raw: RawConfig) -> Self {
        let caption = raw.caption;
        Self {
            backend: caption.backend,
            ollama: raw.ollama.resolve(BackendKind::Ollama),
            vllm: raw.vllm.resolve(BackendKind::Vllm),
            default_prompt: raw.prompts.default,
            video_prompt: raw.prompts.video.filter(|p| !p.trim().is_empty()),
            banned_words: raw.filter.words.into_words(),
            min_length: caption.min_length,
            max_length: caption.max_length,
            max_attempts: caption.max_attempts,
            generation: GenerationParams {
                max_tokens: caption.max_tokens,
                temperature: caption.temperature,
                top_p: caption.top_p,
            },
            escalate_on_retry: caption.escalate_on_retry,
            short_fallback_text: caption.short_fallback_text,
            filtered_fallback_text: caption.filtered_fallback_text,
            truncation_marker: caption.truncation_marker,
            mid_word_marker: caption.mid_word_marker.filter(|m| !m.is_empty()),
            attempt_timeout_secs: caption.attempt_timeout_secs,
            segments: SegmentOptions {
                segment_secs: raw.video.segment_secs,
                frames_per_segment: raw.video.frames_per_segment,
                min_segment_secs: raw.video.min_segment_secs,
            },
        }
    }
}
