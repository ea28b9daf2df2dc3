// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Backend endpoint configuration for Ollama and vLLM

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::vision::image_utils::DEFAULT_MAX_SIDE;

/// Which OpenAI-compatible server the captions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    Vllm,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Vllm => "vllm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "vllm" => Ok(BackendKind::Vllm),
            other => Err(format!("unknown backend '{}'; expected ollama or vllm", other)),
        }
    }
}

/// Connection settings for one backend
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub kind: BackendKind,
    /// Base URL up to and including `/v1`
    pub base_url: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Longest side of a frame after resizing for transport
    pub max_image_side: u32,
    /// Fewest image parts per request
    pub min_frames: usize,
}

impl EndpointConfig {
    pub fn defaults_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Ollama => Self {
                kind,
                base_url: "http://localhost:11434/v1".to_string(),
                api_key: Some("ollama".to_string()),
                model: "qwen2.5vl:7b".to_string(),
                timeout_secs: 3600,
                max_image_side: DEFAULT_MAX_SIDE,
                min_frames: 2,
            },
            BackendKind::Vllm => Self {
                kind,
                base_url: "http://localhost:8000/v1".to_string(),
                api_key: None,
                model: "Qwen/Qwen2.5-VL-7B-Instruct".to_string(),
                timeout_secs: 3600,
                max_image_side: DEFAULT_MAX_SIDE,
                min_frames: 2,
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[ollama]` / `[vllm]` table as written in the file; unset keys fall back
/// to the defaults of that backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EndpointSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_image_side: Option<u32>,
    pub min_frames: Option<usize>,
}

impl EndpointSection {
    pub fn resolve(self, kind: BackendKind) -> EndpointConfig {
        let defaults = EndpointConfig::defaults_for(kind);
        EndpointConfig {
            kind,
            base_url: self.base_url.unwrap_or(defaults.base_url),
            // an explicitly empty key disables the Authorization header
            api_key: match self.api_key {
                Some(key) if key.trim().is_empty() => None,
                Some(key) => Some(key),
                None => defaults.api_key,
            },
            model: self.model.unwrap_or(defaults.model),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            max_image_side: self.max_image_side.unwrap_or(defaults.max_image_side),
            min_frames: self.min_frames.unwrap_or(defaults.min_frames),
        }
    }
}
