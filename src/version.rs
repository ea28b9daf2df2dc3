// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the dataset tagger

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Supported caption backends
pub const BACKENDS: &[&str] = &["ollama", "vllm"];

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "bounded-retry",
    "length-policy",
    "banned-word-filter",
    "multi-frame-requests",
    "video-segments",
    "sidecar-captions",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("dataset-tagger {}", VERSION_NUMBER)
}

/// Get full version info, printed by `check`
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "backends": BACKENDS,
        "features": FEATURES,
    })
}
