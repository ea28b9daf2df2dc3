// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption sidecar files: `photo.png` is captioned by `photo.txt`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar location for `media`: same directory and stem, `.txt` extension
pub fn sidecar_path(media: &Path) -> PathBuf {
    media.with_extension("txt")
}

/// Write `text` verbatim next to `media`, replacing any earlier caption
pub async fn write_caption(media: &Path, text: &str) -> std::io::Result<PathBuf> {
    let path = sidecar_path(media);
    tokio::fs::write(&path, text.as_bytes()).await?;
    debug!("wrote caption {} ({} chars)", path.display(), text.chars().count());
    Ok(path)
}

/// Caption previously written for `media`, if any
pub async fn read_caption(media: &Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read_to_string(sidecar_path(media)).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn has_caption(media: &Path) -> bool {
    tokio::fs::try_exists(sidecar_path(media))
        .await
        .unwrap_or(false)
}
