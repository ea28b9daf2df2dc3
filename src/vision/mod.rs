// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Frames, image encoding and the HTTP vision backend
//!
//! Frames are decoded once and shared; the `VlmClient` resizes and encodes
//! them as PNG data URLs for each chat completion request.

pub mod frame;
pub mod image_utils;
pub mod vlm_client;

pub use frame::{pad_frames, Frame};
pub use image_utils::{
    decode_image_bytes, detect_format, is_image_path, png_data_url, resize_to_max_side, ImageError,
    ImageInfo, IMAGE_EXTENSIONS,
};
pub use vlm_client::VlmClient;
