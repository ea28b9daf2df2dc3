// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Frame loading from disk and transport encoding

use base64::{engine::general_purpose::STANDARD, Engine as _};
use dataset_tagger::vision::{decode_image_bytes, png_data_url, Frame, ImageError};
use image::{DynamicImage, ImageFormat};
use tempfile::TempDir;

#[test]
fn test_open_frame_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("still.jpg");
    DynamicImage::new_rgb8(40, 30).save(&path).unwrap();

    let frame = Frame::open(&path).unwrap();
    assert_eq!((frame.width(), frame.height()), (40, 30));
}

#[test]
fn test_open_missing_file_is_io_error() {
    let result = Frame::open("/nonexistent/still.png");
    assert!(matches!(result, Err(ImageError::Io(_))));
}

#[test]
fn test_open_non_image_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.png");
    std::fs::write(&path, b"definitely not a png").unwrap();
    assert!(Frame::open(&path).is_err());
}

#[test]
fn test_data_url_is_downscaled_png() {
    let img = DynamicImage::new_rgb8(3000, 1500);
    let url = png_data_url(&img, 1024).unwrap();
    let payload = url.strip_prefix("data:image/png;base64,").unwrap();

    let (decoded, info) = decode_image_bytes(&STANDARD.decode(payload).unwrap()).unwrap();
    assert_eq!(info.format, ImageFormat::Png);
    assert_eq!((decoded.width(), decoded.height()), (1024, 512));
}
