//! SIMD-accelerated grayscale downscaling via fast_image_resize.

use crate::error::DecodeError;
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{GrayImage, ImageBuffer, Luma};
use std::path::PathBuf;

fn resize_failed(reason: String) -> DecodeError {
    DecodeError::Unreadable {
        path: PathBuf::new(),
        reason,
    }
}

/// Resize a grayscale image to exactly `width` x `height`.
pub fn resize_gray(gray: &GrayImage, width: u32, height: u32) -> Result<GrayImage, DecodeError> {
    let (src_width, src_height) = gray.dimensions();

    if src_width == 0 || src_height == 0 {
        return Err(resize_failed("invalid source dimensions".to_string()));
    }
    if width == 0 || height == 0 {
        return Err(resize_failed("invalid destination dimensions".to_string()));
    }

    let src_image = Image::from_vec_u8(src_width, src_height, gray.as_raw().clone(), PixelType::U8)
        .map_err(|e| resize_failed(format!("failed to create source image: {}", e)))?;
    let mut dst_image = Image::new(width, height, PixelType::U8);

    // Bilinear keeps corners crisp enough for FAST after a 2-4x reduction
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

    Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| resize_failed(format!("resize failed: {}", e)))?;

    let result: ImageBuffer<Luma<u8>, Vec<u8>> =
        ImageBuffer::from_raw(width, height, dst_image.into_vec())
            .ok_or_else(|| resize_failed("failed to create result buffer".to_string()))?;

    Ok(result)
}

/// Shrink so the longest side is at most `max_side`, keeping the aspect
/// ratio. Images already small enough are returned unchanged.
pub fn fit_within(gray: GrayImage, max_side: u32) -> Result<GrayImage, DecodeError> {
    let (width, height) = gray.dimensions();
    let longest = width.max(height);

    if longest <= max_side {
        return Ok(gray);
    }

    let scale = max_side as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);

    resize_gray(&gray, new_width, new_height)
}
