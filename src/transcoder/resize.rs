// src/transcoder/resize.rs
//
// Output dimension math and the high-quality resample path
// (fast_image_resize Lanczos3, with an image-crate fallback).

use crate::error::{ImagePipelineError, Result};
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use tracing::debug;

/// Compute bounded output dimensions: aspect-ratio preserving, never
/// upscaling. Scaling factor = min(max_w/w, max_h/h, 1); each scaled
/// dimension is rounded to the nearest integer pixel (and clamped to 1 so a
/// degenerate aspect ratio cannot round to zero).
pub fn calc_output_dimensions(orig_w: u32, orig_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let width_ratio = max_w as f64 / orig_w as f64;
    let height_ratio = max_h as f64 / orig_h as f64;
    let factor = width_ratio.min(height_ratio).min(1.0);

    let width = ((orig_w as f64 * factor).round() as u32).max(1);
    let height = ((orig_h as f64 * factor).round() as u32).max(1);
    (width, height)
}

/// Resize with owned pixels (zero-copy for RGB8/RGBA8 sources).
/// Uses SIMD Lanczos3 resampling; falls back to the image crate when the
/// SIMD path rejects the buffer.
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> Result<DynamicImage> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ImagePipelineError::resize_failed(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // Select pixel layout without forcing RGBA when not needed.
    let (pixel_type, mut src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    match resize_with_fir(
        src_width,
        src_height,
        &mut src_pixels,
        pixel_type,
        dst_width,
        dst_height,
    ) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            debug!(error = %err, "SIMD resize failed; falling back to image crate");
            resize_with_image_crate_fallback(
                &src_pixels,
                src_width,
                src_height,
                pixel_type,
                dst_width,
                dst_height,
            )
            .map_err(|fallback_err| {
                ImagePipelineError::resize_failed(
                    (src_width, src_height),
                    (dst_width, dst_height),
                    format!("{err}; image crate fallback failed: {fallback_err}"),
                )
            })
        }
    }
}

fn resize_with_fir(
    src_width: u32,
    src_height: u32,
    src_pixels: &mut [u8],
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;
    if src_pixels.len() < required_bytes {
        return Err(format!(
            "source buffer too small: expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let mut src_image =
        fir::images::Image::from_slice_u8(src_width, src_height, src_pixels, pixel_type)
            .map_err(|e| format!("fir source image error: {e:?}"))?;
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    // Alpha must be premultiplied for correct convolution on RGBA sources.
    let needs_premultiply = pixel_type == PixelType::U8x4;
    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(
        fir::FilterType::Lanczos3,
    ));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to create rgb image from resized data".to_string()),
        PixelType::U8x4 => RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to create rgba image from resized data".to_string()),
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(image::imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(image::imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}
