// src/transcoder/decoder.rs
//
// Input validation and decode routing: JPEG via mozjpeg, PNG via zune-png,
// WebP via libwebp, GIF (and anything else the allow-list admits) via the
// image crate.

use crate::error::{ImagePipelineError, Result};
use crate::transcoder::common::run_shielded;
use crate::transcoder::{MAX_DIMENSION, MAX_PIXELS};
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Accepted input MIME types. Anything else is rejected before decode.
pub const SUPPORTED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

pub fn is_supported_content_type(content_type: &str) -> bool {
    let normalized = content_type.trim().to_ascii_lowercase();
    SUPPORTED_CONTENT_TYPES.contains(&normalized.as_str())
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
/// Significantly faster than the image crate's pure Rust decoder.
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DynamicImage> {
    run_shielded("decode:jpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ImagePipelineError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ImagePipelineError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ImagePipelineError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();
        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(ImagePipelineError::dimension_exceeds_limit(
                width.max(height) as u32,
                MAX_DIMENSION,
            ));
        }
        let width_u32 = width as u32;
        let height_u32 = height as u32;
        check_dimensions(width_u32, height_u32)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ImagePipelineError::decode_failed(format!(
                "mozjpeg: failed to read scanlines: {e:?}"
            ))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image =
            RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
                ImagePipelineError::decode_failed(
                    "mozjpeg: failed to create image from raw data",
                )
            })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode PNG using zune-png. 16-bit inputs are downsampled to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> Result<DynamicImage> {
    run_shielded("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);
        let pixels = decoder
            .decode()
            .map_err(|e| ImagePipelineError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .get_info()
            .ok_or_else(|| ImagePipelineError::decode_failed("png: missing header info"))?;

        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ImagePipelineError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| ImagePipelineError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| {
                    ImagePipelineError::decode_failed("png: failed to build RGB image")
                })?,
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| {
                        ImagePipelineError::decode_failed("png: failed to build RGBA image")
                    })?
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| {
                    ImagePipelineError::decode_failed("png: failed to build Luma image")
                })?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| {
                    ImagePipelineError::decode_failed("png: failed to build LumaA image")
                })?,
            other => {
                return Err(ImagePipelineError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(img)
    })
}

/// Decode WebP using libwebp. Falls back to the image crate for animated WebP.
pub fn decode_webp_libwebp(data: &[u8]) -> Result<DynamicImage> {
    run_shielded("decode:webp", || {
        // Parse the header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            ImagePipelineError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            // The simple libwebp decoder does not handle animation; first frame
            // via the image crate keeps these inputs working.
            return image::load_from_memory(data).map_err(|e| {
                ImagePipelineError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        let width = features.width();
        let height = features.height();
        check_dimensions(width, height)?;

        let decoder = WebPDecoder::new(data);
        let decoded = decoder
            .decode()
            .ok_or_else(|| ImagePipelineError::decode_failed("webp: decode failed"))?;

        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Decode GIF and other allow-listed formats via the image crate.
pub fn decode_with_image_crate(data: &[u8]) -> Result<DynamicImage> {
    run_shielded("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| ImagePipelineError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Detect input format from magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes)
/// - Route JPEG to mozjpeg, PNG to zune-png, WebP to libwebp, the rest to the
///   image crate
/// - Return the decoded image and detected format
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let detected = detect_format(bytes);
    let img = match detected {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes)?,
        Some(ImageFormat::Png) => decode_png_zune(bytes)?,
        Some(ImageFormat::WebP) => decode_webp_libwebp(bytes)?,
        _ => decode_with_image_crate(bytes)?,
    };
    Ok((img, detected))
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImagePipelineError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ImagePipelineError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> Result<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

/// Extract the EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif_reader = exif::Reader::new();
    let exif = exif_reader.read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    let orientation = value as u16;
    if (1..=8).contains(&orientation) {
        Some(orientation)
    } else {
        None
    }
}

/// Apply an EXIF orientation (1-8) so the pixels come out upright.
/// Invalid values are ignored silently.
pub fn auto_orient(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(), // transpose
        6 => img.rotate90(),
        7 => img.rotate270().fliph(), // transverse
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn encode_webp_sample(width: u32, height: u32) -> Vec<u8> {
        let rgb: Vec<u8> = std::iter::repeat([10u8, 20u8, 30u8])
            .take((width * height) as usize)
            .flatten()
            .collect();
        let encoder = webp::Encoder::from_rgb(&rgb, width, height);
        encoder.encode_lossless().to_vec()
    }

    fn encode_png_sample(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |_, _| Rgb([0, 0, 0]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn encode_jpeg_sample(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 8, 7])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn test_content_type_allow_list() {
        assert!(is_supported_content_type("image/jpeg"));
        assert!(is_supported_content_type("image/jpg"));
        assert!(is_supported_content_type("IMAGE/PNG"));
        assert!(is_supported_content_type(" image/webp "));
        assert!(is_supported_content_type("image/gif"));
        assert!(!is_supported_content_type("application/pdf"));
        assert!(!is_supported_content_type("image/svg+xml"));
        assert!(!is_supported_content_type(""));
    }

    #[test]
    fn test_check_dimensions_limits() {
        assert!(check_dimensions(1920, 1080).is_ok());
        assert!(check_dimensions(1, 1).is_ok());
        assert!(check_dimensions(10_000, 10_000).is_ok());

        let err = check_dimensions(MAX_DIMENSION + 1, 1).unwrap_err();
        assert!(matches!(
            err,
            ImagePipelineError::DimensionExceedsLimit { .. }
        ));

        // 10001 x 10000 = 100,010,000 > MAX_PIXELS
        let err = check_dimensions(10_001, 10_000).unwrap_err();
        assert!(matches!(
            err,
            ImagePipelineError::PixelCountExceedsLimit { .. }
        ));
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode_png_sample(64, 64);
        assert!(ensure_dimensions_safe(&data).is_ok());
    }

    #[test]
    fn test_detect_format_routes() {
        let png = encode_png_sample(2, 2);
        let jpeg = encode_jpeg_sample(2, 2);
        let webp = encode_webp_sample(2, 2);
        assert_eq!(detect_format(&png), Some(ImageFormat::Png));
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(&webp), Some(ImageFormat::WebP));
        assert_eq!(detect_format(b"not an image"), None);
    }

    #[test]
    fn test_decode_image_png() {
        let png = encode_png_sample(3, 1);
        let (img, fmt) = decode_image(&png).unwrap();
        assert_eq!(fmt, Some(ImageFormat::Png));
        assert_eq!(img.dimensions(), (3, 1));
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_decode_image_jpeg() {
        let jpeg = encode_jpeg_sample(2, 2);
        let (img, fmt) = decode_image(&jpeg).unwrap();
        assert_eq!(fmt, Some(ImageFormat::Jpeg));
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn test_decode_image_webp() {
        let webp = encode_webp_sample(3, 2);
        let (img, fmt) = decode_image(&webp).unwrap();
        assert_eq!(fmt, Some(ImageFormat::WebP));
        assert_eq!(img.dimensions(), (3, 2));
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_jpeg_rejects_truncated_data() {
        let invalid = vec![0xFF, 0xD8, 0x00];
        assert!(decode_jpeg_mozjpeg(&invalid).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_with_image_crate(b"definitely not pixels");
        assert!(matches!(
            result.unwrap_err(),
            ImagePipelineError::DecodeFailed { .. }
        ));
    }

    #[test]
    fn test_auto_orient_rotations() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 2));
        assert_eq!(auto_orient(img.clone(), 1).dimensions(), (4, 2));
        assert_eq!(auto_orient(img.clone(), 3).dimensions(), (4, 2));
        assert_eq!(auto_orient(img.clone(), 6).dimensions(), (2, 4));
        assert_eq!(auto_orient(img.clone(), 8).dimensions(), (2, 4));
        // out-of-range values are ignored
        assert_eq!(auto_orient(img, 9).dimensions(), (4, 2));
    }

    #[test]
    fn test_detect_exif_orientation_absent() {
        let png = encode_png_sample(2, 2);
        assert_eq!(detect_exif_orientation(&png), None);
        let jpeg = encode_jpeg_sample(2, 2);
        assert_eq!(detect_exif_orientation(&jpeg), None);
    }
}
