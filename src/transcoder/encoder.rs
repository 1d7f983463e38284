// src/transcoder/encoder.rs
//
// Encoder operations: WebP (libwebp), JPEG (mozjpeg), PNG (image + oxipng),
// all driven by a single 0-100 quality value. Metadata is stripped as a side
// effect of re-encoding from decoded pixels.

use crate::error::{ImagePipelineError, Result};
use crate::ops::OutputFormat;
use crate::transcoder::common::run_shielded;
use crate::transcoder::MAX_DIMENSION;
use image::{DynamicImage, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// Derives per-codec encode settings from a 0-100 quality value.
/// Quality bands:
/// - High (>=85): visual quality first
/// - Balanced (70-84): quality/speed balance
/// - Fast (50-69): speed leaning
/// - Fastest (<50): speed first
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    // WebP settings. Method 4 / single pass / no preprocessing is the
    // balanced configuration for web content images.
    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_preprocessing(&self) -> i32 {
        0
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }
}

/// Encode `img` in the requested format. Quality applies to lossy formats;
/// PNG ignores it.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Webp => encode_webp(img, quality),
        OutputFormat::Jpeg => encode_jpeg(img, quality),
        OutputFormat::Png => encode_png(img),
    }
}

/// Encode to WebP. Alpha is kept only when the source actually carries it.
pub fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_shielded("encode:webp", || {
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ImagePipelineError::internal("failed to create WebPConfig"))?;

        let settings = QualitySettings::new(quality);
        config.quality = settings.quality;
        config.method = settings.webp_method();
        config.pass = settings.webp_pass();
        config.preprocessing = settings.webp_preprocessing();
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = if img.color().has_alpha() {
            let rgba: Cow<'_, image::RgbaImage> = match img {
                DynamicImage::ImageRgba8(rgba_img) => Cow::Borrowed(rgba_img),
                _ => Cow::Owned(img.to_rgba8()),
            };
            let (w, h) = rgba.dimensions();
            webp::Encoder::from_rgba(&rgba, w, h).encode_advanced(&config)
        } else {
            let rgb: Cow<'_, image::RgbImage> = match img {
                DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
                _ => Cow::Owned(img.to_rgb8()),
            };
            let (w, h) = rgb.dimensions();
            webp::Encoder::from_rgb(&rgb, w, h).encode_advanced(&config)
        }
        .map_err(|e| {
            ImagePipelineError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;

        Ok(mem.to_vec())
    })
}

/// Encode to JPEG using mozjpeg with web-optimized settings.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_shielded("encode:jpeg", || {
        let quality = quality.min(100);

        // Avoid conversion if already RGB8
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ImagePipelineError::internal(
                "invalid image dimensions: width or height is zero",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ImagePipelineError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }
        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ImagePipelineError::encode_failed(
                "jpeg",
                "pixel buffer size mismatch",
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let encoded = {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ImagePipelineError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ImagePipelineError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ImagePipelineError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to finish: {e:?}"),
                )
            })?;

            output
        };

        Ok(encoded)
    })
}

/// Encode to PNG via the image crate, then losslessly recompress with oxipng.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    run_shielded("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| {
                ImagePipelineError::encode_failed("png", format!("PNG encode failed: {e}"))
            })?;

        let mut options = oxipng::Options::from_preset(2);
        // Ancillary chunks carry no pixels; the pipeline strips metadata anyway.
        options.strip = oxipng::StripChunks::Safe;

        let optimized = oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ImagePipelineError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })?;

        Ok(optimized)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{RgbImage, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn create_test_image_rgba(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
        }))
    }

    #[test]
    fn test_encode_webp_produces_valid_webp() {
        let img = create_test_image(100, 100);
        let result = encode_webp(&img, 80).unwrap();
        // RIFF....WEBP magic
        assert_eq!(&result[0..4], b"RIFF");
        assert_eq!(&result[8..12], b"WEBP");
    }

    #[test]
    fn test_encode_webp_rgba_keeps_working() {
        let img = create_test_image_rgba(64, 64);
        let result = encode_webp(&img, 80).unwrap();
        assert_eq!(&result[0..4], b"RIFF");
        assert_eq!(&result[8..12], b"WEBP");
    }

    #[test]
    fn test_encode_webp_quality_affects_size() {
        let img = create_test_image(256, 256);
        let high = encode_webp(&img, 95).unwrap();
        let low = encode_webp(&img, 20).unwrap();
        assert!(!high.is_empty());
        assert!(!low.is_empty());
        assert!(low.len() <= high.len());
    }

    #[test]
    fn test_encode_jpeg_produces_valid_jpeg() {
        let img = create_test_image(100, 100);
        let result = encode_jpeg(&img, 80).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
        assert_eq!(&result[result.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_quality_range() {
        let img = create_test_image(64, 64);
        for quality in [10, 50, 90, 100] {
            let result = encode_jpeg(&img, quality).unwrap();
            assert_eq!(&result[0..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn test_encode_png_produces_valid_png() {
        let img = create_test_image(100, 100);
        let result = encode_png(&img).unwrap();
        assert_eq!(
            &result[0..8],
            &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
        );
    }

    #[test]
    fn test_encode_dispatch_matches_format() {
        let img = create_test_image(32, 32);
        let webp = encode(&img, OutputFormat::Webp, 80).unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
        let jpeg = encode(&img, OutputFormat::Jpeg, 80).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        let png = encode(&img, OutputFormat::Png, 80).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_quality_settings_webp_mapping_is_stable() {
        let high = QualitySettings::new(90);
        assert_eq!(high.webp_method(), 4);
        assert_eq!(high.webp_pass(), 1);
        assert_eq!(high.webp_sns_strength(), 50);
        assert_eq!(high.webp_filter_strength(), 20);
        assert_eq!(high.webp_filter_sharpness(), 2);

        let balanced = QualitySettings::new(75);
        assert_eq!(balanced.webp_sns_strength(), 70);
        assert_eq!(balanced.webp_filter_strength(), 30);
        assert_eq!(balanced.webp_filter_sharpness(), 0);

        let fast = QualitySettings::new(60);
        assert_eq!(fast.webp_sns_strength(), 80);
        assert_eq!(fast.webp_filter_strength(), 30);

        let fastest = QualitySettings::new(40);
        assert_eq!(fastest.webp_sns_strength(), 80);
        assert_eq!(fastest.webp_filter_strength(), 40);
    }

    #[test]
    fn test_quality_clamps_above_100() {
        let settings = QualitySettings::new(255);
        assert_eq!(settings.quality, 100.0);
    }
}
