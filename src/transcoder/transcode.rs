// src/transcoder/transcode.rs
//
// The public transcode entrypoint: validate the source, decode, bound
// dimensions, resample, encode, and walk quality down until the byte budget
// is met (or the floor is reached, in which case the smallest encoding wins).

use crate::error::{ImagePipelineError, Result};
use crate::ops::{OutputFormat, UploadProfile};
use crate::transcoder::{
    decoder, encoder, resize, MAX_INPUT_BYTES, QUALITY_FLOOR, QUALITY_STEP,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Ephemeral input image: raw bytes plus the metadata the caller declared.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name up to the first dot, used to derive the output name.
    fn stem(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

/// Transcode configuration. All fields have production defaults; the value
/// is never mutated once built.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscodeOptions {
    /// Pixel bound for output width. Aspect ratio is preserved; never upscales.
    pub max_width: u32,
    /// Pixel bound for output height.
    pub max_height: u32,
    /// Initial encode quality on a 0-1 scale.
    pub quality: f32,
    /// Output codec.
    pub format: OutputFormat,
    /// Optional byte budget for the encoded output. Best-effort: quality is
    /// walked down to the floor, never below.
    pub max_output_bytes: Option<usize>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 0.85,
            format: OutputFormat::Webp,
            max_output_bytes: Some(500 * 1024),
        }
    }
}

impl From<UploadProfile> for TranscodeOptions {
    fn from(profile: UploadProfile) -> Self {
        Self {
            max_width: profile.max_width,
            max_height: profile.max_height,
            quality: profile.quality,
            format: OutputFormat::Webp,
            max_output_bytes: Some(profile.max_output_bytes),
        }
    }
}

/// Transcode output: the encoded bytes plus the numbers UI surfaces show
/// (byte counts, the compression ratio, final dimensions).
#[derive(Clone, Debug, Serialize)]
pub struct TranscodeResult {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub file_name: String,
    pub format: OutputFormat,
    pub original_bytes: usize,
    pub output_bytes: usize,
    /// round((original - output) / original * 100); negative when the encoder
    /// grew the file (flagged by tests as a regression).
    pub compression_ratio_percent: i32,
    pub width: u32,
    pub height: u32,
}

impl TranscodeResult {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Transcode `source` according to `options`.
///
/// Fails with UnsupportedFormat when the declared MIME type is not on the
/// allow-list, OversizeInput past the absolute input ceiling, and
/// DecodeFailed when the bytes cannot be decoded into a bitmap. A byte
/// budget that cannot be met at the quality floor is NOT an error; the
/// smallest achieved encoding is returned.
pub fn transcode(source: &SourceImage, options: &TranscodeOptions) -> Result<TranscodeResult> {
    validate_options(options)?;

    if !decoder::is_supported_content_type(&source.content_type) {
        return Err(ImagePipelineError::unsupported_format(
            source.content_type.clone(),
        ));
    }
    if source.len() > MAX_INPUT_BYTES {
        return Err(ImagePipelineError::oversize_input(
            source.len(),
            MAX_INPUT_BYTES,
        ));
    }

    decoder::ensure_dimensions_safe(&source.bytes)?;
    let (mut img, detected) = decoder::decode_image(&source.bytes)?;
    if let Some(orientation) = decoder::detect_exif_orientation(&source.bytes) {
        img = decoder::auto_orient(img, orientation);
    }

    let (orig_w, orig_h) = (img.width(), img.height());
    let (out_w, out_h) =
        resize::calc_output_dimensions(orig_w, orig_h, options.max_width, options.max_height);
    if (out_w, out_h) != (orig_w, orig_h) {
        img = resize::fast_resize_owned(img, out_w, out_h)?;
    }

    let initial_quality = quality_percent(options.quality);
    let mut encoded = encoder::encode(&img, options.format, initial_quality)?;

    if let Some(budget) = options.max_output_bytes {
        if encoded.len() > budget && options.format.is_lossy() {
            encoded = shrink_to_budget(&img, options.format, initial_quality, budget, encoded)?;
        }
    }

    let original_bytes = source.len();
    let output_bytes = encoded.len();
    let compression_ratio_percent = compression_ratio(original_bytes, output_bytes);

    debug!(
        name = %source.name,
        input_format = ?detected,
        original = original_bytes,
        output = output_bytes,
        width = out_w,
        height = out_h,
        "transcode complete"
    );

    Ok(TranscodeResult {
        data: encoded,
        file_name: format!("{}_compressed.{}", source.stem(), options.format.extension()),
        format: options.format,
        original_bytes,
        output_bytes,
        compression_ratio_percent,
        width: out_w,
        height: out_h,
    })
}

fn validate_options(options: &TranscodeOptions) -> Result<()> {
    if !(0.0..=1.0).contains(&options.quality) {
        return Err(ImagePipelineError::invalid_options(
            "quality",
            format!("{}", options.quality),
            "must be within 0.0..=1.0",
        ));
    }
    if options.max_width == 0 || options.max_height == 0 {
        return Err(ImagePipelineError::invalid_options(
            "max_width/max_height",
            format!("{}x{}", options.max_width, options.max_height),
            "pixel bounds must be non-zero",
        ));
    }
    Ok(())
}

/// Map a 0-1 quality onto the 0-100 scale the encoders use.
fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Walk quality down in fixed steps until the encoding fits the budget.
/// Ladder: initial-step, initial-2*step, ..., down to the floor inclusive.
/// If nothing fits, the smallest achieved encoding is returned (best-effort
/// policy, documented in the crate docs).
fn shrink_to_budget(
    img: &image::DynamicImage,
    format: OutputFormat,
    initial_quality: u8,
    budget: usize,
    first_attempt: Vec<u8>,
) -> Result<Vec<u8>> {
    let floor = quality_percent(QUALITY_FLOOR);
    let step = quality_percent(QUALITY_STEP);

    let mut best = first_attempt;
    let mut quality = initial_quality;

    while quality >= floor + step {
        quality -= step;
        let candidate = encoder::encode(img, format, quality)?;
        debug!(quality, size = candidate.len(), budget, "budget re-encode");
        if candidate.len() <= budget {
            return Ok(candidate);
        }
        if candidate.len() < best.len() {
            best = candidate;
        }
    }

    warn!(
        budget,
        achieved = best.len(),
        "byte budget not met at quality floor; returning smallest encoding"
    );
    Ok(best)
}

fn compression_ratio(original: usize, output: usize) -> i32 {
    if original == 0 {
        return 0;
    }
    (((original as i64 - output as i64) as f64 / original as f64) * 100.0).round() as i32
}

// =============================================================================
// VARIANTS - one source rendered at the platform's standard sizes
// =============================================================================

/// The standard renditions generated for a newly uploaded image.
#[derive(Clone, Debug, Serialize)]
pub struct ImageVariants {
    pub thumbnail: TranscodeResult,
    pub medium: TranscodeResult,
    pub large: TranscodeResult,
    pub full: TranscodeResult,
}

/// Render thumbnail/medium/large/full variants of one source, sequentially.
pub fn create_variants(source: &SourceImage) -> Result<ImageVariants> {
    let thumbnail = transcode(source, &UploadProfile::thumbnail().into())?;
    let medium = transcode(
        source,
        &TranscodeOptions {
            max_width: 800,
            max_height: 600,
            quality: 0.85,
            format: OutputFormat::Webp,
            max_output_bytes: Some(200 * 1024),
        },
    )?;
    let large = transcode(
        source,
        &TranscodeOptions {
            max_width: 1200,
            max_height: 900,
            quality: 0.9,
            format: OutputFormat::Webp,
            max_output_bytes: Some(400 * 1024),
        },
    )?;
    let full = transcode(
        source,
        &TranscodeOptions {
            max_width: 1920,
            max_height: 1080,
            quality: 0.9,
            format: OutputFormat::Webp,
            max_output_bytes: Some(800 * 1024),
        },
    )?;

    Ok(ImageVariants {
        thumbnail,
        medium,
        large,
        full,
    })
}
