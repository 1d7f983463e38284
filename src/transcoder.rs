// src/transcoder.rs
//
// The transcoding core: validate -> decode -> bound dimensions -> resample ->
// encode, with an iterative quality search when a byte budget is set.
//
// This file is a facade over the decomposed modules in transcoder/

// =============================================================================
// SECURITY & POLICY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 16_384;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Absolute ceiling on input size, enforced before any decode work.
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Lowest encode quality (0-1 scale) the size-reduction loop will attempt
/// before giving up and returning its smallest result.
pub const QUALITY_FLOOR: f32 = 0.1;

/// Fixed quality decrement (0-1 scale) applied per size-reduction iteration.
pub const QUALITY_STEP: f32 = 0.1;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod decoder;
mod encoder;
mod resize;
mod transcode;

// Re-export commonly used types and functions
pub use decoder::{
    auto_orient, check_dimensions, decode_image, detect_exif_orientation, detect_format,
    ensure_dimensions_safe, is_supported_content_type, SUPPORTED_CONTENT_TYPES,
};
pub use encoder::{encode, encode_jpeg, encode_png, encode_webp, QualitySettings};
pub use resize::{calc_output_dimensions, fast_resize_owned};
pub use transcode::{
    create_variants, transcode, ImageVariants, SourceImage, TranscodeOptions, TranscodeResult,
};
