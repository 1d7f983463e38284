// src/ops.rs
//
// Output formats and per-surface upload profiles shared by the transcoder
// and the batch orchestrator.

use crate::error::{ImagePipelineError, Result};
use serde::Serialize;

/// Output codec for transcoding.
///
/// WebP is the production default; JPEG and PNG remain available for hosts
/// that need them. Quality is carried separately (see TranscodeOptions)
/// because the byte-budget loop re-encodes the same format at descending
/// quality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn from_str(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "webp" => Ok(Self::Webp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(ImagePipelineError::invalid_options(
                "format",
                other.to_string(),
                "expected webp, jpeg, or png",
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// PNG is lossless; the quality-reduction loop only applies to lossy codecs.
    pub fn is_lossy(&self) -> bool {
        !matches!(self, Self::Png)
    }
}

// =============================================================================
// UPLOAD PROFILES - per-surface bounds for the platform's image slots
// =============================================================================

/// Transcode bounds for a specific upload surface.
///
/// Quality is on the 0-1 scale used throughout the public API; the byte
/// budget is a best-effort target (see the transcoder's quality floor).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UploadProfile {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f32,
    pub max_output_bytes: usize,
}

impl UploadProfile {
    /// Get the built-in profile by name
    pub fn get(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "thumbnail" => Some(Self::thumbnail()),
            "avatar" => Some(Self::avatar()),
            "content" => Some(Self::content()),
            "cover" => Some(Self::cover()),
            _ => None,
        }
    }

    /// Like get(), but surfaces an error naming the available profiles.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::get(name).ok_or_else(|| ImagePipelineError::invalid_profile(name.to_string()))
    }

    /// Thumbnail profile: 150x150, quality 0.8, 50KB budget.
    /// Use case: gallery thumbnails, preview tiles
    pub fn thumbnail() -> Self {
        Self {
            max_width: 150,
            max_height: 150,
            quality: 0.8,
            max_output_bytes: 50 * 1024,
        }
    }

    /// Avatar profile: 400x400, quality 0.9, 200KB budget.
    /// Use case: profile pictures
    pub fn avatar() -> Self {
        Self {
            max_width: 400,
            max_height: 400,
            quality: 0.9,
            max_output_bytes: 200 * 1024,
        }
    }

    /// Content profile: 1200x800, quality 0.85, 500KB budget.
    /// Use case: in-post images processed by the batch orchestrator
    pub fn content() -> Self {
        Self {
            max_width: 1200,
            max_height: 800,
            quality: 0.85,
            max_output_bytes: 500 * 1024,
        }
    }

    /// Cover profile: 1920x1080, quality 0.85, 500KB budget.
    /// Use case: profile covers, featured images
    pub fn cover() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 0.85,
            max_output_bytes: 500 * 1024,
        }
    }
}

/// Human-readable byte counts for progress labels and UI summaries.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exponent = (((bytes as f64).ln() / 1024_f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exponent as i32);

    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("webp").unwrap(), OutputFormat::Webp);
        assert_eq!(OutputFormat::from_str("JPEG").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("jpg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("png").unwrap(), OutputFormat::Png);
        assert!(OutputFormat::from_str("avif").is_err());
    }

    #[test]
    fn test_output_format_metadata() {
        assert_eq!(OutputFormat::Webp.extension(), "webp");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Webp.content_type(), "image/webp");
        assert!(OutputFormat::Webp.is_lossy());
        assert!(OutputFormat::Jpeg.is_lossy());
        assert!(!OutputFormat::Png.is_lossy());
    }

    #[test]
    fn test_profile_lookup() {
        assert_eq!(UploadProfile::get("content"), Some(UploadProfile::content()));
        assert_eq!(UploadProfile::get("AVATAR"), Some(UploadProfile::avatar()));
        assert_eq!(UploadProfile::get("hero"), None);

        let err = UploadProfile::resolve("hero").unwrap_err();
        assert!(err.to_string().contains("hero"));
    }

    #[test]
    fn test_content_profile_bounds() {
        let profile = UploadProfile::content();
        assert_eq!(profile.max_width, 1200);
        assert_eq!(profile.max_height, 800);
        assert_eq!(profile.max_output_bytes, 500 * 1024);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(500 * 1024), "500 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
    }
}
