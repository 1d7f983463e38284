// src/error.rs
//
// Unified error handling for scribe-images.
// Uses thiserror for simple, type-safe error handling.
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/decoding/encoding issues
// - ResourceLimit: Byte/dimension/pixel limits
// - Transport: Dereference and upload failures (batch-local)
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to pick recovery behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by the caller
    UserError,
    /// Format/decoding/encoding issues
    CodecError,
    /// Byte/dimension/pixel limits
    ResourceLimit,
    /// Dereference and upload failures against remote collaborators
    Transport,
    /// Library bugs (should not happen)
    InternalBug,
}

/// scribe-images error types
///
/// All errors are type-safe and provide clear, actionable messages.
#[derive(Debug, Clone, Error)]
pub enum ImagePipelineError {
    // Validation Errors
    #[error("Unsupported image type '{content_type}'. Expected JPEG, PNG, WebP, or GIF")]
    UnsupportedFormat { content_type: Cow<'static, str> },

    #[error("Input image is {size} bytes, exceeding the {max} byte limit")]
    OversizeInput { size: usize, max: usize },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidOptions {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Unknown upload profile: '{name}'. Available: thumbnail, avatar, content, cover")]
    InvalidProfile { name: Cow<'static, str> },

    #[error("A non-empty owner id is required before any image is uploaded")]
    MissingOwner,

    // Decode Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Processing Errors
    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Batch-local Transport Errors
    #[error("Timed out dereferencing {reference} after {timeout_ms}ms")]
    DereferenceTimeout { reference: String, timeout_ms: u64 },

    #[error("Failed to dereference {reference}: {message}")]
    DereferenceFailed {
        reference: String,
        message: Cow<'static, str>,
    },

    #[error("Upload of {path} timed out after {timeout_ms}ms")]
    UploadTimeout { path: String, timeout_ms: u64 },

    #[error("Failed to upload {path}: {message}")]
    UploadFailed {
        path: String,
        message: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

// Constructor Helpers
impl ImagePipelineError {
    pub fn unsupported_format(content_type: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            content_type: content_type.into(),
        }
    }

    pub fn oversize_input(size: usize, max: usize) -> Self {
        Self::OversizeInput { size, max }
    }

    pub fn invalid_options(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidOptions {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_profile(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidProfile { name: name.into() }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dereference_timeout(reference: impl Into<String>, timeout_ms: u64) -> Self {
        Self::DereferenceTimeout {
            reference: reference.into(),
            timeout_ms,
        }
    }

    pub fn dereference_failed(
        reference: impl Into<String>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::DereferenceFailed {
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn upload_timeout(path: impl Into<String>, timeout_ms: u64) -> Self {
        Self::UploadTimeout {
            path: path.into(),
            timeout_ms,
        }
    }

    pub fn upload_failed(
        path: impl Into<String>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UploadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (the caller can fix it).
    ///
    /// Consistent with category():
    /// - UserError and ResourceLimit errors are recoverable (pick a smaller
    ///   image, a supported format, a valid option value)
    /// - Transport errors are recoverable (retry, check connectivity)
    /// - CodecError and InternalBug errors are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit | ErrorCategory::Transport => {
                true
            }
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidOptions { .. } | Self::InvalidProfile { .. } | Self::MissingOwner => {
                ErrorCategory::UserError
            }

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::ResizeFailed { .. }
            | Self::EncodeFailed { .. } => ErrorCategory::CodecError,

            Self::OversizeInput { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            Self::DereferenceTimeout { .. }
            | Self::DereferenceFailed { .. }
            | Self::UploadTimeout { .. }
            | Self::UploadFailed { .. } => ErrorCategory::Transport,

            Self::Internal { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ImagePipelineError>;
