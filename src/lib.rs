// lib.rs
//
// scribe-images: the image pipeline behind Scribe's editor and profile forms.
//
// Two cooperating components:
// - Transcoder: dimension-bounding, format-converting, size-budgeting
//   re-encoder (WebP by default)
// - Batch orchestrator: finds locally-referenced images in rich-text HTML,
//   runs each through the transcoder, uploads the result, and rewrites the
//   document
//
// Design notes:
// - Collaborators (object storage, local-URI resolution) are injected traits
// - Batch items run strictly sequentially; peak decode pressure stays bounded
// - A byte budget that cannot be met at the quality floor is best-effort,
//   not an error

pub mod batch;
pub mod error;
pub mod ops;
pub mod storage;
pub mod transcoder;

use error::ImagePipelineError;
use image::ImageReader;
use serde::Serialize;
use std::io::Cursor;

pub use batch::{
    extract_local_image_sources, BatchConfig, BatchProgress, DataUriResolver,
    DocumentImageProcessor, ProcessedDocument, SourceResolver, UploadResult,
};
pub use error::{ErrorCategory, Result};
pub use ops::{format_file_size, OutputFormat, UploadProfile};
pub use storage::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use transcoder::{
    create_variants, transcode, ImageVariants, SourceImage, TranscodeOptions, TranscodeResult,
};

/// Image metadata read from the header alone, without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Detected container format (jpeg, png, webp, gif), if recognized.
    pub format: Option<String>,
    pub size: usize,
    pub name: String,
}

/// Inspect a source image's metadata WITHOUT decoding pixels.
/// Reads only the header bytes, so it is safe to call before the full
/// transcode to reject unusable inputs cheaply.
pub fn image_metadata(source: &SourceImage) -> Result<ImageMetadata> {
    let reader = ImageReader::new(Cursor::new(&source.bytes))
        .with_guessed_format()
        .map_err(|e| {
            ImagePipelineError::decode_failed(format!("failed to read image header: {e}"))
        })?;

    let format = reader.format().map(|f| format!("{f:?}").to_lowercase());
    let (width, height) = reader.into_dimensions().map_err(|e| {
        ImagePipelineError::decode_failed(format!("failed to read dimensions: {e}"))
    })?;

    Ok(ImageMetadata {
        width,
        height,
        format,
        size: source.len(),
        name: source.name.clone(),
    })
}

/// Input MIME types the transcoder accepts.
pub fn supported_input_types() -> &'static [&'static str] {
    &transcoder::SUPPORTED_CONTENT_TYPES
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn png_source(width: u32, height: u32) -> SourceImage {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        SourceImage::new("sample.png", "image/png", buf)
    }

    #[test]
    fn test_image_metadata_reads_header() {
        let source = png_source(120, 80);
        let metadata = image_metadata(&source).unwrap();
        assert_eq!(metadata.width, 120);
        assert_eq!(metadata.height, 80);
        assert_eq!(metadata.format.as_deref(), Some("png"));
        assert_eq!(metadata.size, source.len());
        assert_eq!(metadata.name, "sample.png");
    }

    #[test]
    fn test_image_metadata_rejects_garbage() {
        let source = SourceImage::new("junk.bin", "image/png", b"garbage".to_vec());
        assert!(image_metadata(&source).is_err());
    }

    #[test]
    fn test_supported_input_types_listing() {
        let types = supported_input_types();
        assert!(types.contains(&"image/jpeg"));
        assert!(types.contains(&"image/gif"));
        assert!(!types.contains(&"image/avif"));
    }
}
