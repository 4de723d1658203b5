use std::io::Cursor;

use base64::Engine;
use image::{
    codecs::jpeg::JpegEncoder, imageops::FilterType, metadata::Orientation, DynamicImage, ImageDecoder, ImageError,
    ImageReader,
};
use thiserror::Error;
use tracing::debug;

use crate::models::EncodedImage;

pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("file could not be decoded as an image: {0}")]
    Decode(#[source] ImageError),
    #[error("image could not be re-encoded: {0}")]
    Encode(#[source] ImageError),
}

/// True when a declared MIME type names an image, e.g. `image/png`.
pub fn is_image_mime(mime: &str) -> bool {
    mime.trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// Fits `(width, height)` inside a `max`-sized box, keeping the aspect ratio.
pub fn target_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    let max = max.max(1);
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = max as f64 / width.max(height) as f64;
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max);
    if width >= height {
        (max, fit(height))
    } else {
        (fit(width), max)
    }
}

/// Decodes `bytes` and applies the EXIF orientation tag, which re-encoding would otherwise drop.
fn decode_upright(bytes: &[u8]) -> Result<DynamicImage, NormalizeError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| NormalizeError::Decode(ImageError::IoError(e)))?
        .into_decoder()
        .map_err(NormalizeError::Decode)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(NormalizeError::Decode)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Downsamples and re-encodes user photos so they upload quickly but keep label text legible.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { max_dimension: 1024, jpeg_quality: 80 }
    }
}

impl Normalizer {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self { max_dimension: max_dimension.max(1), jpeg_quality }
    }

    pub fn normalize(&self, bytes: &[u8]) -> Result<EncodedImage, NormalizeError> {
        let decoded = decode_upright(bytes)?;
        let (src_w, src_h) = (decoded.width(), decoded.height());
        let (width, height) = target_dimensions(src_w, src_h, self.max_dimension);

        let raster = if (width, height) == (src_w, src_h) {
            decoded
        } else {
            decoded.resize_exact(width, height, FilterType::CatmullRom)
        };

        let jpeg = self.encode_jpeg(&raster)?;
        debug!(src_w, src_h, width, height, bytes = jpeg.len(), "normalized image");

        Ok(EncodedImage {
            data: base64::engine::general_purpose::STANDARD.encode(&jpeg),
            mime_type: OUTPUT_MIME_TYPE.to_string(),
            width,
            height,
        })
    }

    fn encode_jpeg(&self, raster: &DynamicImage) -> Result<Vec<u8>, NormalizeError> {
        // JPEG has no alpha channel; transparent areas flatten to their RGB values.
        let rgb = raster.to_rgb8();
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
            .encode_image(&rgb)
            .map_err(NormalizeError::Encode)?;
        Ok(out.into_inner())
    }
}
