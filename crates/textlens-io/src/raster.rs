//! Image loading and PNG export.
//!
//! The coordinator and the pipeline only ever see decoded
//! [`PixelBuffer`]s. This module is the boundary: it decodes whatever
//! the `image` crate understands (PNG, JPEG, BMP, WebP) into RGBA8 and
//! encodes results back to PNG.

use std::path::Path;

use image::ImageEncoder;
use textlens_pipeline::PixelBuffer;

/// Errors that can occur while loading or saving images.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// Input bytes are empty.
    #[error("empty input: no image data provided")]
    EmptyInput,

    /// The bytes are not an image format `image` can decode.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    Encode(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode raw image bytes into an RGBA8 buffer.
///
/// # Errors
///
/// Returns [`RasterError::EmptyInput`] if `bytes` is empty and
/// [`RasterError::Decode`] if the format is unrecognized or the data is
/// corrupt.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::EmptyInput);
    }
    let img = image::load_from_memory(bytes).map_err(|e| RasterError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Read and decode an image file.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the file cannot be read, otherwise as
/// [`decode`].
pub fn load(path: &Path) -> Result<PixelBuffer, RasterError> {
    let bytes = std::fs::read(path)?;
    let image = decode(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "loaded image"
    );
    Ok(image)
}

/// Encode an RGBA8 buffer as PNG bytes.
///
/// # Errors
///
/// Returns [`RasterError::Encode`] if PNG encoding fails.
pub fn encode_png(image: &PixelBuffer) -> Result<Vec<u8>, RasterError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| RasterError::Encode(e.to_string()))?;
    Ok(png_bytes)
}

/// Encode `image` as PNG and write it to `path`.
///
/// # Errors
///
/// Returns [`RasterError::Encode`] if encoding fails and
/// [`RasterError::Io`] if the file cannot be written.
pub fn save_png(image: &PixelBuffer, path: &Path) -> Result<(), RasterError> {
    let bytes = encode_png(image)?;
    std::fs::write(path, &bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved PNG");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(RasterError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_return_decode_error() {
        assert!(matches!(
            decode(&[0xFF, 0xFE, 0x00, 0x01]),
            Err(RasterError::Decode(_))
        ));
    }

    #[test]
    fn png_survives_encode_and_decode() {
        let img = PixelBuffer::from_fn(5, 3, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([(x * 40) as u8, (y * 80) as u8, 7, 128])
        });
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(decode(&bytes).unwrap(), img);
    }

    #[test]
    fn save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("textlens-raster-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");
        let img = PixelBuffer::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        save_png(&img, &path).unwrap();
        assert_eq!(load(&path).unwrap(), img);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load(Path::new("/nonexistent/textlens/missing.png"));
        assert!(matches!(result, Err(RasterError::Io(_))));
    }
}
