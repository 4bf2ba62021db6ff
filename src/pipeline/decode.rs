//! Decoding: raw image bytes → [`Raster`].
//!
//! The format is guessed from the magic bytes rather than trusted from the
//! file name, so a PNG saved as `photo.jpg` still decodes. Anything the
//! `image` crate cannot parse becomes [`ImgPdfError::Decode`].

use crate::error::ImgPdfError;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// A decoded pixel surface. Width and height are always ≥ 1.
///
/// A raster lives only for the duration of one item's trip through the
/// pipeline; it is never cached or persisted.
#[derive(Debug, Clone)]
pub struct Raster {
    image: DynamicImage,
}

impl Raster {
    /// Wrap an already-decoded image.
    ///
    /// Returns `None` for a zero-sized image.
    pub fn new(image: DynamicImage) -> Option<Self> {
        let (w, h) = image.dimensions();
        (w > 0 && h > 0).then_some(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// Apply a pixel transform. `f` must not produce a zero-sized image.
    pub(crate) fn map_image(self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Self {
        Self {
            image: f(self.image),
        }
    }
}

/// Decode `bytes` into a raster at the image's natural dimensions.
///
/// `name` is only used for error messages.
pub fn decode(name: &str, bytes: &[u8]) -> Result<Raster, ImgPdfError> {
    let decode_err = |detail: String| ImgPdfError::Decode {
        name: name.to_string(),
        detail,
    };

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?;

    if reader.format().is_none() {
        return Err(decode_err("unrecognised image data".into()));
    }

    let image = reader.decode().map_err(|e| decode_err(e.to_string()))?;
    let raster = Raster::new(image).ok_or_else(|| decode_err("image has zero size".into()))?;

    debug!(
        "Decoded '{}' → {}x{} px",
        name,
        raster.width(),
        raster.height()
    );
    Ok(raster)
}

/// Read only the header to get pixel dimensions, without a full decode.
///
/// Returns `None` when the header cannot be parsed.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    /// PNG-encode a solid-colour image of the given size.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 120, 200])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn decode_reports_natural_dimensions() {
        let raster = decode("a.png", &png_bytes(37, 11)).expect("decode");
        assert_eq!(raster.dimensions(), (37, 11));
    }

    #[test]
    fn decode_ignores_misleading_name() {
        let raster = decode("really-a-png.jpg", &png_bytes(4, 4)).expect("decode");
        assert_eq!(raster.width(), 4);
    }

    #[test]
    fn decode_garbage_is_decode_error() {
        let err = decode("junk.png", b"definitely not an image").unwrap_err();
        match err {
            ImgPdfError::Decode { name, .. } => assert_eq!(name, "junk.png"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_truncated_png_fails() {
        let bytes = png_bytes(16, 16);
        let err = decode("cut.png", &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, ImgPdfError::Decode { .. }));
    }

    #[test]
    fn probe_reads_header_only() {
        assert_eq!(probe_dimensions(&png_bytes(9, 3)), Some((9, 3)));
        assert_eq!(probe_dimensions(b"nope"), None);
    }
}
