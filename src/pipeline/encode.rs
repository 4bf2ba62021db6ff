//! Encoding: [`Raster`] → compressed bytes, with an optional byte budget.
//!
//! ## Adaptive search
//!
//! When a budget is set and the first encode overshoots it, quality is
//! lowered by a fixed step and the raster re-encoded, until the output fits,
//! the quality floor is reached, or the attempt limit runs out. The result of
//! the last pass is returned either way; an unmet budget is reported through
//! [`EncodeOutcome::budget_met`], never as an error.
//!
//! With the default [`SearchPolicy`] (step 0.15, floor 0.1, 5 attempts) an
//! image costs at most six encode passes.

use crate::error::ImgPdfError;
use crate::pipeline::decode::Raster;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Output codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Jpeg,
    Png,
    WebP,
}

impl Codec {
    /// File extension used for output names (`jpg`, `png`, `webp`).
    pub fn extension(self) -> &'static str {
        match self {
            Codec::Jpeg => "jpg",
            Codec::Png => "png",
            Codec::WebP => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Codec::Jpeg => "image/jpeg",
            Codec::Png => "image/png",
            Codec::WebP => "image/webp",
        }
    }

    /// Quality used when converting to this codec without an explicit one.
    pub fn conversion_quality(self) -> f32 {
        match self {
            Codec::Jpeg => 0.9,
            Codec::Png | Codec::WebP => 0.95,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::Jpeg => "JPEG",
            Codec::Png => "PNG",
            Codec::WebP => "WebP",
        })
    }
}

impl FromStr for Codec {
    type Err = ImgPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Codec::Jpeg),
            "png" => Ok(Codec::Png),
            "webp" => Ok(Codec::WebP),
            other => Err(ImgPdfError::InvalidConfig(format!(
                "unsupported output format '{other}' (expected jpg, png or webp)"
            ))),
        }
    }
}

/// What to encode and how hard to squeeze.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub codec: Codec,
    /// Initial quality factor in `[0.0, 1.0]`.
    pub quality: f32,
    /// Byte-size budget. `None` or `Some(0)` means a single pass.
    pub budget_bytes: Option<u64>,
}

impl EncodeRequest {
    pub fn new(codec: Codec, quality: f32) -> Self {
        Self {
            codec,
            quality: quality.clamp(0.0, 1.0),
            budget_bytes: None,
        }
    }

    pub fn with_budget(mut self, budget_bytes: u64) -> Self {
        self.budget_bytes = Some(budget_bytes);
        self
    }

    fn effective_budget(&self) -> Option<u64> {
        self.budget_bytes.filter(|&b| b > 0)
    }
}

/// Bounds of the adaptive quality search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchPolicy {
    /// Quality decrement per re-encode.
    pub step: f32,
    /// Lowest quality the search will ever use.
    pub floor: f32,
    /// Maximum re-encodes after the initial pass.
    pub max_attempts: u32,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            step: 0.15,
            floor: 0.1,
            max_attempts: 5,
        }
    }
}

/// Result of [`encode_with_budget`].
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub bytes: Vec<u8>,
    /// Quality of the pass that produced `bytes`.
    pub quality: f32,
    /// Total encode passes, including the first.
    pub passes: u32,
    /// `false` when a budget was set and the search could not meet it.
    pub budget_met: bool,
}

/// Encodes a raster with a given codec and quality.
///
/// This is the seam between the pipeline and the codec library; tests swap
/// in deterministic encoders to drive the adaptive search.
pub trait RasterEncoder: Send + Sync {
    fn encode(&self, raster: &Raster, codec: Codec, quality: f32) -> Result<Vec<u8>, ImgPdfError>;
}

/// Default encoder backed by the `image` crate.
///
/// * JPEG: quality maps to 1–100; alpha is dropped.
/// * PNG: lossless; quality only chooses the deflate effort.
/// * WebP: the pure-Rust encoder is lossless only, so quality below 1.0 is
///   applied by quantising the RGB channels first; alpha is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecEncoder;

impl RasterEncoder for CodecEncoder {
    fn encode(&self, raster: &Raster, codec: Codec, quality: f32) -> Result<Vec<u8>, ImgPdfError> {
        let enc_err = |e: image::ImageError| ImgPdfError::Encode {
            codec: codec.to_string(),
            detail: e.to_string(),
        };
        let quality = quality.clamp(0.0, 1.0);
        let mut buf = Vec::new();

        match codec {
            Codec::Jpeg => {
                let rgb = raster.image().to_rgb8();
                let (w, h) = rgb.dimensions();
                let q = ((quality * 100.0).round() as u8).clamp(1, 100);
                JpegEncoder::new_with_quality(&mut buf, q)
                    .write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                    .map_err(enc_err)?;
            }
            Codec::Png => {
                let rgba = raster.image().to_rgba8();
                let (w, h) = rgba.dimensions();
                let compression = if quality < 0.5 {
                    CompressionType::Best
                } else {
                    CompressionType::Default
                };
                PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive)
                    .write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                    .map_err(enc_err)?;
            }
            Codec::WebP => {
                let mut rgba = raster.image().to_rgba8();
                quantize_rgb(&mut rgba, quality);
                let (w, h) = rgba.dimensions();
                WebPEncoder::new_lossless(&mut buf)
                    .encode(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                    .map_err(enc_err)?;
            }
        }

        Ok(buf)
    }
}

/// Reduce each RGB channel to a quality-dependent number of levels so the
/// lossless WebP encoder has less entropy to store. Alpha is untouched.
fn quantize_rgb(data: &mut [u8], quality: f32) {
    if quality >= 1.0 {
        return;
    }
    let q = quality.clamp(0.01, 1.0);
    let levels = (2.0 + q * q * 254.0).round().clamp(2.0, 256.0);
    let step = 255.0 / (levels - 1.0);
    for pixel in data.chunks_exact_mut(4) {
        for channel in pixel.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Encode `raster` per `request`, searching downward in quality until the
/// budget is met or `policy` gives up.
pub fn encode_with_budget(
    encoder: &dyn RasterEncoder,
    raster: &Raster,
    request: &EncodeRequest,
    policy: &SearchPolicy,
) -> Result<EncodeOutcome, ImgPdfError> {
    let initial = request.quality;
    let mut quality = initial;
    let mut bytes = encoder.encode(raster, request.codec, quality)?;
    let mut passes = 1;

    let Some(budget) = request.effective_budget() else {
        return Ok(EncodeOutcome {
            bytes,
            quality,
            passes,
            budget_met: true,
        });
    };

    let mut current = initial;
    let mut attempt = 0;
    while bytes.len() as u64 > budget && current > policy.floor && attempt < policy.max_attempts {
        attempt += 1;
        // Derived from the initial value each time so rounding never drifts.
        current = initial - policy.step * attempt as f32;
        quality = current.max(policy.floor);
        bytes = encoder.encode(raster, request.codec, quality)?;
        passes += 1;
        debug!(
            "Adaptive pass {}: quality {:.2} → {} bytes (budget {})",
            attempt,
            quality,
            bytes.len(),
            budget
        );
    }

    let budget_met = bytes.len() as u64 <= budget;
    if !budget_met {
        warn!(
            "Size budget of {} bytes not met after {} passes; keeping {} bytes at quality {:.2}",
            budget,
            passes,
            bytes.len(),
            quality
        );
    }

    Ok(EncodeOutcome {
        bytes,
        quality,
        passes,
        budget_met,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::decode::decode;
    use image::{DynamicImage, Rgba, RgbaImage};
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Produces `quality × bytes_at_full` zero bytes and records every quality.
    pub(crate) struct LinearEncoder {
        pub bytes_at_full: f32,
        pub calls: Mutex<Vec<f32>>,
    }

    impl LinearEncoder {
        pub(crate) fn new(bytes_at_full: f32) -> Self {
            Self {
                bytes_at_full,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn qualities(&self) -> Vec<f32> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RasterEncoder for LinearEncoder {
        fn encode(&self, _: &Raster, _: Codec, quality: f32) -> Result<Vec<u8>, ImgPdfError> {
            self.calls.lock().unwrap().push(quality);
            Ok(vec![0; (quality * self.bytes_at_full) as usize])
        }
    }

    /// Always returns the same size regardless of quality.
    struct StubbornEncoder {
        size: usize,
        calls: Mutex<Vec<f32>>,
    }

    impl RasterEncoder for StubbornEncoder {
        fn encode(&self, _: &Raster, _: Codec, quality: f32) -> Result<Vec<u8>, ImgPdfError> {
            self.calls.lock().unwrap().push(quality);
            Ok(vec![0; self.size])
        }
    }

    fn raster() -> Raster {
        Raster::new(DynamicImage::ImageRgba8(RgbaImage::from_fn(24, 16, |x, y| {
            Rgba([(x * 10) as u8, (y * 15) as u8, 90, 255])
        })))
        .unwrap()
    }

    fn assert_qualities(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len(), "passes: {actual:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn no_budget_is_single_pass() {
        let enc = LinearEncoder::new(1_000_000.0);
        let out = encode_with_budget(
            &enc,
            &raster(),
            &EncodeRequest::new(Codec::Jpeg, 0.8),
            &SearchPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.passes, 1);
        assert!(out.budget_met);
        assert_eq!(enc.qualities().len(), 1);
    }

    #[test]
    fn zero_budget_is_single_pass() {
        let enc = LinearEncoder::new(1_000_000.0);
        let req = EncodeRequest::new(Codec::Jpeg, 0.8).with_budget(0);
        let out = encode_with_budget(&enc, &raster(), &req, &SearchPolicy::default()).unwrap();
        assert_eq!(out.passes, 1);
    }

    #[test]
    fn already_under_budget_is_single_pass() {
        let enc = LinearEncoder::new(1000.0);
        let req = EncodeRequest::new(Codec::Jpeg, 0.8).with_budget(10_000);
        let out = encode_with_budget(&enc, &raster(), &req, &SearchPolicy::default()).unwrap();
        assert_eq!(out.passes, 1);
        assert!(out.budget_met);
    }

    #[test]
    fn search_stops_once_budget_met() {
        // 500 KB at 0.8; 200 KB budget is first met at quality 0.2.
        let enc = LinearEncoder::new(625_000.0);
        let req = EncodeRequest::new(Codec::Jpeg, 0.8).with_budget(200 * 1024);
        let out = encode_with_budget(&enc, &raster(), &req, &SearchPolicy::default()).unwrap();
        assert_qualities(&enc.qualities(), &[0.8, 0.65, 0.5, 0.35, 0.2]);
        assert!(out.budget_met);
        assert_eq!(out.passes, 5);
        assert!((out.quality - 0.2).abs() < 1e-4);
    }

    #[test]
    fn unmet_budget_returns_last_pass_at_floor() {
        let enc = StubbornEncoder {
            size: 500 * 1024,
            calls: Mutex::new(Vec::new()),
        };
        let req = EncodeRequest::new(Codec::Jpeg, 0.8).with_budget(200 * 1024);
        let out = encode_with_budget(&enc, &raster(), &req, &SearchPolicy::default()).unwrap();
        assert_qualities(
            &enc.calls.lock().unwrap(),
            &[0.8, 0.65, 0.5, 0.35, 0.2, 0.1],
        );
        assert_eq!(out.passes, 6);
        assert!(!out.budget_met);
        assert_eq!(out.bytes.len(), 500 * 1024);
    }

    #[test]
    fn starting_at_floor_does_not_search() {
        let enc = StubbornEncoder {
            size: 10_000,
            calls: Mutex::new(Vec::new()),
        };
        let req = EncodeRequest::new(Codec::Jpeg, 0.1).with_budget(1);
        let out = encode_with_budget(&enc, &raster(), &req, &SearchPolicy::default()).unwrap();
        assert_eq!(out.passes, 1);
    }

    #[test]
    fn codec_parse_and_extension() {
        assert_eq!("JPG".parse::<Codec>().unwrap(), Codec::Jpeg);
        assert_eq!("jpeg".parse::<Codec>().unwrap().extension(), "jpg");
        assert_eq!("webp".parse::<Codec>().unwrap().mime_type(), "image/webp");
        assert!("tiff".parse::<Codec>().is_err());
    }

    #[test]
    fn codec_encoder_jpeg_roundtrips_dimensions() {
        let bytes = CodecEncoder.encode(&raster(), Codec::Jpeg, 0.8).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(decode("out.jpg", &bytes).unwrap().dimensions(), (24, 16));
    }

    #[test]
    fn codec_encoder_lower_jpeg_quality_is_smaller() {
        let img = Raster::new(DynamicImage::ImageRgba8(RgbaImage::from_fn(128, 128, |x, y| {
            Rgba([(x * 7 ^ y * 3) as u8, (x * y) as u8, (x + y) as u8, 255])
        })))
        .unwrap();
        let hi = CodecEncoder.encode(&img, Codec::Jpeg, 0.95).unwrap();
        let lo = CodecEncoder.encode(&img, Codec::Jpeg, 0.1).unwrap();
        assert!(lo.len() < hi.len(), "{} !< {}", lo.len(), hi.len());
    }

    #[test]
    fn codec_encoder_png_and_webp_decode() {
        for codec in [Codec::Png, Codec::WebP] {
            let bytes = CodecEncoder.encode(&raster(), codec, 0.5).unwrap();
            let back = decode("out", &bytes).unwrap();
            assert_eq!(back.dimensions(), (24, 16), "{codec}");
        }
    }

    proptest! {
        #[test]
        fn search_is_bounded(
            initial in 0.1f32..=1.0,
            size in 1usize..100_000,
            budget in 1u64..100_000,
        ) {
            let enc = StubbornEncoder { size, calls: Mutex::new(Vec::new()) };
            let req = EncodeRequest::new(Codec::Jpeg, initial).with_budget(budget);
            let policy = SearchPolicy::default();
            let out = encode_with_budget(&enc, &raster(), &req, &policy).unwrap();
            let calls = enc.calls.lock().unwrap();
            prop_assert!(out.passes <= 1 + policy.max_attempts);
            prop_assert_eq!(calls.len() as u32, out.passes);
            for q in calls.iter().skip(1) {
                prop_assert!(*q >= policy.floor - 1e-6);
            }
        }
    }
}
