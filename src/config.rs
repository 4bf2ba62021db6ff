//! Configuration types for every operation.
//!
//! Each operation has one config struct built through a builder whose
//! setters clamp to the accepted range and whose `build()` rejects the
//! combinations clamping cannot fix. Defaults are documented on each field.
//!
//! Pluggable collaborators (encoder, renderer, progress callback) live in
//! the config as `Option<Arc<dyn …>>`; `None` selects the built-in one.

use crate::error::ImgPdfError;
use crate::pipeline::assemble::{ImageScale, PageOrientation, PageSize};
use crate::pipeline::encode::{Codec, CodecEncoder, RasterEncoder, SearchPolicy};
use crate::pipeline::render::{PdfRenderer, PdfiumRenderer};
use crate::pipeline::resize::BoundingBox;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

fn encoder_or_default(encoder: &Option<Arc<dyn RasterEncoder>>) -> Arc<dyn RasterEncoder> {
    encoder
        .clone()
        .unwrap_or_else(|| Arc::new(CodecEncoder))
}

fn callback_or_noop(cb: &Option<ProgressCallback>) -> ProgressCallback {
    cb.clone().unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

fn validate_policy(policy: &SearchPolicy) -> Result<(), ImgPdfError> {
    if !(policy.step > 0.0 && policy.step <= 1.0) {
        return Err(ImgPdfError::InvalidConfig(format!(
            "Search step must be in (0, 1], got {}",
            policy.step
        )));
    }
    if !(policy.floor > 0.0 && policy.floor <= 1.0) {
        return Err(ImgPdfError::InvalidConfig(format!(
            "Quality floor must be in (0, 1], got {}",
            policy.floor
        )));
    }
    Ok(())
}

// ── Compression ──────────────────────────────────────────────────────────

/// Configuration for [`crate::compress_images`].
#[derive(Clone, Serialize)]
pub struct CompressionConfig {
    /// Initial quality factor, 0.1–1.0. Default: 0.8.
    pub quality: f32,

    /// Images larger than this box are scaled down to fit it, preserving
    /// aspect ratio. Never upscales. Default: 2000 × 2000.
    pub max_dimensions: BoundingBox,

    /// Target output size per image in bytes. `None` means a single encode
    /// pass. Default: `None`.
    ///
    /// When set and the first encode is larger, quality is stepped down
    /// (see [`SearchPolicy`]) until the output fits or the search gives up.
    /// Missing the target is not an error.
    pub budget_bytes: Option<u64>,

    /// Output codec. Default: JPEG.
    pub codec: Codec,

    /// Adaptive search parameters. Default: step 0.15, floor 0.1, 5 attempts.
    pub search: SearchPolicy,

    #[serde(skip)]
    pub encoder: Option<Arc<dyn RasterEncoder>>,

    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: 0.8,
            max_dimensions: BoundingBox::new(2000, 2000),
            budget_bytes: None,
            codec: Codec::default(),
            search: SearchPolicy::default(),
            encoder: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("quality", &self.quality)
            .field("max_dimensions", &self.max_dimensions)
            .field("budget_bytes", &self.budget_bytes)
            .field("codec", &self.codec)
            .field("search", &self.search)
            .field("encoder", &self.encoder.as_ref().map(|_| "<dyn RasterEncoder>"))
            .finish()
    }
}

impl CompressionConfig {
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn encoder(&self) -> Arc<dyn RasterEncoder> {
        encoder_or_default(&self.encoder)
    }

    pub(crate) fn callback(&self) -> ProgressCallback {
        callback_or_noop(&self.progress_callback)
    }
}

/// Builder for [`CompressionConfig`].
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    pub fn quality(mut self, q: f32) -> Self {
        self.config.quality = q.clamp(0.1, 1.0);
        self
    }

    pub fn max_dimensions(mut self, max_width: u32, max_height: u32) -> Self {
        self.config.max_dimensions = BoundingBox::new(max_width, max_height);
        self
    }

    /// Target size in bytes; 0 clears the budget.
    pub fn budget_bytes(mut self, bytes: u64) -> Self {
        self.config.budget_bytes = (bytes > 0).then_some(bytes);
        self
    }

    /// Target size in KiB; 0 clears the budget.
    pub fn budget_kb(self, kb: u64) -> Self {
        self.budget_bytes(kb.saturating_mul(1024))
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn search_policy(mut self, policy: SearchPolicy) -> Self {
        self.config.search = policy;
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn RasterEncoder>) -> Self {
        self.config.encoder = Some(encoder);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<CompressionConfig, ImgPdfError> {
        validate_policy(&self.config.search)?;
        Ok(self.config)
    }
}

// ── Image → PDF ──────────────────────────────────────────────────────────

/// How images are stored inside the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfQuality {
    /// JPEG at 0.95.
    #[default]
    High,
    /// JPEG at 0.85.
    Medium,
    /// JPEG at 0.75.
    Low,
    /// Deflated RGB with an alpha soft mask; no generation loss.
    Lossless,
}

impl PdfQuality {
    /// JPEG quality factor, or `None` for lossless embedding.
    pub fn jpeg_quality(self) -> Option<f32> {
        match self {
            PdfQuality::High => Some(0.95),
            PdfQuality::Medium => Some(0.85),
            PdfQuality::Low => Some(0.75),
            PdfQuality::Lossless => None,
        }
    }
}

impl FromStr for PdfQuality {
    type Err = ImgPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(PdfQuality::High),
            "medium" => Ok(PdfQuality::Medium),
            "low" => Ok(PdfQuality::Low),
            "lossless" => Ok(PdfQuality::Lossless),
            other => Err(ImgPdfError::InvalidConfig(format!(
                "Unknown PDF quality '{other}' (expected high, medium, low or lossless)"
            ))),
        }
    }
}

/// Configuration for [`crate::images_to_pdf`].
#[derive(Clone, Serialize)]
pub struct ImageToPdfConfig {
    /// Page size. Default: A4 with orientation following each image.
    pub page_size: PageSize,

    /// Image placement inside the margin box. Default: fit.
    pub scale: ImageScale,

    /// Embedding quality. Default: high.
    pub quality: PdfQuality,

    /// Margin on every side, in millimetres. Default: 0.
    pub margin_mm: f32,

    /// Output file name without extension; sanitised. Default: "converted".
    pub filename: String,

    #[serde(skip)]
    pub encoder: Option<Arc<dyn RasterEncoder>>,

    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ImageToPdfConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            scale: ImageScale::default(),
            quality: PdfQuality::default(),
            margin_mm: 0.0,
            filename: "converted".to_string(),
            encoder: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ImageToPdfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageToPdfConfig")
            .field("page_size", &self.page_size)
            .field("scale", &self.scale)
            .field("quality", &self.quality)
            .field("margin_mm", &self.margin_mm)
            .field("filename", &self.filename)
            .finish()
    }
}

impl ImageToPdfConfig {
    pub fn builder() -> ImageToPdfConfigBuilder {
        ImageToPdfConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn encoder(&self) -> Arc<dyn RasterEncoder> {
        encoder_or_default(&self.encoder)
    }

    pub(crate) fn callback(&self) -> ProgressCallback {
        callback_or_noop(&self.progress_callback)
    }
}

/// Builder for [`ImageToPdfConfig`].
pub struct ImageToPdfConfigBuilder {
    config: ImageToPdfConfig,
}

impl ImageToPdfConfigBuilder {
    pub fn orientation(mut self, orientation: PageOrientation) -> Self {
        self.config.page_size = PageSize::A4(orientation);
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn scale(mut self, scale: ImageScale) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn quality(mut self, quality: PdfQuality) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn margin_mm(mut self, mm: f32) -> Self {
        self.config.margin_mm = mm.max(0.0);
        self
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.config.filename = name.into();
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn RasterEncoder>) -> Self {
        self.config.encoder = Some(encoder);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<ImageToPdfConfig, ImgPdfError> {
        let c = &self.config;
        if let PageSize::Points { width, height } = c.page_size {
            if !(width > 0.0 && height > 0.0) {
                return Err(ImgPdfError::InvalidConfig(format!(
                    "Page size must be positive, got {width}×{height} pt"
                )));
            }
        }
        let (w, h) = c.page_size.resolve(1, 1);
        let margin_pt = c.margin_mm * crate::pipeline::assemble::MM_TO_PT;
        if margin_pt * 2.0 >= w.min(h) {
            return Err(ImgPdfError::InvalidConfig(format!(
                "Margin of {} mm leaves no room on the page",
                c.margin_mm
            )));
        }
        Ok(self.config)
    }
}

// ── PDF → images ─────────────────────────────────────────────────────────

/// Configuration for [`crate::pdf_to_images`].
#[derive(Clone, Serialize)]
pub struct PdfToImageConfig {
    /// Pages to convert. Default: all.
    pub pages: PageSelection,

    /// Output codec. Default: PNG.
    pub codec: Codec,

    /// Render scale relative to the page's size in points, 0.1–5.0.
    /// Default: 1.0.
    pub scale: f32,

    /// User password for encrypted documents.
    #[serde(skip)]
    pub password: Option<String>,

    #[serde(skip)]
    pub renderer: Option<Arc<dyn PdfRenderer>>,

    #[serde(skip)]
    pub encoder: Option<Arc<dyn RasterEncoder>>,

    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PdfToImageConfig {
    fn default() -> Self {
        Self {
            pages: PageSelection::default(),
            codec: Codec::Png,
            scale: 1.0,
            password: None,
            renderer: None,
            encoder: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PdfToImageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfToImageConfig")
            .field("pages", &self.pages)
            .field("codec", &self.codec)
            .field("scale", &self.scale)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn PdfRenderer>"))
            .finish()
    }
}

impl PdfToImageConfig {
    pub fn builder() -> PdfToImageConfigBuilder {
        PdfToImageConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn renderer(&self) -> Arc<dyn PdfRenderer> {
        self.renderer
            .clone()
            .unwrap_or_else(|| Arc::new(PdfiumRenderer::new()))
    }

    pub(crate) fn encoder(&self) -> Arc<dyn RasterEncoder> {
        encoder_or_default(&self.encoder)
    }

    pub(crate) fn callback(&self) -> ProgressCallback {
        callback_or_noop(&self.progress_callback)
    }
}

/// Builder for [`PdfToImageConfig`].
pub struct PdfToImageConfigBuilder {
    config: PdfToImageConfig,
}

impl PdfToImageConfigBuilder {
    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale.clamp(0.1, 5.0);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn RasterEncoder>) -> Self {
        self.config.encoder = Some(encoder);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<PdfToImageConfig, ImgPdfError> {
        if let PageSelection::Range(start, end) = self.config.pages {
            if start > end {
                return Err(ImgPdfError::InvalidConfig(format!(
                    "Invalid page range '{start}-{end}': start must be <= end"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Batch ────────────────────────────────────────────────────────────────

/// What a batch run does with its images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode", content = "codec")]
pub enum BatchMode {
    /// All images into one PDF: 595 × 842 pt pages, 20 pt margin, JPEG 0.85.
    #[default]
    ConvertToPdf,
    /// Quality 0.8, capped at 2000 × 2000, JPEG, no size budget.
    Compress,
    /// Re-encode every image to the given codec without resizing.
    ConvertFormat(Codec),
}

impl BatchMode {
    /// Archive name used when a run produces several files.
    pub fn archive_name(&self) -> String {
        match self {
            BatchMode::ConvertToPdf => "batch-converted.zip".to_string(),
            BatchMode::Compress => "batch-compressed-images.zip".to_string(),
            BatchMode::ConvertFormat(codec) => {
                format!("batch-converted-{}.zip", codec.extension())
            }
        }
    }
}

/// Configuration for [`crate::batch_process`].
#[derive(Clone, Default, Serialize)]
pub struct BatchConfig {
    pub mode: BatchMode,

    #[serde(skip)]
    pub encoder: Option<Arc<dyn RasterEncoder>>,

    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("mode", &self.mode)
            .finish()
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn encoder(&self) -> Arc<dyn RasterEncoder> {
        encoder_or_default(&self.encoder)
    }

    pub(crate) fn callback(&self) -> ProgressCallback {
        callback_or_noop(&self.progress_callback)
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn mode(mut self, mode: BatchMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn RasterEncoder>) -> Self {
        self.config.encoder = Some(encoder);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<BatchConfig, ImgPdfError> {
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive), clipped
    /// to the document.
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated and sorted).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-indexed
    /// page numbers that exist in a `total_pages` document.
    pub fn resolve(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                (s..=e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|&p| p >= 1 && p <= total_pages)
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

impl FromStr for PageSelection {
    type Err = ImgPdfError;

    /// Parse `all`, `5`, `3-15`, or `1,3,5,7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let invalid = |msg: String| ImgPdfError::InvalidConfig(msg);
        let page_num = |p: &str| -> Result<usize, ImgPdfError> {
            let n: usize = p
                .trim()
                .parse()
                .map_err(|_| invalid(format!("Invalid page number: '{}'", p.trim())))?;
            if n < 1 {
                return Err(invalid(format!("Pages are 1-indexed, minimum is 1 (got {n})")));
            }
            Ok(n)
        };

        if s == "all" {
            return Ok(PageSelection::All);
        }

        if s.contains(',') {
            let pages = s.split(',').map(page_num).collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }

        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (page_num(start)?, page_num(end)?);
            if start > end {
                return Err(invalid(format!(
                    "Invalid page range '{start}-{end}': start must be <= end"
                )));
            }
            return Ok(PageSelection::Range(start, end));
        }

        Ok(PageSelection::Single(page_num(&s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_defaults() {
        let c = CompressionConfig::default();
        assert_eq!(c.quality, 0.8);
        assert_eq!(c.max_dimensions, BoundingBox::new(2000, 2000));
        assert_eq!(c.budget_bytes, None);
        assert_eq!(c.codec, Codec::Jpeg);
    }

    #[test]
    fn compression_builder_clamps() {
        let c = CompressionConfig::builder()
            .quality(7.0)
            .max_dimensions(0, 500)
            .budget_kb(200)
            .build()
            .unwrap();
        assert_eq!(c.quality, 1.0);
        assert_eq!(c.max_dimensions, BoundingBox::new(1, 500));
        assert_eq!(c.budget_bytes, Some(204_800));

        let c = CompressionConfig::builder().budget_bytes(0).build().unwrap();
        assert_eq!(c.budget_bytes, None);
    }

    #[test]
    fn compression_rejects_bad_policy() {
        let err = CompressionConfig::builder()
            .search_policy(SearchPolicy {
                step: 0.0,
                ..SearchPolicy::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ImgPdfError::InvalidConfig(_)));
    }

    #[test]
    fn pdf_quality_levels() {
        assert_eq!(PdfQuality::High.jpeg_quality(), Some(0.95));
        assert_eq!(PdfQuality::Medium.jpeg_quality(), Some(0.85));
        assert_eq!(PdfQuality::Low.jpeg_quality(), Some(0.75));
        assert_eq!(PdfQuality::Lossless.jpeg_quality(), None);
        assert_eq!("MEDIUM".parse::<PdfQuality>().unwrap(), PdfQuality::Medium);
        assert!("ultra".parse::<PdfQuality>().is_err());
    }

    #[test]
    fn margin_must_leave_room() {
        assert!(ImageToPdfConfig::builder().margin_mm(20.0).build().is_ok());
        assert!(ImageToPdfConfig::builder().margin_mm(105.0).build().is_err());
        assert!(ImageToPdfConfig::builder()
            .page_size(PageSize::Points { width: 0.0, height: 10.0 })
            .build()
            .is_err());
    }

    #[test]
    fn pdf_to_image_scale_is_clamped() {
        let c = PdfToImageConfig::builder().scale(50.0).build().unwrap();
        assert_eq!(c.scale, 5.0);
        assert_eq!(c.codec, Codec::Png);
    }

    #[test]
    fn inverted_range_rejected() {
        let err = PdfToImageConfig::builder()
            .pages(PageSelection::Range(5, 2))
            .build()
            .unwrap_err();
        assert!(matches!(err, ImgPdfError::InvalidConfig(_)));
    }

    #[test]
    fn test_page_selection_resolve() {
        assert_eq!(PageSelection::All.resolve(3), vec![1, 2, 3]);
        assert_eq!(PageSelection::Single(3).resolve(5), vec![3]);
        assert_eq!(PageSelection::Single(6).resolve(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).resolve(5), vec![2, 3, 4]);
        assert_eq!(PageSelection::Range(4, 99).resolve(5), vec![4, 5]);
        assert_eq!(PageSelection::Range(0, 2).resolve(5), vec![1, 2]);
        assert_eq!(PageSelection::Set(vec![5, 1, 3, 3, 9]).resolve(5), vec![1, 3, 5]);
    }

    #[test]
    fn page_selection_parsing() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("7".parse::<PageSelection>().unwrap(), PageSelection::Single(7));
        assert_eq!("3-15".parse::<PageSelection>().unwrap(), PageSelection::Range(3, 15));
        assert_eq!(
            "1, 3,5".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!("0".parse::<PageSelection>().is_err());
        assert!("9-2".parse::<PageSelection>().is_err());
        assert!("x".parse::<PageSelection>().is_err());
    }

    #[test]
    fn batch_archive_names() {
        assert_eq!(BatchMode::Compress.archive_name(), "batch-compressed-images.zip");
        assert_eq!(
            BatchMode::ConvertFormat(Codec::WebP).archive_name(),
            "batch-converted-webp.zip"
        );
    }
}
