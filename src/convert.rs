//! Operation entry points: compress, image → PDF, PDF → images, batch, and
//! PDF inspection.
//!
//! Every operation takes its input already in memory, runs through a
//! [`BatchOrchestrator`], and returns its outputs without writing anything.
//! Delivery is a separate step ([`crate::pipeline::package::Packager`]), so
//! the caller decides between a directory, an archive, or memory.

use crate::batch::{self, BatchOrchestrator, EncodeTemplate};
use crate::collection::SourceImage;
use crate::config::{
    BatchConfig, BatchMode, CompressionConfig, ImageToPdfConfig, PdfQuality, PdfToImageConfig,
};
use crate::error::ImgPdfError;
use crate::output::{
    sanitize_filename, strip_extension, unique_filenames, BatchResult, CompressedItem, CompressionReport,
    EncodedOutput,
};
use crate::pipeline::assemble::{
    place_image, ImageScale, PageSize, PdfAssembler, Placement, MM_TO_PT,
};
use crate::pipeline::encode::{Codec, EncodeRequest, RasterEncoder, SearchPolicy};
use crate::pipeline::render::{self, PdfRenderer};
use crate::pipeline::resize::BoundingBox;
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Archive name for [`compress_images`] output.
pub const COMPRESS_ARCHIVE_NAME: &str = "compressed-images.zip";
/// Archive name for [`pdf_to_images`] output.
pub const PDF_IMAGES_ARCHIVE_NAME: &str = "converted-pdf-images.zip";

/// Page layout used by [`BatchMode::ConvertToPdf`].
const BATCH_PAGE: PageSize = PageSize::Points {
    width: 595.0,
    height: 842.0,
};
const BATCH_MARGIN_PT: f32 = 20.0;

/// Compress every image: decode, cap to the configured box, encode with
/// adaptive search.
///
/// Outputs are named `<stem>-compressed.<ext>` and keep input order.
///
/// # Errors
/// `EmptyBatch` with no images; otherwise the first failing image aborts the
/// run as `ItemFailed`. A missed size budget is not an error.
pub async fn compress_images(
    images: &[SourceImage],
    config: &CompressionConfig,
) -> Result<CompressionReport, ImgPdfError> {
    let template = EncodeTemplate {
        request: EncodeRequest {
            codec: config.codec,
            quality: config.quality,
            budget_bytes: config.budget_bytes,
        },
        bounds: Some(config.max_dimensions),
        policy: config.search,
    };
    let ext = config.codec.extension();

    let items = encode_all(
        images,
        config.encoder(),
        config.callback(),
        template,
        |i, n| format!("Compressing {i}/{n}..."),
        |source| format!("{}-compressed.{}", strip_extension(source.name()), ext),
    )
    .await?;

    let (items, outputs): (Vec<_>, Vec<_>) = items.into_iter().unzip();
    let report = CompressionReport {
        items,
        result: BatchResult { outputs },
    };
    info!(
        "Compressed {} image(s): {} → {} bytes (saved {}%)",
        report.items.len(),
        report.original_total(),
        report.compressed_total(),
        report.savings_percent()
    );
    Ok(report)
}

/// Combine the images into one PDF, one image per page, in input order.
///
/// The output is named `<sanitised config.filename>.pdf`.
pub async fn images_to_pdf(
    images: &[SourceImage],
    config: &ImageToPdfConfig,
) -> Result<EncodedOutput, ImgPdfError> {
    let layout = PageLayout {
        page: config.page_size,
        scale: config.scale,
        margin_pt: config.margin_mm * MM_TO_PT,
        quality: config.quality,
    };
    let filename = format!("{}.pdf", sanitize_filename(&config.filename));
    build_pdf(images, layout, config.encoder(), config.callback(), filename).await
}

/// Render the selected pages of `pdf` to images.
///
/// Pages are named `page-<n>.<ext>`. PNG keeps the rendered pixels as-is;
/// JPEG and WebP are re-encoded at [`Codec::conversion_quality`].
///
/// # Errors
/// `NoPagesSelected` when the selection matches no page of the document;
/// password and corruption errors from the renderer; `ItemFailed` for the
/// first page that cannot be rendered or encoded.
pub async fn pdf_to_images(
    pdf: &[u8],
    config: &PdfToImageConfig,
) -> Result<BatchResult, ImgPdfError> {
    let renderer = config.renderer();
    let encoder = config.encoder();
    let pdf: Arc<[u8]> = Arc::from(pdf);

    let total = render::count_pages(renderer.clone(), pdf.clone(), config.password.clone()).await?;
    let pages = config.pages.resolve(total);
    if pages.is_empty() {
        return Err(ImgPdfError::NoPagesSelected { total });
    }
    debug!("Selected {} of {} pages", pages.len(), total);

    let codec = config.codec;
    let scale = config.scale;
    let last_page = pages.iter().copied().max().unwrap_or(total);
    let mut orchestrator = BatchOrchestrator::new(config.callback());

    let outputs = orchestrator
        .run(
            &pages,
            |i, _| format!("Converting page {}/{}...", pages[i - 1], last_page),
            |page| format!("page {page}"),
            |_, &page| {
                let renderer = renderer.clone();
                let encoder = encoder.clone();
                let pdf = pdf.clone();
                let password = config.password.clone();
                async move {
                    let raster = render::render_page(renderer, pdf, page, scale, password).await?;
                    let bytes = tokio::task::spawn_blocking(move || {
                        encoder.encode(&raster, codec, codec.conversion_quality())
                    })
                    .await
                    .map_err(|e| ImgPdfError::Internal(format!("Encode task panicked: {}", e)))??;
                    let output =
                        EncodedOutput::new(format!("page-{}.{}", page, codec.extension()), bytes);
                    let len = output.byte_len;
                    Ok((output, len))
                }
            },
        )
        .await?;

    Ok(BatchResult { outputs })
}

/// Run one of the fixed batch presets over the images.
///
/// * `ConvertToPdf` → one PDF named `batch-converted-<unix millis>.pdf`.
/// * `Compress` → `<stem>-compressed.jpg` per image.
/// * `ConvertFormat(codec)` → `<stem>.<ext>` per image, no resizing.
///
/// Presets do not ask before bundling: package several outputs with
/// [`crate::AlwaysYes`] under [`BatchMode::archive_name`].
pub async fn batch_process(
    images: &[SourceImage],
    config: &BatchConfig,
) -> Result<BatchResult, ImgPdfError> {
    if images.is_empty() {
        return Err(ImgPdfError::EmptyBatch("no images selected".into()));
    }
    let encoder = config.encoder();
    let callback = config.callback();
    info!("Batch {:?} over {} image(s)", config.mode, images.len());

    match config.mode {
        BatchMode::ConvertToPdf => {
            // Medium is JPEG 0.85.
            let layout = PageLayout {
                page: BATCH_PAGE,
                scale: ImageScale::Fit,
                margin_pt: BATCH_MARGIN_PT,
                quality: PdfQuality::Medium,
            };
            let filename = format!("batch-converted-{}.pdf", unix_millis());
            let pdf = build_pdf(images, layout, encoder, callback, filename).await?;
            Ok(BatchResult { outputs: vec![pdf] })
        }
        BatchMode::Compress => {
            let template = EncodeTemplate {
                request: EncodeRequest::new(Codec::Jpeg, 0.8),
                bounds: Some(BoundingBox::new(2000, 2000)),
                policy: SearchPolicy::default(),
            };
            let items = encode_all(
                images,
                encoder,
                callback,
                template,
                |i, n| format!("Compressing {i}/{n}..."),
                |source| format!("{}-compressed.jpg", strip_extension(source.name())),
            )
            .await?;
            Ok(BatchResult {
                outputs: items.into_iter().map(|(_, output)| output).collect(),
            })
        }
        BatchMode::ConvertFormat(codec) => {
            let template = EncodeTemplate {
                request: EncodeRequest::new(codec, codec.conversion_quality()),
                bounds: None,
                policy: SearchPolicy::default(),
            };
            let ext = codec.extension();
            let items = encode_all(
                images,
                encoder,
                callback,
                template,
                |i, n| format!("Converting {i}/{n}..."),
                |source| format!("{}.{}", strip_extension(source.name()), ext),
            )
            .await?;
            Ok(BatchResult {
                outputs: items.into_iter().map(|(_, output)| output).collect(),
            })
        }
    }
}

/// Basic facts about a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfInfo {
    pub page_count: usize,
    pub byte_len: u64,
}

/// Open `pdf` and report its page count without rendering anything.
pub async fn inspect_pdf(
    pdf: &[u8],
    renderer: Arc<dyn PdfRenderer>,
    password: Option<&str>,
) -> Result<PdfInfo, ImgPdfError> {
    let byte_len = pdf.len() as u64;
    let page_count =
        render::count_pages(renderer, Arc::from(pdf), password.map(str::to_string)).await?;
    Ok(PdfInfo {
        page_count,
        byte_len,
    })
}

/// Synchronous wrapper around [`compress_images`].
///
/// Creates a temporary tokio runtime internally.
pub fn compress_images_sync(
    images: &[SourceImage],
    config: &CompressionConfig,
) -> Result<CompressionReport, ImgPdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ImgPdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compress_images(images, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PageLayout {
    page: PageSize,
    scale: ImageScale,
    margin_pt: f32,
    quality: PdfQuality,
}

/// An image ready to be placed on a page.
enum PageImage {
    Jpeg {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    },
    Lossless(crate::pipeline::decode::Raster),
}

struct PdfPage {
    image: PageImage,
    placement: Placement,
}

/// Encode every image through [`batch::encode_item`], pairing each output
/// with its size accounting. Inputs that share a stem get numbered output
/// names so every output can be delivered side by side.
async fn encode_all<S, N>(
    images: &[SourceImage],
    encoder: Arc<dyn RasterEncoder>,
    callback: ProgressCallback,
    template: EncodeTemplate,
    status: S,
    output_name: N,
) -> Result<Vec<(CompressedItem, EncodedOutput)>, ImgPdfError>
where
    S: Fn(usize, usize) -> String,
    N: Fn(&SourceImage) -> String,
{
    let mut orchestrator = BatchOrchestrator::new(callback);
    let items = orchestrator
        .run(
            images,
            status,
            |source| source.name().to_string(),
            |_, source| {
                let encoder = encoder.clone();
                let source = source.clone();
                let filename = output_name(&source);
                async move {
                    let encoded = batch::encode_item(encoder, &source, template).await?;
                    let output = EncodedOutput::new(filename, encoded.outcome.bytes);
                    let item = CompressedItem {
                        source_name: source.name().to_string(),
                        output_name: output.filename.clone(),
                        original_bytes: source.byte_len(),
                        compressed_bytes: output.byte_len,
                        quality: encoded.outcome.quality,
                        passes: encoded.outcome.passes,
                        budget_met: encoded.outcome.budget_met,
                    };
                    let len = output.byte_len;
                    Ok(((item, output), len))
                }
            },
        )
        .await?;

    let names = unique_filenames(items.iter().map(|(_, output)| output.filename.as_str()));
    Ok(items
        .into_iter()
        .zip(names)
        .map(|((mut item, mut output), name)| {
            if name != output.filename {
                debug!("Renamed duplicate output '{}' to '{}'", output.filename, name);
            }
            item.output_name.clone_from(&name);
            output.filename = name;
            (item, output)
        })
        .collect())
}

/// Decode and lay out each image, then assemble them into one document.
async fn build_pdf(
    images: &[SourceImage],
    layout: PageLayout,
    encoder: Arc<dyn RasterEncoder>,
    callback: ProgressCallback,
    filename: String,
) -> Result<EncodedOutput, ImgPdfError> {
    let mut orchestrator = BatchOrchestrator::new(callback);
    let pages = orchestrator
        .run(
            images,
            |i, n| format!("Processing image {i}/{n}..."),
            |source| source.name().to_string(),
            |_, source| {
                let encoder = encoder.clone();
                let name = source.name().to_string();
                let bytes = source.shared_bytes();
                async move {
                    tokio::task::spawn_blocking(move || {
                        prepare_page(&name, &bytes, layout, encoder.as_ref())
                    })
                    .await
                    .map_err(|e| ImgPdfError::Internal(format!("Page task panicked: {}", e)))?
                }
            },
        )
        .await?;

    let pdf = tokio::task::spawn_blocking(move || {
        let mut assembler = PdfAssembler::new();
        for page in pages {
            match page.image {
                PageImage::Jpeg {
                    bytes,
                    width,
                    height,
                } => assembler.add_jpeg_page(bytes, width, height, &page.placement)?,
                PageImage::Lossless(raster) => {
                    assembler.add_lossless_page(&raster, &page.placement)?
                }
            }
        }
        assembler.finish()
    })
    .await
    .map_err(|e| ImgPdfError::Internal(format!("PDF task panicked: {}", e)))??;

    info!("Built '{}' ({} bytes)", filename, pdf.len());
    Ok(EncodedOutput::new(filename, pdf))
}

fn prepare_page(
    name: &str,
    bytes: &[u8],
    layout: PageLayout,
    encoder: &dyn RasterEncoder,
) -> Result<(PdfPage, u64), ImgPdfError> {
    let raster = batch::decode_and_fit(name, bytes, None)?;
    let (width, height) = raster.dimensions();
    let placement = place_image(width, height, layout.page, layout.scale, layout.margin_pt);

    let (image, len) = match layout.quality.jpeg_quality() {
        Some(q) => {
            let jpeg = encoder.encode(&raster, Codec::Jpeg, q)?;
            let len = jpeg.len() as u64;
            (
                PageImage::Jpeg {
                    bytes: jpeg,
                    width,
                    height,
                },
                len,
            )
        }
        None => {
            let len = u64::from(width) * u64::from(height) * 4;
            (PageImage::Lossless(raster), len)
        }
    };
    Ok((PdfPage { image, placement }, len))
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
