//! # edgequake-imgpdf
//!
//! Convert images to PDF, render PDF pages to images, and batch-compress
//! images to a size budget.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Ingest    sniff content type, reject non-images, keep order
//!  ├─ 2. Decode    bytes → raster (CPU-bound, spawn_blocking)
//!  ├─ 3. Resize    fit inside max dimensions, never upscale
//!  ├─ 4. Encode    JPEG / PNG / WebP; step quality down to meet a budget
//!  ├─ 5. Assemble  one image per page into a PDF (lopdf), or
//!  │   Render      PDF pages → raster via pdfium
//!  └─ 6. Package   individual files, or one zip / tar.gz archive
//! ```
//!
//! Items in a batch are processed strictly one after another. The first
//! failure aborts the run and is reported with the failing item's index and
//! name; nothing is delivered from a failed run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_imgpdf::{compress_images, CompressionConfig, ImageCollection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut images = ImageCollection::new();
//!     images.add("photo.jpg", std::fs::read("photo.jpg")?)?;
//!
//!     let config = CompressionConfig::builder()
//!         .quality(0.8)
//!         .budget_kb(200)
//!         .build()?;
//!     let report = compress_images(images.as_slice(), &config).await?;
//!     eprintln!("saved {}%", report.savings_percent());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-imgpdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Native dependency
//!
//! Only PDF → image needs pdfium. Set `PDFIUM_LIB_PATH` to the shared
//! library, or install it where the system loader finds it. Building PDFs
//! and everything else is pure Rust.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod collection;
pub mod config;
pub mod confirm;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use collection::{ImageCollection, ImageId, SourceImage, ACCEPTED_MIME_TYPES};
pub use config::{
    BatchConfig, BatchConfigBuilder, BatchMode, CompressionConfig, CompressionConfigBuilder,
    ImageToPdfConfig, ImageToPdfConfigBuilder, PageSelection, PdfQuality, PdfToImageConfig,
    PdfToImageConfigBuilder,
};
pub use confirm::{AlwaysNo, AlwaysYes, Confirm};
pub use convert::{
    batch_process, compress_images, compress_images_sync, images_to_pdf, inspect_pdf,
    pdf_to_images, PdfInfo, COMPRESS_ARCHIVE_NAME, PDF_IMAGES_ARCHIVE_NAME,
};
pub use error::ImgPdfError;
pub use output::{
    format_file_size, BatchResult, CompressedItem, CompressionReport, EncodedOutput,
};
pub use pipeline::assemble::{ImageScale, PageOrientation, PageSize};
pub use pipeline::encode::{Codec, CodecEncoder, RasterEncoder, SearchPolicy};
pub use pipeline::package::{
    ArchiveFormat, DirectorySink, MemorySink, OutputSink, PackageReport, Packager,
};
pub use pipeline::render::{PdfRenderer, PdfiumRenderer};
pub use pipeline::resize::BoundingBox;
pub use progress::{
    BatchProgressCallback, BatchState, NoopProgressCallback, ProgressCallback, ProgressUpdate,
};
