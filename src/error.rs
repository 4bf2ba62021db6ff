//! Error types for the edgequake-imgpdf library.
//!
//! A single fatal error type, [`ImgPdfError`], covers every operation. Batches
//! are fail-fast: the first item that cannot be decoded or encoded aborts the
//! whole run and is reported as [`ImgPdfError::ItemFailed`], wrapping the
//! underlying cause together with the item's position and name.
//!
//! Missing a byte-size budget is *not* an error. The adaptive encoder returns
//! its best effort and flags it through
//! [`crate::pipeline::encode::EncodeOutcome::budget_met`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-imgpdf library.
#[derive(Debug, Error)]
pub enum ImgPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The path exists but could not be read (a directory, an I/O error).
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file's type is not in the accepted set. Raised at ingestion,
    /// before the file ever reaches the pipeline.
    #[error("{name} is not a valid image format (detected: {detected})")]
    UnsupportedFormat { name: String, detected: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// An operation was started with nothing to process.
    #[error("Nothing to process: {0}")]
    EmptyBatch(String),

    // ── Image errors ──────────────────────────────────────────────────────
    /// The bytes could not be interpreted as an image.
    #[error("Failed to decode '{name}': {detail}")]
    Decode { name: String, detail: String },

    /// The codec rejected the raster.
    #[error("Failed to encode {codec}: {detail}")]
    Encode { codec: String, detail: String },

    /// One batch item failed; the batch was aborted at this item.
    #[error("Item {} ('{name}') failed: {source}", index + 1)]
    ItemFailed {
        index: usize,
        name: String,
        #[source]
        source: Box<ImgPdfError>,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// The page selection resolved to no pages of the document.
    #[error("No valid pages selected (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// Selected page number exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// lopdf failed while assembling or serialising a document.
    #[error("Failed to build PDF: {0}")]
    PdfBuild(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Archive creation failed.
    #[error("Failed to create archive '{name}': {detail}")]
    Archive { name: String, detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF rendering needs the pdfium shared library. You can:\n\
  • Install it system-wide (libpdfium.so / libpdfium.dylib / pdfium.dll).\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
Pre-built libraries: https://github.com/bblanchon/pdfium-binaries/releases\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImgPdfError {
    /// Wrap `self` as the failure of batch item `index`.
    pub fn at_item(self, index: usize, name: impl Into<String>) -> Self {
        ImgPdfError::ItemFailed {
            index,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any [`ImgPdfError::ItemFailed`] layer.
    pub fn root(&self) -> &ImgPdfError {
        match self {
            ImgPdfError::ItemFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
