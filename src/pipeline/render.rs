//! PDF rasterisation behind the [`PdfRenderer`] seam.
//!
//! The production backend is pdfium via `pdfium-render`. pdfium is a C++
//! library with thread-local state, so every call goes through
//! `tokio::task::spawn_blocking` (see [`count_pages`] and [`render_page`]);
//! the trait itself is synchronous.
//!
//! The library is located through `PDFIUM_LIB_PATH` when set, otherwise the
//! platform's system library search path is used.

use crate::error::ImgPdfError;
use crate::pipeline::decode::Raster;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Opens a PDF from bytes, reports its page count and rasterises pages.
///
/// Page numbers are 1-based. Implementations are blocking.
pub trait PdfRenderer: Send + Sync {
    fn page_count(&self, pdf: &[u8], password: Option<&str>) -> Result<usize, ImgPdfError>;

    /// Render page `page` (1-based) at `scale` × its natural size in points.
    fn render_page(
        &self,
        pdf: &[u8],
        page: usize,
        scale: f32,
        password: Option<&str>,
    ) -> Result<Raster, ImgPdfError>;
}

/// [`PdfRenderer`] backed by the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    library: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Locate pdfium from `PDFIUM_LIB_PATH` or the system library path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the pdfium library at `path`.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, ImgPdfError> {
        match &self.library {
            Some(path) => bind_pdfium_from_path(path),
            None => bind_pdfium(),
        }
    }
}

impl PdfRenderer for PdfiumRenderer {
    fn page_count(&self, pdf: &[u8], password: Option<&str>) -> Result<usize, ImgPdfError> {
        let pdfium = self.bind()?;
        let document = load_document(&pdfium, pdf, password)?;
        let total = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total);
        Ok(total)
    }

    fn render_page(
        &self,
        pdf: &[u8],
        page: usize,
        scale: f32,
        password: Option<&str>,
    ) -> Result<Raster, ImgPdfError> {
        let pdfium = self.bind()?;
        let document = load_document(&pdfium, pdf, password)?;
        let pages = document.pages();
        let total = pages.len() as usize;
        if page == 0 || page > total {
            return Err(ImgPdfError::PageOutOfRange { page, total });
        }

        let rasterisation_err = |detail: String| ImgPdfError::RasterisationFailed { page, detail };

        let pdf_page = pages
            .get((page - 1) as u16)
            .map_err(|e| rasterisation_err(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| rasterisation_err(format!("{:?}", e)))?;

        let raster = Raster::new(bitmap.as_image())
            .ok_or_else(|| rasterisation_err("rendered bitmap is empty".into()))?;
        debug!(
            "Rendered page {} → {}x{} px",
            page,
            raster.width(),
            raster.height()
        );
        Ok(raster)
    }
}

/// Bind to pdfium from `PDFIUM_LIB_PATH`, or the system library when unset.
pub fn bind_pdfium() -> Result<Pdfium, ImgPdfError> {
    match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(path) => bind_pdfium_from_path(Path::new(&path)),
        None => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| ImgPdfError::PdfiumBindingFailed(format!("{:?}", e))),
    }
}

/// Bind to the pdfium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, ImgPdfError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| ImgPdfError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e)))
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    pdf: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ImgPdfError> {
    pdfium
        .load_pdf_from_byte_slice(pdf, password)
        .map_err(|e| {
            let detail = format!("{:?}", e);
            if detail.contains("Password") || detail.contains("password") {
                if password.is_some() {
                    ImgPdfError::WrongPassword
                } else {
                    ImgPdfError::PasswordRequired
                }
            } else {
                ImgPdfError::CorruptPdf { detail }
            }
        })
}

/// [`PdfRenderer::page_count`] on the blocking pool.
pub async fn count_pages(
    renderer: Arc<dyn PdfRenderer>,
    pdf: Arc<[u8]>,
    password: Option<String>,
) -> Result<usize, ImgPdfError> {
    tokio::task::spawn_blocking(move || renderer.page_count(&pdf, password.as_deref()))
        .await
        .map_err(|e| ImgPdfError::Internal(format!("Page count task panicked: {}", e)))?
}

/// [`PdfRenderer::render_page`] on the blocking pool.
pub async fn render_page(
    renderer: Arc<dyn PdfRenderer>,
    pdf: Arc<[u8]>,
    page: usize,
    scale: f32,
    password: Option<String>,
) -> Result<Raster, ImgPdfError> {
    tokio::task::spawn_blocking(move || {
        renderer.render_page(&pdf, page, scale, password.as_deref())
    })
    .await
    .map_err(|e| ImgPdfError::Internal(format!("Render task panicked: {}", e)))?
}
