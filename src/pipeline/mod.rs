//! Pipeline stages for image and PDF conversion.
//!
//! Each submodule implements one transformation step and knows nothing
//! about batches or progress; [`crate::batch`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//!              ┌──▶ resize ──▶ encode ──────────────┐
//! decode ──────┤                                     ├──▶ package
//! (bytes)      └──▶ encode / raw ──▶ assemble (PDF) ─┘   (dir / zip / tar.gz)
//!
//! input ──▶ render (pdfium) ──▶ encode ──▶ package
//! (.pdf)
//! ```
//!
//! 1. [`input`]    read files from disk; check the PDF signature
//! 2. [`decode`]   bytes → [`decode::Raster`]
//! 3. [`resize`]   fit inside a bounding box, never upscaling
//! 4. [`encode`]   raster → JPEG / PNG / WebP, with adaptive quality search
//! 5. [`assemble`] page layout and PDF construction with lopdf
//! 6. [`render`]   rasterise PDF pages via pdfium in `spawn_blocking`
//! 7. [`package`]  deliver outputs individually or as one archive

pub mod assemble;
pub mod decode;
pub mod encode;
pub mod input;
pub mod package;
pub mod render;
pub mod resize;
