//! Input loading: read a user-supplied local path into memory.
//!
//! Every operation works on in-memory bytes, so the only file-system contact
//! on the input side is here. Errors distinguish a missing file, a denied
//! one, and one that exists but cannot be read, and PDFs are checked for the `%PDF` magic before anything
//! tries to parse them.

use crate::error::ImgPdfError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A file read from disk.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// Final path component, used as the declared name downstream.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Read any local file.
pub async fn read_source(path: &Path) -> Result<LoadedFile, ImgPdfError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ImgPdfError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => ImgPdfError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ImgPdfError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read '{}' ({} bytes)", path.display(), bytes.len());
    Ok(LoadedFile { name, bytes })
}

/// Read a local file and verify it starts with `%PDF`.
pub async fn read_pdf(path: &Path) -> Result<LoadedFile, ImgPdfError> {
    let file = read_source(path).await?;
    check_pdf_magic(path.to_path_buf(), &file.bytes)?;
    Ok(file)
}

/// `NotAPdf` unless `bytes` begins with `%PDF`.
pub fn check_pdf_magic(path: PathBuf, bytes: &[u8]) -> Result<(), ImgPdfError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(ImgPdfError::NotAPdf { path, magic })
}
