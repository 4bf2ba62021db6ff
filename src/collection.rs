//! Ingestion: the ordered set of images an operation will process.
//!
//! Files are type-checked when they are added, never later. The content type
//! is sniffed from the magic bytes with `infer`; when the signature is not
//! recognised the file extension decides. Anything outside
//! [`ACCEPTED_MIME_TYPES`] is rejected with
//! [`ImgPdfError::UnsupportedFormat`] and never reaches the pipeline, while
//! the other files in the same [`ImageCollection::add_all`] call still go in.

use crate::confirm::Confirm;
use crate::error::ImgPdfError;
use crate::pipeline::decode::probe_dimensions;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Content types the pipeline accepts as input.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
];

/// Stable identity of a [`SourceImage`] within its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An accepted input image. Immutable once created; clones share the bytes.
#[derive(Debug, Clone)]
pub struct SourceImage {
    id: ImageId,
    name: String,
    mime_type: &'static str,
    bytes: Arc<[u8]>,
    dimensions: Option<(u32, u32)>,
}

impl SourceImage {
    pub fn id(&self) -> ImageId {
        self.id
    }

    /// File name as supplied by the user.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Pixel dimensions read from the header, if it could be parsed.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }
}

/// Owned, ordered collection of [`SourceImage`]s.
#[derive(Debug, Default)]
pub struct ImageCollection {
    images: Vec<SourceImage>,
    next_id: u64,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append one file.
    pub fn add(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<ImageId, ImgPdfError> {
        let name = name.into();
        let mime_type = detect_mime(&name, &bytes)?;

        let id = ImageId(self.next_id);
        self.next_id += 1;

        let dimensions = probe_dimensions(&bytes);
        debug!(
            "Accepted {} '{}' as {} ({} bytes, {:?})",
            id,
            name,
            mime_type,
            bytes.len(),
            dimensions
        );

        self.images.push(SourceImage {
            id,
            name,
            mime_type,
            bytes: Arc::from(bytes),
            dimensions,
        });
        Ok(id)
    }

    /// Add every file, keeping the valid ones. Returns the rejections.
    pub fn add_all<I, S>(&mut self, files: I) -> Vec<ImgPdfError>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        let mut rejected = Vec::new();
        for (name, bytes) in files {
            if let Err(e) = self.add(name, bytes) {
                warn!("{}", e);
                rejected.push(e);
            }
        }
        rejected
    }

    /// Remove an image. Returns it if it was present.
    pub fn remove(&mut self, id: ImageId) -> Option<SourceImage> {
        let pos = self.position(id)?;
        Some(self.images.remove(pos))
    }

    /// Move an image to `index`, shifting the others. `index` is clamped to
    /// the last position. Returns `false` if `id` is unknown.
    pub fn move_to(&mut self, id: ImageId, index: usize) -> bool {
        let Some(from) = self.position(id) else {
            return false;
        };
        let image = self.images.remove(from);
        let to = index.min(self.images.len());
        self.images.insert(to, image);
        true
    }

    /// Remove everything, if `confirm` agrees. Returns whether it cleared.
    pub fn clear(&mut self, confirm: &dyn Confirm) -> bool {
        if self.images.is_empty() {
            return true;
        }
        let question = format!("Clear all {} images?", self.images.len());
        if !confirm.confirm(&question) {
            return false;
        }
        info!("Cleared {} images", self.images.len());
        self.images.clear();
        true
    }

    pub fn get(&self, id: ImageId) -> Option<&SourceImage> {
        self.images.iter().find(|img| img.id == id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceImage> {
        self.images.iter()
    }

    pub fn as_slice(&self) -> &[SourceImage] {
        &self.images
    }

    pub fn total_bytes(&self) -> u64 {
        self.images.iter().map(SourceImage::byte_len).sum()
    }

    fn position(&self, id: ImageId) -> Option<usize> {
        self.images.iter().position(|img| img.id == id)
    }
}

impl<'a> IntoIterator for &'a ImageCollection {
    type Item = &'a SourceImage;
    type IntoIter = std::slice::Iter<'a, SourceImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

/// Accepted MIME type for a file, from its signature or else its extension.
fn detect_mime(name: &str, bytes: &[u8]) -> Result<&'static str, ImgPdfError> {
    let detected = match infer::get(bytes) {
        Some(kind) => kind.mime_type(),
        None => mime_from_extension(name),
    };

    ACCEPTED_MIME_TYPES
        .iter()
        .find(|&&accepted| accepted == detected)
        .copied()
        .ok_or_else(|| ImgPdfError::UnsupportedFormat {
            name: name.to_string(),
            detected: detected.to_string(),
        })
}

fn mime_from_extension(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
