//! Resizing: cap a raster to a bounding box, or scale it to exact dimensions.
//!
//! Size-capping never upscales: a raster already inside the box is returned
//! untouched. When it does not fit, a single uniform ratio
//! `min(max_w / w, max_h / h)` is applied to both axes so the aspect ratio is
//! preserved and the result lands inside the box.

use crate::pipeline::decode::Raster;
use image::imageops::FilterType;
use tracing::debug;

/// Resampling filter used for every resize. Catmull-Rom is close to what
/// browsers use for canvas downscaling and much cheaper than Lanczos.
const FILTER: FilterType = FilterType::CatmullRom;

/// A bounding box in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub max_width: u32,
    pub max_height: u32,
}

impl BoundingBox {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
        }
    }

    pub fn contains(&self, width: u32, height: u32) -> bool {
        width <= self.max_width && height <= self.max_height
    }
}

/// Dimensions a `width × height` raster must be scaled to so that it fits
/// `bounds`, or `None` if it already fits.
pub fn fit_dimensions(width: u32, height: u32, bounds: BoundingBox) -> Option<(u32, u32)> {
    if bounds.contains(width, height) {
        return None;
    }
    let ratio = f64::min(
        bounds.max_width as f64 / width as f64,
        bounds.max_height as f64 / height as f64,
    );
    let new_w = ((width as f64 * ratio).round() as u32).clamp(1, bounds.max_width);
    let new_h = ((height as f64 * ratio).round() as u32).clamp(1, bounds.max_height);
    Some((new_w, new_h))
}

/// Scale `raster` down to fit `bounds`, preserving aspect ratio.
pub fn resize_to_fit(raster: Raster, bounds: BoundingBox) -> Raster {
    match fit_dimensions(raster.width(), raster.height(), bounds) {
        None => raster,
        Some((w, h)) => resize_exact(raster, w, h, false),
    }
}

/// Scale `raster` to `width × height`.
///
/// With `maintain_aspect`, one target dimension is recomputed from the
/// source ratio: landscape sources keep `width` and derive the height,
/// portrait and square sources keep `height` and derive the width. Without
/// it, the target is applied as given even if that distorts the image.
pub fn resize_exact(raster: Raster, width: u32, height: u32, maintain_aspect: bool) -> Raster {
    let (mut new_w, mut new_h) = (width.max(1), height.max(1));

    if maintain_aspect {
        let ratio = raster.width() as f64 / raster.height() as f64;
        if ratio > 1.0 {
            new_h = ((new_w as f64 / ratio).round() as u32).max(1);
        } else {
            new_w = ((new_h as f64 * ratio).round() as u32).max(1);
        }
    }

    if (new_w, new_h) == raster.dimensions() {
        return raster;
    }

    debug!(
        "Resizing {}x{} → {}x{}",
        raster.width(),
        raster.height(),
        new_w,
        new_h
    );

    raster.map_image(|img| img.resize_exact(new_w, new_h, FILTER))
}
