//! PDF assembly: place encoded images on pages and serialise with lopdf.
//!
//! One image per page. The page is either an A4 sheet whose orientation may
//! follow the image, or a fixed size in points. The image is scaled into the
//! area inside the margin and centred.
//!
//! JPEG data is embedded verbatim (`DCTDecode`), so the quality chosen at
//! encode time is exactly what ends up in the document. Lossless pages store
//! deflated RGB samples with a separate alpha soft-mask.

use crate::error::ImgPdfError;
use crate::pipeline::decode::Raster;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

/// Millimetres → PDF points.
pub const MM_TO_PT: f32 = 2.834_645_7;

const A4_SHORT_MM: f32 = 210.0;
const A4_LONG_MM: f32 = 297.0;

/// Width/height ratio above which `Auto` picks a landscape sheet.
const AUTO_LANDSCAPE_RATIO: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    /// Landscape when the image's width/height ratio exceeds 0.7.
    #[default]
    Auto,
    Portrait,
    Landscape,
}

/// Physical page size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PageSize {
    A4(PageOrientation),
    /// Fixed size in points.
    Points { width: f32, height: f32 },
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::A4(PageOrientation::default())
    }
}

impl PageSize {
    /// Page dimensions in points for an image of the given pixel size.
    pub fn resolve(&self, img_width: u32, img_height: u32) -> (f32, f32) {
        match *self {
            PageSize::Points { width, height } => (width, height),
            PageSize::A4(orientation) => {
                let landscape = match orientation {
                    PageOrientation::Portrait => false,
                    PageOrientation::Landscape => true,
                    PageOrientation::Auto => {
                        img_width as f32 / img_height as f32 > AUTO_LANDSCAPE_RATIO
                    }
                };
                let (w, h) = if landscape {
                    (A4_LONG_MM, A4_SHORT_MM)
                } else {
                    (A4_SHORT_MM, A4_LONG_MM)
                };
                (w * MM_TO_PT, h * MM_TO_PT)
            }
        }
    }
}

/// How the image is sized inside the margin box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageScale {
    /// Uniform scale so the whole image fits.
    #[default]
    Fit,
    /// Stretch to the margin box, ignoring aspect ratio.
    Fill,
    /// One pixel per point, cropped per axis to the margin box.
    Original,
}

/// Where an image lands on its page, in points (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page_width: f32,
    pub page_height: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Compute the page and image rectangle for a `img_width × img_height` image.
pub fn place_image(
    img_width: u32,
    img_height: u32,
    page: PageSize,
    scale: ImageScale,
    margin_pt: f32,
) -> Placement {
    let (page_width, page_height) = page.resolve(img_width, img_height);
    let avail_w = (page_width - margin_pt * 2.0).max(1.0);
    let avail_h = (page_height - margin_pt * 2.0).max(1.0);
    let (iw, ih) = (img_width as f32, img_height as f32);

    let (width, height) = match scale {
        ImageScale::Fit => {
            let ratio = f32::min(avail_w / iw, avail_h / ih);
            (iw * ratio, ih * ratio)
        }
        ImageScale::Fill => (avail_w, avail_h),
        ImageScale::Original => (iw.min(avail_w), ih.min(avail_h)),
    };

    Placement {
        page_width,
        page_height,
        x: (page_width - width) / 2.0,
        y: (page_height - height) / 2.0,
        width,
        height,
    }
}

/// Incrementally builds a PDF, one image page at a time.
pub struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfAssembler {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Add a page showing a baseline JPEG of `width × height` pixels.
    pub fn add_jpeg_page(
        &mut self,
        jpeg: Vec<u8>,
        width: u32,
        height: u32,
        placement: &Placement,
    ) -> Result<(), ImgPdfError> {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        };
        let image_id = self.doc.add_object(Stream::new(dict, jpeg));
        self.add_image_page(image_id, placement)
    }

    /// Add a page showing `raster` losslessly; alpha becomes a soft mask.
    pub fn add_lossless_page(
        &mut self,
        raster: &Raster,
        placement: &Placement,
    ) -> Result<(), ImgPdfError> {
        let rgba = raster.image().to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for px in rgba.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
            alpha.push(px.0[3]);
        }

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        };

        if alpha.iter().any(|&a| a != u8::MAX) {
            let mask = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            };
            let mask_id = self.doc.add_object(Stream::new(mask, deflate(&alpha)?));
            dict.set("SMask", mask_id);
        }

        let image_id = self.doc.add_object(Stream::new(dict, deflate(&rgb)?));
        self.add_image_page(image_id, placement)
    }

    fn add_image_page(&mut self, image_id: ObjectId, p: &Placement) -> Result<(), ImgPdfError> {
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(p.width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(p.height),
                        Object::Real(p.x),
                        Object::Real(p.y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| ImgPdfError::PdfBuild(format!("content stream: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(p.page_width),
                Object::Real(p.page_height),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.page_ids.push(page_id);
        debug!(
            "Added page {} ({:.0}x{:.0} pt)",
            self.page_ids.len(),
            p.page_width,
            p.page_height
        );
        Ok(())
    }

    /// Serialise the document. Fails if no page was added.
    pub fn finish(mut self) -> Result<Vec<u8>, ImgPdfError> {
        if self.page_ids.is_empty() {
            return Err(ImgPdfError::PdfBuild("document has no pages".into()));
        }

        let kids: Vec<Object> = self.page_ids.iter().map(|&id| Object::Reference(id)).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.page_ids.len() as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| ImgPdfError::PdfBuild(format!("serialise: {e}")))?;
        Ok(out)
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ImgPdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ImgPdfError::PdfBuild(format!("deflate: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::{Codec, CodecEncoder, RasterEncoder};
    use image::{DynamicImage, Rgba, RgbaImage};

    fn raster(w: u32, h: u32, alpha: u8) -> Raster {
        Raster::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 30, 30, alpha])))).unwrap()
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn auto_orientation_threshold() {
        // 0.7 exactly stays portrait; anything wider goes landscape.
        let (w, h) = PageSize::A4(PageOrientation::Auto).resolve(700, 1000);
        assert!(w < h);
        let (w, h) = PageSize::A4(PageOrientation::Auto).resolve(800, 1000);
        assert!(w > h);
    }

    #[test]
    fn a4_portrait_in_points() {
        let (w, h) = PageSize::A4(PageOrientation::Portrait).resolve(5000, 100);
        assert!(approx(w, 595.28), "{w}");
        assert!(approx(h, 841.89), "{h}");
    }

    #[test]
    fn fit_is_centred_and_uniform() {
        let page = PageSize::Points { width: 595.0, height: 842.0 };
        let p = place_image(1000, 500, page, ImageScale::Fit, 20.0);
        assert!(approx(p.width, 555.0));
        assert!(approx(p.height, 277.5));
        assert!(approx(p.x, 20.0));
        assert!(approx(p.y, (842.0 - 277.5) / 2.0));
    }

    #[test]
    fn fill_stretches_to_margin_box() {
        let page = PageSize::Points { width: 200.0, height: 100.0 };
        let p = place_image(10, 10, page, ImageScale::Fill, 10.0);
        assert!(approx(p.width, 180.0) && approx(p.height, 80.0));
        assert!(approx(p.x, 10.0) && approx(p.y, 10.0));
    }

    #[test]
    fn original_clamps_per_axis() {
        let page = PageSize::Points { width: 200.0, height: 100.0 };
        let p = place_image(50, 500, page, ImageScale::Original, 0.0);
        assert!(approx(p.width, 50.0) && approx(p.height, 100.0));
    }

    #[test]
    fn assembles_loadable_document() {
        let r = raster(40, 20, 255);
        let jpeg = CodecEncoder.encode(&r, Codec::Jpeg, 0.85).unwrap();
        let mut pdf = PdfAssembler::new();
        let place = place_image(40, 20, PageSize::default(), ImageScale::Fit, 0.0);
        pdf.add_jpeg_page(jpeg, 40, 20, &place).unwrap();
        pdf.add_lossless_page(&raster(10, 30, 128), &place_image(10, 30, PageSize::default(), ImageScale::Fit, 0.0))
            .unwrap();
        assert_eq!(pdf.page_count(), 2);

        let bytes = pdf.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(PdfAssembler::new().finish(), Err(ImgPdfError::PdfBuild(_))));
    }
}
