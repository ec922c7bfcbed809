//! Page rasterization and text-layer access using lopdf and pdf-extract.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, Rgb};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, trace};

use super::{PdfProcessor, Result, through_last_eof};
use crate::error::PdfError;

/// PDF user space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Guard against cyclic `Parent` chains.
const MAX_TREE_DEPTH: usize = 32;

/// Page access backed by lopdf.
///
/// Scanned receipts carry one raster image per page; rendering a page means
/// decoding its largest image XObject and scaling it to the requested DPI.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
    max_image_size: u32,
}

impl PdfExtractor {
    /// Create a new PDF extractor.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
            max_image_size: 2048,
        }
    }

    /// Cap the longer side of rendered pages.
    pub fn with_max_image_size(mut self, size: u32) -> Self {
        self.max_image_size = size;
        self
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("no document loaded".to_string()))
    }

    fn page_id(doc: &Document, page: u32) -> Result<ObjectId> {
        doc.get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    /// Raster images referenced by the page's XObject resources.
    fn page_images(doc: &Document, page_id: ObjectId) -> Vec<DynamicImage> {
        let mut images = Vec::new();
        let Some(Object::Dictionary(resources)) = inherited_attribute(doc, page_id, b"Resources")
        else {
            return images;
        };

        if let Ok(xobjects) = resources.get(b"XObject") {
            if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                for (name, obj_ref) in xobj_dict.iter() {
                    if let Ok((_, obj)) = doc.dereference(obj_ref) {
                        match decode_image(doc, obj) {
                            Some(img) => images.push(img),
                            None => trace!(
                                "skipping XObject {}",
                                String::from_utf8_lossy(name)
                            ),
                        }
                    }
                }
            }
        }
        images
    }

    /// Output dimensions for a page image at `dpi`, bounded by the size cap.
    fn target_size(&self, doc: &Document, page_id: ObjectId, image: &DynamicImage, dpi: u32) -> (u32, u32) {
        let (width, height) = match media_box_size(doc, page_id) {
            Some((w, h)) if dpi > 0 => (
                (w / POINTS_PER_INCH * dpi as f32).round() as u32,
                (h / POINTS_PER_INCH * dpi as f32).round() as u32,
            ),
            _ => image.dimensions(),
        };

        let longest = width.max(height);
        if self.max_image_size > 0 && longest > self.max_image_size {
            let scale = self.max_image_size as f32 / longest as f32;
            (
                ((width as f32 * scale).round() as u32).max(1),
                ((height as f32 * scale).round() as u32).max(1),
            )
        } else {
            (width, height)
        }
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let data = through_last_eof(data).unwrap_or(data);
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<Option<DynamicImage>> {
        let doc = self.document()?;
        let page_id = Self::page_id(doc, page)?;

        let largest = Self::page_images(doc, page_id)
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()));
        let Some(image) = largest else {
            debug!("Page {} has no raster content", page);
            return Ok(None);
        };

        let (width, height) = self.target_size(doc, page_id, &image, dpi);
        if width == 0 || height == 0 {
            return Err(PdfError::Render(format!("page {} has a degenerate size", page)));
        }
        if (width, height) == image.dimensions() {
            return Ok(Some(image));
        }

        trace!(
            "Scaling page {} image {}x{} -> {}x{}",
            page,
            image.width(),
            image.height(),
            width,
            height
        );
        Ok(Some(image.resize(width, height, FilterType::Lanczos3)))
    }

    fn page_texts(&self) -> Result<Vec<String>> {
        self.document()?;
        pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }
}

/// Look up a page attribute, following the `Parent` chain for inherited values.
fn inherited_attribute<'a>(doc: &'a Document, node_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = node_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return doc.dereference(value).ok().map(|(_, obj)| obj);
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Page width and height in points.
fn media_box_size(doc: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let Object::Array(bounds) = inherited_attribute(doc, page_id, b"MediaBox")? else {
        return None;
    };
    if bounds.len() != 4 {
        return None;
    }
    let values: Vec<f32> = bounds.iter().filter_map(number).collect();
    if values.len() != 4 {
        return None;
    }
    let width = (values[2] - values[0]).abs();
    let height = (values[3] - values[1]).abs();
    (width > 0.0 && height > 0.0).then_some((width, height))
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Decode an image XObject stream into pixels.
fn decode_image(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    trace!("Found image object: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                    .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let color_space: &[u8] = if image_mask {
        b"DeviceGray"
    } else {
        dict.get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB")
    };

    let bits = if image_mask {
        1
    } else {
        dict.get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8)
    };

    image_from_raw(&data, width, height, color_space, bits)
}

fn image_from_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: i64,
) -> Option<DynamicImage> {
    let pixels = width as usize * height as usize;

    match (color_space, bits_per_component) {
        (b"DeviceRGB" | b"RGB", 8) if data.len() >= pixels * 3 => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
        }
        (b"DeviceGray" | b"G", 8) if data.len() >= pixels => {
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
        }
        (b"DeviceGray" | b"G", 1) => {
            // Bilevel scans: rows are padded to whole bytes, set bits are white.
            let stride = (width as usize).div_ceil(8);
            if data.len() < stride * height as usize {
                return None;
            }
            let img = GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * stride + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                Luma([if bit == 1 { 255 } else { 0 }])
            });
            Some(DynamicImage::ImageLuma8(img))
        }
        _ => {
            trace!(
                "Could not decode image: colorspace={}, bits={}, data_len={}",
                String::from_utf8_lossy(color_space),
                bits_per_component,
                data.len()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixturePage, build_pdf, scanned_pdf};

    #[test]
    fn test_pdf_extractor_new() {
        let extractor = PdfExtractor::new();
        assert!(extractor.document.is_none());
        assert_eq!(extractor.page_count(), 0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut extractor = PdfExtractor::new();
        let err = extractor.load(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, PdfError::Parse(_)));
    }

    #[test]
    fn test_render_scales_to_dpi() {
        let mut extractor = PdfExtractor::new();
        extractor.load(&scanned_pdf(2)).unwrap();
        assert_eq!(extractor.page_count(), 2);

        // One-inch page at 50 DPI.
        let image = extractor.render_page(1, 50).unwrap().unwrap();
        assert_eq!(image.dimensions(), (50, 50));
    }

    #[test]
    fn test_load_ignores_trailing_bytes() {
        let mut data = scanned_pdf(2);
        data.extend(std::iter::repeat(b'x').take(4096));

        let mut extractor = PdfExtractor::new();
        extractor.load(&data).unwrap();
        assert_eq!(extractor.page_count(), 2);
        assert!(extractor.render_page(1, 50).unwrap().is_some());
    }

    #[test]
    fn test_render_respects_max_size() {
        let mut extractor = PdfExtractor::new().with_max_image_size(20);
        extractor.load(&scanned_pdf(1)).unwrap();

        let image = extractor.render_page(1, 300).unwrap().unwrap();
        assert_eq!(image.dimensions(), (20, 20));
    }

    #[test]
    fn test_render_page_without_images() {
        let mut extractor = PdfExtractor::new();
        extractor
            .load(&build_pdf(&[FixturePage::Text("hello")]))
            .unwrap();
        assert!(extractor.render_page(1, 300).unwrap().is_none());
    }

    #[test]
    fn test_render_invalid_page() {
        let mut extractor = PdfExtractor::new();
        extractor.load(&scanned_pdf(1)).unwrap();
        let err = extractor.render_page(3, 300).unwrap_err();
        assert!(matches!(err, PdfError::InvalidPage(3)));
    }

    #[test]
    fn test_bilevel_image_decoding() {
        // 10 pixels wide needs a two-byte stride.
        let data = [0b1000_0000, 0b0100_0000];
        let img = image_from_raw(&data, 10, 1, b"DeviceGray", 1).unwrap();
        let gray = img.to_luma8();
        assert_eq!(gray.get_pixel(0, 0).0, [255]);
        assert_eq!(gray.get_pixel(1, 0).0, [0]);
        assert_eq!(gray.get_pixel(9, 0).0, [255]);
    }
}
