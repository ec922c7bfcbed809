//! Page text recognition: engines and the per-document text extractor.

mod engine;
mod extractor;
#[cfg(feature = "native")]
mod pure_engine;
mod tesseract;

pub use engine::create_recognizer;
pub use extractor::{PageText, TextExtractor, TextSource};
#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;
pub use tesseract::TesseractEngine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// A recognition engine turning one page image into text.
///
/// Implementations must be shareable across worker threads.
pub trait Recognizer: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognize the text on `image`, lines separated by `\n`.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// A recognized line fragment with its quadrilateral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Bounding box coordinates (x1, y1, x2, y2, x3, y3, x4, y4).
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence score (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    /// Get the axis-aligned bounding rectangle.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }
}

/// Join boxes top-to-bottom, left-to-right.
///
/// Boxes whose tops fall in the same 20px band share a row; a row's boxes
/// are joined with a space so receipt columns stay on one line.
pub fn reading_order_text(mut boxes: Vec<TextBox>) -> String {
    boxes.sort_by(|a, b| {
        let (ax, ay, _, _) = a.rect();
        let (bx, by, _, _) = b.rect();
        let row_a = (ay / 20.0) as i32;
        let row_b = (by / 20.0) as i32;
        row_a
            .cmp(&row_b)
            .then(ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut current_row = None;
    for b in boxes.iter().filter(|b| !b.text.trim().is_empty()) {
        let row = (b.rect().1 / 20.0) as i32;
        match lines.last_mut() {
            Some(line) if current_row == Some(row) => {
                line.push(' ');
                line.push_str(b.text.trim());
            }
            _ => lines.push(b.text.trim().to_string()),
        }
        current_row = Some(row);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_box(text: &str, x: f32, y: f32) -> TextBox {
        TextBox {
            bbox: [x, y, x + 50.0, y, x + 50.0, y + 10.0, x, y + 10.0],
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_reading_order_groups_rows() {
        let boxes = vec![
            text_box("4.50", 300.0, 62.0),
            text_box("TOTAL", 10.0, 100.0),
            text_box("MILK", 10.0, 60.0),
            text_box("ACME MART", 10.0, 5.0),
        ];
        assert_eq!(reading_order_text(boxes), "ACME MART\nMILK 4.50\nTOTAL");
    }

    #[test]
    fn test_reading_order_skips_blank_boxes() {
        let boxes = vec![text_box("  ", 0.0, 0.0), text_box("A", 0.0, 40.0)];
        assert_eq!(reading_order_text(boxes), "A");
    }
}
