//! PDF fixtures and fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::error::OcrError;
use crate::ocr::Recognizer;

/// One page of a generated fixture document.
pub(crate) enum FixturePage<'a> {
    /// A text-only page drawn with a base-14 font.
    Text(&'a str),
    /// A page holding a single grey raster image.
    Image { width: u32, height: u32 },
    /// A page with an empty content stream.
    Blank,
}

/// Build a PDF whose pages share a one-inch MediaBox.
pub(crate) fn build_pdf(pages: &[FixturePage<'_>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let (resources, operations) = match page {
            FixturePage::Text(text) => (
                dictionary! { "Font" => dictionary! { "F1" => font_id } },
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![4.into(), 36.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            ),
            FixturePage::Image { width, height } => {
                let pixels = vec![128u8; (*width * *height) as usize];
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => i64::from(*width),
                        "Height" => i64::from(*height),
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    pixels,
                ));
                (
                    dictionary! { "XObject" => dictionary! { "Im1" => image_id } },
                    vec![
                        Operation::new("q", vec![]),
                        Operation::new(
                            "cm",
                            vec![72.into(), 0.into(), 0.into(), 72.into(), 0.into(), 0.into()],
                        ),
                        Operation::new("Do", vec!["Im1".into()]),
                        Operation::new("Q", vec![]),
                    ],
                )
            }
            FixturePage::Blank => (dictionary! {}, vec![]),
        };

        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 72.into(), 72.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// A document with `count` scanned (image-only) pages.
pub(crate) fn scanned_pdf(count: usize) -> Vec<u8> {
    let pages: Vec<FixturePage<'_>> = (0..count)
        .map(|_| FixturePage::Image {
            width: 8,
            height: 8,
        })
        .collect();
    build_pdf(&pages)
}

/// Recognizer that replays scripted page texts in call order.
pub(crate) struct ScriptedRecognizer {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    /// Return `text` for every call.
    pub(crate) fn constant(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replay `outputs` in order, then fall back to empty text.
    pub(crate) fn scripted(outputs: Vec<Result<&str, &str>>) -> Self {
        let script = outputs
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            script: Mutex::new(script),
            fallback: String::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(OcrError::Recognition(reason)),
            None => Ok(self.fallback.clone()),
        }
    }
}
