// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open documents, read each page's native text layer, and
// rasterize pages for recognition using the `lopdf` crate.

use std::path::Path;

use image::{GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use lektor_core::error::LektorError;
use tracing::{debug, info, instrument, warn};

/// Read-only view of a PDF document, page by page.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem. Unreadable or unparsable files are
    /// input errors.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LektorError> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            LektorError::Input(format!("failed to open PDF {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self { document })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, LektorError> {
        let document = Document::load_mem(data)
            .map_err(|err| LektorError::Input(format!("failed to parse PDF: {}", err)))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// 1-based page numbers in document order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.document.get_pages().keys().copied().collect()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId, LektorError> {
        self.document
            .get_pages()
            .get(&page_number)
            .copied()
            .ok_or_else(|| {
                LektorError::PdfError(format!(
                    "page {} out of range (document has {} pages)",
                    page_number,
                    self.page_count()
                ))
            })
    }

    // -- Text layer -----------------------------------------------------------

    /// The page's embedded text, or `None` when the page has no text layer or
    /// only whitespace in it.
    #[instrument(skip(self))]
    pub fn native_text(&self, page_number: u32) -> Option<String> {
        match self.document.extract_text(&[page_number]) {
            Ok(text) if !lektor_core::is_blank(&text) => Some(text),
            Ok(_) => None,
            Err(err) => {
                debug!(page_number, error = %err, "No readable text layer");
                None
            }
        }
    }
}

// -- Rasterization ------------------------------------------------------------

/// Turns a PDF page into a grayscale image for recognition.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, reader: &PdfReader, page_number: u32) -> Result<GrayImage, LektorError>;
}

/// Rasterizes scanned pages by decoding the largest image drawn on them.
///
/// Handles DCT (JPEG) and JPX payloads through the `image` decoder, and raw or
/// Flate-compressed 8-bit Gray, RGB, and CMYK samples. Pages without an image
/// XObject cannot be rasterized this way and yield an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedImageRasterizer;

impl PageRasterizer for EmbeddedImageRasterizer {
    #[instrument(skip(self, reader))]
    fn rasterize(&self, reader: &PdfReader, page_number: u32) -> Result<GrayImage, LektorError> {
        let doc = reader.document();
        let page_id = reader.page_id(page_number)?;

        let images = page_images(doc, page_id)?;
        let largest = images
            .into_iter()
            .max_by_key(|stream| {
                let width = dict_int(&stream.dict, b"Width").unwrap_or(0);
                let height = dict_int(&stream.dict, b"Height").unwrap_or(0);
                width.saturating_mul(height)
            })
            .ok_or_else(|| {
                LektorError::PdfError(format!("page {} has no embedded image", page_number))
            })?;

        let gray = decode_image_stream(doc, largest)?;
        debug!(
            page_number,
            width = gray.width(),
            height = gray.height(),
            "Page rasterized from embedded image"
        );
        Ok(gray)
    }
}

/// Follow a reference to the object it names; other objects pass through.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn dict_int(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|obj| obj.as_i64().ok())
}

/// Image XObjects reachable from a page's resources, including resources
/// inherited from ancestor page-tree nodes.
fn page_images(doc: &Document, page_id: ObjectId) -> Result<Vec<&Stream>, LektorError> {
    let mut node = doc
        .get_dictionary(page_id)
        .map_err(|err| LektorError::PdfError(format!("page object unreadable: {}", err)))?;

    // Nearest node that defines /Resources wins.
    let mut resources: Option<&Dictionary> = None;
    for _ in 0..32 {
        if let Ok(res) = node.get(b"Resources") {
            resources = resolve(doc, res).as_dict().ok();
            break;
        }
        match node.get(b"Parent").ok().map(|p| resolve(doc, p)) {
            Some(Object::Dictionary(parent)) => node = parent,
            _ => break,
        }
    }

    let Some(xobjects) = resources
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x).as_dict().ok())
    else {
        return Ok(Vec::new());
    };

    let images = xobjects
        .iter()
        .filter_map(|(_, obj)| match resolve(doc, obj) {
            Object::Stream(stream) => Some(stream),
            _ => None,
        })
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .is_ok_and(|name| name == b"Image")
        })
        .collect();
    Ok(images)
}

fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Number of colour components declared by an image's /ColorSpace.
fn color_components(doc: &Document, stream: &Stream) -> Result<u32, LektorError> {
    let space = stream
        .dict
        .get(b"ColorSpace")
        .map(|cs| resolve(doc, cs))
        .map_err(|_| LektorError::PdfError("image has no colour space".to_string()))?;

    let name = match space {
        Object::Name(name) => name.as_slice(),
        Object::Array(items) => {
            let family = items.first().and_then(|f| f.as_name().ok()).unwrap_or(b"".as_slice());
            if family == b"ICCBased" {
                let n = items
                    .get(1)
                    .map(|profile| resolve(doc, profile))
                    .and_then(|profile| profile.as_stream().ok())
                    .and_then(|profile| dict_int(&profile.dict, b"N"));
                return match n {
                    Some(n @ (1 | 3 | 4)) => Ok(n as u32),
                    _ => Err(LektorError::PdfError(
                        "unsupported ICC profile component count".to_string(),
                    )),
                };
            }
            family
        }
        _ => b"".as_slice(),
    };

    match name {
        b"DeviceGray" | b"CalGray" => Ok(1),
        b"DeviceRGB" | b"CalRGB" => Ok(3),
        b"DeviceCMYK" => Ok(4),
        other => Err(LektorError::PdfError(format!(
            "unsupported colour space {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn decode_image_stream(doc: &Document, stream: &Stream) -> Result<GrayImage, LektorError> {
    let filters = stream_filters(stream);

    if filters
        .last()
        .is_some_and(|f| f == b"DCTDecode" || f == b"JPXDecode")
    {
        let decoded = image::load_from_memory(&stream.content)
            .map_err(|err| LektorError::ImageError(format!("embedded image: {}", err)))?;
        return Ok(decoded.to_luma8());
    }

    if filters.iter().any(|f| f != b"FlateDecode") {
        warn!(
            filters = ?filters.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect::<Vec<_>>(),
            "Unsupported image filter chain"
        );
        return Err(LektorError::PdfError("unsupported image filter".to_string()));
    }

    let width = dict_int(&stream.dict, b"Width").unwrap_or(0);
    let height = dict_int(&stream.dict, b"Height").unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(LektorError::PdfError("image has no dimensions".to_string()));
    }
    let (width, height) = (width as u32, height as u32);

    let bits = dict_int(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(LektorError::PdfError(format!(
            "unsupported bit depth {}",
            bits
        )));
    }

    let components = color_components(doc, stream)?;
    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|err| LektorError::PdfError(format!("image decompression: {}", err)))?
    };

    let expected = width as usize * height as usize * components as usize;
    if samples.len() < expected {
        return Err(LektorError::PdfError(format!(
            "image data truncated: {} of {} bytes",
            samples.len(),
            expected
        )));
    }
    let samples = &samples[..expected];

    let gray = match components {
        1 => GrayImage::from_raw(width, height, samples.to_vec()),
        3 => RgbImage::from_raw(width, height, samples.to_vec())
            .map(|rgb| image::DynamicImage::ImageRgb8(rgb).to_luma8()),
        _ => {
            let rgb: Vec<u8> = samples
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 1.0 - cmyk[3] as f32 / 255.0;
                    let channel = |c: u8| (255.0 * (1.0 - c as f32 / 255.0) * k).round() as u8;
                    [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
                })
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(|rgb| image::DynamicImage::ImageRgb8(rgb).to_luma8())
        }
    };

    gray.ok_or_else(|| LektorError::PdfError("image buffer size mismatch".to_string()))
}
