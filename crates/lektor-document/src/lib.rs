// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lektor-document: Page-level processing for the Lektor extraction pipeline.
//
// Provides image quality assessment, tiered enhancement, deskew, pluggable
// character-recognition backends, PDF text-layer reading and rasterization,
// and confidence aggregation across pages.

pub mod image;
pub mod pdf;
pub mod recognition;
pub mod scan;

// Re-export the primary structs so callers can use `lektor_document::Deskewer` etc.
pub use image::processor::ImageProcessor;
pub use pdf::reader::{EmbeddedImageRasterizer, PageRasterizer, PdfReader};
pub use recognition::{PdfExtraction, RecognitionAggregator};
pub use scan::backend::{RecognitionBackend, UnavailableBackend};
pub use scan::deskew::{DeskewOutcome, Deskewer};
pub use scan::enhance::ScanEnhancer;
pub use scan::quality::QualityAssessor;

#[cfg(feature = "tesseract")]
pub use scan::backend::TesseractBackend;

#[cfg(feature = "ocr")]
pub use scan::ocr::{OcrConfig, OcrEngine};
