// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline: quality assessment, tiered enhancement, deskew, and
// optical character recognition (OCR) backends.

pub mod backend;
pub mod deskew;
pub mod enhance;
pub mod quality;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use backend::{RecognitionBackend, UnavailableBackend};
pub use deskew::{DeskewOutcome, Deskewer};
pub use enhance::ScanEnhancer;
pub use quality::QualityAssessor;

#[cfg(feature = "tesseract")]
pub use backend::TesseractBackend;

#[cfg(feature = "ocr")]
pub use ocr::OcrEngine;
