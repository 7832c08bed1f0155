// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Character-recognition backends: the trait every engine implements, a
// placeholder used when no engine is compiled in, and the Tesseract adapter.

use image::GrayImage;
use lektor_core::error::LektorError;
use lektor_core::{NON_TEXT_CONFIDENCE, RecognitionLanguage, WordToken};

/// A character-recognition engine.
///
/// Backends are loaded once and shared across concurrent extractions, so
/// `recognize` must not mutate shared state.
pub trait RecognitionBackend: Send + Sync {
    /// Short engine name for logs and reports.
    fn name(&self) -> &'static str;

    /// Recognize the words on a page, in reading order.
    ///
    /// Words carry a raw confidence in `[0, 100]`; rows that are not words
    /// (blocks, lines, whitespace) may be reported with
    /// [`NON_TEXT_CONFIDENCE`].
    fn recognize(
        &self,
        image: &GrayImage,
        language: &RecognitionLanguage,
    ) -> Result<Vec<WordToken>, LektorError>;
}

/// Stand-in used when the crate is built without an OCR engine.
///
/// Every call fails, so PDFs with a native text layer still extract while
/// raster pages degrade to the failure path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

impl RecognitionBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn recognize(
        &self,
        _image: &GrayImage,
        _language: &RecognitionLanguage,
    ) -> Result<Vec<WordToken>, LektorError> {
        Err(LektorError::Recognition(
            "no recognition engine compiled in (enable the `ocr` or `tesseract` feature)"
                .to_string(),
        ))
    }
}

/// Parse Tesseract's TSV word dump into tokens.
///
/// Each data row has twelve tab-separated columns ending in `conf` and `text`.
/// Rows whose confidence column does not parse (the header) are skipped.
/// Structural rows keep their `-1` confidence and empty text.
#[cfg_attr(not(feature = "tesseract"), allow(dead_code))]
pub(crate) fn parse_tsv(tsv: &str) -> Vec<WordToken> {
    tsv.lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < 11 {
                return None;
            }
            let confidence: f64 = columns[10].trim().parse().ok()?;
            let text = columns.get(11).copied().unwrap_or("");
            let confidence = if confidence < 0.0 {
                NON_TEXT_CONFIDENCE
            } else {
                confidence
            };
            Some(WordToken::new(text, confidence))
        })
        .collect()
}

#[cfg(feature = "tesseract")]
pub use tesseract_backend::TesseractBackend;

#[cfg(feature = "tesseract")]
mod tesseract_backend {
    use image::GrayImage;
    use lektor_core::error::LektorError;
    use lektor_core::{RecognitionLanguage, WordToken};
    use tesseract::Tesseract;
    use tracing::{debug, instrument};

    use super::{RecognitionBackend, parse_tsv};

    /// Tesseract adapter. A fresh engine handle is created per page, so the
    /// backend itself holds only configuration.
    #[derive(Debug, Clone, Default)]
    pub struct TesseractBackend {
        /// Directory holding `*.traineddata`; `None` uses Tesseract's default.
        data_path: Option<String>,
    }

    impl TesseractBackend {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl RecognitionBackend for TesseractBackend {
        fn name(&self) -> &'static str {
            "tesseract"
        }

        #[instrument(skip_all, fields(lang = language.code, width = image.width(), height = image.height()))]
        fn recognize(
            &self,
            image: &GrayImage,
            language: &RecognitionLanguage,
        ) -> Result<Vec<WordToken>, LektorError> {
            let (width, height) = image.dimensions();
            let engine = Tesseract::new(self.data_path.as_deref(), Some(language.code))
                .map_err(|err| LektorError::Recognition(format!("tesseract init: {}", err)))?;
            let mut engine = engine
                .set_frame(
                    image.as_raw(),
                    width as i32,
                    height as i32,
                    1,
                    width as i32,
                )
                .map_err(|err| LektorError::Recognition(format!("tesseract image: {}", err)))?
                .recognize()
                .map_err(|err| LektorError::Recognition(format!("tesseract recognize: {}", err)))?;
            let tsv = engine
                .get_tsv_text(0)
                .map_err(|err| LektorError::Recognition(format!("tesseract tsv: {}", err)))?;

            let words = parse_tsv(&tsv);
            debug!(rows = words.len(), "Tesseract rows parsed");
            Ok(words)
        }
    }
}
