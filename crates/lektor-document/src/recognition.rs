// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognition aggregation: turns backend word lists into page text and a
// confidence score, and merges native PDF text with recognized pages.

use std::sync::Arc;

use image::GrayImage;
use lektor_core::error::LektorError;
use lektor_core::{
    ExtractionResult, NATIVE_TEXT_CONFIDENCE, PageReport, PageSource, RecognitionLanguage, Stage,
    StageFault, WordToken,
};
use tracing::{debug, info, instrument, warn};

use crate::pdf::reader::{EmbeddedImageRasterizer, PageRasterizer, PdfReader};
use crate::scan::backend::RecognitionBackend;

/// Separator placed between page texts in a multi-page document.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Text, confidence, and per-page detail for one PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfExtraction {
    pub result: ExtractionResult,
    pub pages: Vec<PageReport>,
    /// Pages that failed and contributed nothing.
    pub faults: Vec<StageFault>,
}

/// Runs a recognition backend over pages and scores the output.
#[derive(Clone)]
pub struct RecognitionAggregator {
    backend: Arc<dyn RecognitionBackend>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl RecognitionAggregator {
    /// Aggregator using the embedded-image rasterizer for PDF pages.
    pub fn new(backend: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            backend,
            rasterizer: Arc::new(EmbeddedImageRasterizer),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Join the visible words with single spaces and average their raw scores.
    ///
    /// Words with blank text or the non-text sentinel do not count towards the
    /// score; with no scored words the confidence is 0.
    pub fn aggregate_words(words: &[WordToken]) -> ExtractionResult {
        let text = words
            .iter()
            .filter(|w| !lektor_core::is_blank(&w.text))
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let scores: Vec<f64> = words
            .iter()
            .filter(|w| w.is_scored())
            .map(|w| w.confidence)
            .collect();
        let confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64 / 100.0
        };

        ExtractionResult::new(text, confidence)
    }

    /// Recognize one raster page.
    #[instrument(skip_all, fields(backend = self.backend.name(), lang = language.code))]
    pub fn recognize_image(
        &self,
        image: &GrayImage,
        language: &RecognitionLanguage,
    ) -> Result<ExtractionResult, LektorError> {
        let words = self.backend.recognize(image, language)?;
        let result = Self::aggregate_words(&words);
        debug!(
            words = words.len(),
            confidence = result.confidence,
            "Page recognized"
        );
        Ok(result)
    }

    /// Extract every page of a PDF.
    ///
    /// Pages with a non-blank text layer are taken verbatim at
    /// [`NATIVE_TEXT_CONFIDENCE`]; the rest are rasterized and recognized. A
    /// page that cannot be rasterized or recognized contributes empty text at
    /// confidence 0 and is recorded as a fault. The document confidence is
    /// the mean over all pages.
    #[instrument(skip_all, fields(pages = reader.page_count(), lang = language.code))]
    pub fn extract_pdf(&self, reader: &PdfReader, language: &RecognitionLanguage) -> PdfExtraction {
        let mut texts: Vec<String> = Vec::new();
        let mut pages: Vec<PageReport> = Vec::new();
        let mut faults: Vec<StageFault> = Vec::new();

        for number in reader.page_numbers() {
            let (text, report) = match reader.native_text(number) {
                Some(text) => (
                    text,
                    PageReport {
                        number,
                        source: PageSource::NativeText,
                        confidence: NATIVE_TEXT_CONFIDENCE,
                    },
                ),
                None => match self.recognize_page(reader, number, language) {
                    Ok(result) => {
                        let confidence = result.confidence;
                        (
                            result.text,
                            PageReport {
                                number,
                                source: PageSource::Recognized,
                                confidence,
                            },
                        )
                    }
                    Err(err) => {
                        warn!(page = number, error = %err, "Page recognition failed");
                        faults.push(StageFault::new(Stage::PageRecognition, &err));
                        (
                            String::new(),
                            PageReport {
                                number,
                                source: PageSource::Failed,
                                confidence: 0.0,
                            },
                        )
                    }
                },
            };
            texts.push(text);
            pages.push(report);
        }

        let confidence = if pages.is_empty() {
            0.0
        } else {
            pages.iter().map(|p| p.confidence).sum::<f64>() / pages.len() as f64
        };

        info!(
            pages = pages.len(),
            failed = faults.len(),
            confidence,
            "PDF extraction complete"
        );

        PdfExtraction {
            result: ExtractionResult::new(texts.join(PAGE_SEPARATOR), confidence),
            pages,
            faults,
        }
    }

    fn recognize_page(
        &self,
        reader: &PdfReader,
        number: u32,
        language: &RecognitionLanguage,
    ) -> Result<ExtractionResult, LektorError> {
        let raster = self.rasterizer.rasterize(reader, number)?;
        self.recognize_image(&raster, language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::tests::{PageFixture, build_pdf};
    use crate::scan::backend::UnavailableBackend;
    use image::Luma;
    use lektor_core::NON_TEXT_CONFIDENCE;

    /// Backend that returns a fixed word list for every page.
    struct FixedBackend(Vec<WordToken>);

    impl RecognitionBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize(
            &self,
            _image: &GrayImage,
            _language: &RecognitionLanguage,
        ) -> Result<Vec<WordToken>, LektorError> {
            Ok(self.0.clone())
        }
    }

    fn english() -> RecognitionLanguage {
        RecognitionLanguage::resolve("en")
    }

    #[test]
    fn aggregates_words_and_skips_sentinels() {
        let words = [
            WordToken::new("Hello", 90.0),
            WordToken::new("", NON_TEXT_CONFIDENCE),
            WordToken::new("World", 80.0),
        ];
        let result = RecognitionAggregator::aggregate_words(&words);
        assert_eq!(result.text, "Hello World");
        assert!((result.confidence - 0.85).abs() < 1e-12);
    }

    #[test]
    fn no_scored_words_means_zero_confidence() {
        let words = [
            WordToken::new("  ", 95.0),
            WordToken::new("", NON_TEXT_CONFIDENCE),
        ];
        let result = RecognitionAggregator::aggregate_words(&words);
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(RecognitionAggregator::aggregate_words(&[]).confidence, 0.0);
    }

    #[test]
    fn native_text_page_scores_exactly_native_confidence() {
        let bytes = build_pdf(&[PageFixture::Text("Invoice 42")]);
        let reader = PdfReader::from_bytes(&bytes).expect("parse");
        let aggregator = RecognitionAggregator::new(Arc::new(UnavailableBackend));

        let extraction = aggregator.extract_pdf(&reader, &english());
        assert_eq!(extraction.result.confidence, NATIVE_TEXT_CONFIDENCE);
        assert!(extraction.result.text.contains("Invoice 42"));
        assert_eq!(extraction.pages[0].source, PageSource::NativeText);
        assert!(extraction.faults.is_empty());
    }

    #[test]
    fn mixes_native_and_recognized_pages() {
        let scan = GrayImage::from_pixel(30, 30, Luma([200u8]));
        let bytes = build_pdf(&[PageFixture::Text("Cover"), PageFixture::GrayImage(&scan)]);
        let reader = PdfReader::from_bytes(&bytes).expect("parse");
        let backend = FixedBackend(vec![
            WordToken::new("Scanned", 70.0),
            WordToken::new("page", 50.0),
        ]);
        let aggregator = RecognitionAggregator::new(Arc::new(backend));

        let extraction = aggregator.extract_pdf(&reader, &english());
        let text = &extraction.result.text;
        assert!(text.starts_with("Cover"), "got {text:?}");
        assert!(text.ends_with(&format!("{PAGE_SEPARATOR}Scanned page")), "got {text:?}");
        // (0.95 + 0.60) / 2
        assert!((extraction.result.confidence - 0.775).abs() < 1e-12);
        assert_eq!(extraction.pages[1].source, PageSource::Recognized);
    }

    #[test]
    fn failed_page_contributes_nothing() {
        let bytes = build_pdf(&[PageFixture::Text("Kept"), PageFixture::Blank]);
        let reader = PdfReader::from_bytes(&bytes).expect("parse");
        let aggregator = RecognitionAggregator::new(Arc::new(UnavailableBackend));

        let extraction = aggregator.extract_pdf(&reader, &english());
        assert_eq!(extraction.pages[1].source, PageSource::Failed);
        assert_eq!(extraction.pages[1].confidence, 0.0);
        assert_eq!(extraction.faults.len(), 1);
        assert_eq!(extraction.faults[0].stage, Stage::PageRecognition);
        assert!((extraction.result.confidence - 0.475).abs() < 1e-12);
        assert!(extraction.result.text.ends_with(PAGE_SEPARATOR));
    }
}
