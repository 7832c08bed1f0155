// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction orchestrator: classifies a document, routes it through the
// image or PDF path, then applies correction and normalization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::GrayImage;
use lektor_core::config::ExtractionConfig;
use lektor_core::error::LektorError;
use lektor_core::{
    EnhancementTier, ExtractionResult, FileKind, PageReport, RecognitionLanguage, StageFault,
};
use lektor_document::{
    Deskewer, ImageProcessor, PageRasterizer, PdfReader, QualityAssessor, RecognitionAggregator,
    RecognitionBackend, ScanEnhancer,
};
use lektor_text::{
    EntityRecognizer, NoEntityRecognizer, NoopEnhancer, TextCorrector, TextEnhancer, TextNormalizer,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

/// Everything the pipeline learned while extracting one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub result: ExtractionResult,
    /// `None` when the extension was not recognised.
    pub file_kind: Option<FileKind>,
    /// Backend language code the hint resolved to.
    pub language: String,
    /// Enhancement tier chosen for an image page.
    pub tier: Option<EnhancementTier>,
    /// Rotation applied to an image page, in degrees.
    pub deskew_angle: Option<f64>,
    /// Per-page outcome for PDFs.
    pub pages: Vec<PageReport>,
    /// Stages that fell back instead of completing.
    pub faults: Vec<StageFault>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ExtractionReport {
    fn new(file_kind: Option<FileKind>, language: &RecognitionLanguage) -> Self {
        Self {
            result: ExtractionResult::new("", 0.0),
            file_kind,
            language: language.code.to_string(),
            tier: None,
            deskew_angle: None,
            pages: Vec::new(),
            faults: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Where a request's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentSource {
    Path(PathBuf),
    /// In-memory content; `name` supplies the extension.
    Bytes { name: String, data: Vec<u8> },
}

impl DocumentSource {
    /// Human-readable label used in logs.
    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { name, .. } => name.clone(),
        }
    }
}

/// One unit of work for [`Extractor::run`] and the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub source: DocumentSource,
    /// ISO 639-1 hint or `"auto"`. `None` uses the configured default.
    pub language: Option<String>,
    pub enhance: bool,
}

impl ExtractionRequest {
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: DocumentSource::Path(path.into()),
            language: None,
            enhance: true,
        }
    }

    pub fn for_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            source: DocumentSource::Bytes {
                name: name.into(),
                data,
            },
            language: None,
            enhance: true,
        }
    }

    pub fn with_language(mut self, hint: impl Into<String>) -> Self {
        self.language = Some(hint.into());
        self
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }
}

/// Sequences the page and text stages for one document at a time.
///
/// Holds only shared, read-only state, so a single instance can serve
/// concurrent extractions.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    assessor: QualityAssessor,
    deskewer: Deskewer,
    aggregator: RecognitionAggregator,
    enhancer: Arc<dyn TextEnhancer>,
    corrector: TextCorrector,
    normalizer: TextNormalizer,
}

impl Extractor {
    /// Build an extractor with no enhancement model and no entity recognizer.
    pub fn new(config: ExtractionConfig, backend: Arc<dyn RecognitionBackend>) -> Self {
        let enhancer: Arc<dyn TextEnhancer> = Arc::new(NoopEnhancer);
        Self {
            assessor: QualityAssessor::new(config.quality.clone()),
            deskewer: Deskewer::new(config.deskew.clone()),
            aggregator: RecognitionAggregator::new(backend),
            corrector: TextCorrector::new(enhancer.clone(), config.correction.clone()),
            enhancer,
            normalizer: TextNormalizer::new(Arc::new(NoEntityRecognizer)),
            config,
        }
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn TextEnhancer>) -> Self {
        self.corrector = TextCorrector::new(enhancer.clone(), self.config.correction.clone());
        self.enhancer = enhancer;
        self
    }

    pub fn with_entity_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        self.normalizer = TextNormalizer::new(recognizer);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.aggregator = self.aggregator.with_rasterizer(rasterizer);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn model_ready(&self) -> bool {
        self.enhancer.is_ready()
    }

    // -- Entry points ---------------------------------------------------------

    /// Extract text from a file. Returns the `(text, confidence)` pair.
    pub fn extract_file(
        &self,
        path: impl AsRef<Path>,
        language: &str,
        enhance: bool,
    ) -> Result<(String, f64), LektorError> {
        self.extract_file_with_report(path, language, enhance)
            .map(|report| report.result.into_pair())
    }

    /// Extract text from in-memory content named `name`.
    pub fn extract_bytes(
        &self,
        name: &str,
        data: &[u8],
        language: &str,
        enhance: bool,
    ) -> Result<(String, f64), LektorError> {
        self.extract_bytes_with_report(name, data, language, enhance)
            .map(|report| report.result.into_pair())
    }

    /// Like [`Self::extract_file`], returning the full report.
    ///
    /// An unsupported extension yields the sentinel result without touching
    /// the file. A file that cannot be read is an input error.
    pub fn extract_file_with_report(
        &self,
        path: impl AsRef<Path>,
        language: &str,
        enhance: bool,
    ) -> Result<ExtractionReport, LektorError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        self.extract_inner(&name, language, enhance, || {
            std::fs::read(path).map_err(|err| {
                LektorError::Input(format!("cannot read {}: {}", path.display(), err))
            })
        })
    }

    /// Like [`Self::extract_bytes`], returning the full report.
    pub fn extract_bytes_with_report(
        &self,
        name: &str,
        data: &[u8],
        language: &str,
        enhance: bool,
    ) -> Result<ExtractionReport, LektorError> {
        self.extract_inner(name, language, enhance, || Ok(data.to_vec()))
    }

    /// Run one request.
    pub fn run(&self, request: &ExtractionRequest) -> Result<ExtractionReport, LektorError> {
        let language = request
            .language
            .as_deref()
            .unwrap_or(&self.config.recognition.default_language);
        match &request.source {
            DocumentSource::Path(path) => {
                self.extract_file_with_report(path, language, request.enhance)
            }
            DocumentSource::Bytes { name, data } => {
                self.extract_bytes_with_report(name, data, language, request.enhance)
            }
        }
    }

    // -- Pipeline -------------------------------------------------------------

    #[instrument(skip(self, load))]
    fn extract_inner(
        &self,
        name: &str,
        language: &str,
        enhance: bool,
        load: impl FnOnce() -> Result<Vec<u8>, LektorError>,
    ) -> Result<ExtractionReport, LektorError> {
        let started = Instant::now();
        let language = RecognitionLanguage::resolve(language);
        let file_kind = FileKind::from_path(name);
        let mut report = ExtractionReport::new(file_kind, &language);

        let Some(kind) = file_kind else {
            error!(file = name, "Unsupported file type");
            report.result = ExtractionResult::unsupported();
            report.elapsed = started.elapsed();
            return Ok(report);
        };

        let data = load()?;
        let extracted = match kind {
            FileKind::Pdf => self.extract_pdf(&data, &language, &mut report)?,
            FileKind::Image => match self.extract_image(&data, &language, &mut report) {
                Ok(result) => result,
                Err(err) => {
                    error!(file = name, error = %err, "Image processing failed");
                    report.result = ExtractionResult::image_failed();
                    report.elapsed = started.elapsed();
                    return Ok(report);
                }
            },
        };

        let corrected = if enhance {
            let (result, fault) = self
                .corrector
                .correct(&extracted.text, extracted.confidence)
                .into_parts();
            report.faults.extend(fault);
            result
        } else {
            extracted
        };

        let (text, fault) = self.normalizer.normalize(&corrected.text).into_parts();
        report.faults.extend(fault);
        report.result = ExtractionResult::new(text, corrected.confidence);
        report.elapsed = started.elapsed();

        info!(
            file = name,
            elapsed_secs = report.elapsed.as_secs_f64(),
            confidence = report.result.confidence,
            "Text extraction completed"
        );
        Ok(report)
    }

    fn extract_pdf(
        &self,
        data: &[u8],
        language: &RecognitionLanguage,
        report: &mut ExtractionReport,
    ) -> Result<ExtractionResult, LektorError> {
        let reader = PdfReader::from_bytes(data)?;
        let extraction = self.aggregator.extract_pdf(&reader, language);
        report.pages = extraction.pages;
        report.faults.extend(extraction.faults);
        Ok(extraction.result)
    }

    /// Load, assess, enhance, deskew, recognize.
    fn extract_image(
        &self,
        data: &[u8],
        language: &RecognitionLanguage,
        report: &mut ExtractionReport,
    ) -> Result<ExtractionResult, LektorError> {
        let page = ImageProcessor::from_bytes(data)?.into_gray();
        let prepared = self.prepare_page(page, report);
        self.aggregator.recognize_image(&prepared, language)
    }

    fn prepare_page(&self, page: GrayImage, report: &mut ExtractionReport) -> GrayImage {
        let (_, tier) = self.assessor.assess(&page);
        report.tier = Some(tier);

        let enhanced = ScanEnhancer::from_gray(page, self.config.enhancer.clone())
            .apply_tier(tier)
            .into_gray();

        let (outcome, fault) = self.deskewer.deskew(enhanced).into_parts();
        report.deskew_angle = Some(outcome.angle);
        report.faults.extend(fault);
        outcome.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{ImageFormat, Luma};
    use lektor_core::{NATIVE_TEXT_CONFIDENCE, PageSource, Stage, WordToken};
    use lektor_document::UnavailableBackend;
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Backend returning the same words for every page.
    struct ScriptedBackend(Vec<WordToken>);

    impl RecognitionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn recognize(
            &self,
            _image: &GrayImage,
            _language: &RecognitionLanguage,
        ) -> Result<Vec<WordToken>, LektorError> {
            Ok(self.0.clone())
        }
    }

    /// Ready model that counts how often it is called.
    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    impl TextEnhancer for CountingModel {
        fn is_ready(&self) -> bool {
            true
        }

        fn enhance(&self, text: &str, confidence: f64) -> Result<(String, f64), LektorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((text.to_string(), confidence))
        }
    }

    fn scripted(words: &[(&str, f64)]) -> Arc<dyn RecognitionBackend> {
        Arc::new(ScriptedBackend(
            words
                .iter()
                .map(|&(text, confidence)| WordToken::new(text, confidence))
                .collect(),
        ))
    }

    fn png_page() -> Vec<u8> {
        let mut page = GrayImage::from_pixel(64, 48, Luma([235u8]));
        for x in 10..54 {
            for y in 20..26 {
                page.put_pixel(x, y, Luma([20u8]));
            }
        }
        let mut bytes = Vec::new();
        page.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    /// Build a PDF whose pages carry one line of text each; `None` is a page
    /// with neither text nor images.
    fn text_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in pages {
            let operations = match line {
                Some(line) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![],
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
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
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    fn extractor(backend: Arc<dyn RecognitionBackend>) -> Extractor {
        Extractor::new(ExtractionConfig::default(), backend)
    }

    #[test]
    fn unsupported_extension_is_a_sentinel() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let pair = extractor
            .extract_file("/nonexistent/letter.docx", "en", true)
            .expect("sentinel, not error");
        assert_eq!(pair, ("Unsupported file type".to_string(), 0.0));
    }

    #[test]
    fn native_pdf_text_keeps_fixed_confidence_without_enhance() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let pdf = text_pdf(&[Some("Quarterly report")]);
        let report = extractor
            .extract_bytes_with_report("report.pdf", &pdf, "auto", false)
            .expect("extract");
        assert_eq!(report.file_kind, Some(FileKind::Pdf));
        assert_eq!(report.result.confidence, NATIVE_TEXT_CONFIDENCE);
        assert!(report.result.text.contains("Quarterly report"));
        assert_eq!(report.pages[0].source, PageSource::NativeText);
        assert_eq!(report.language, "eng");
    }

    #[test]
    fn enhanced_pdf_gets_rule_boost() {
        let model = Arc::new(CountingModel::default());
        let extractor = extractor(Arc::new(UnavailableBackend)).with_enhancer(model.clone());
        let pdf = text_pdf(&[Some("Quarterly report")]);
        let (_, confidence) = extractor
            .extract_bytes("report.pdf", &pdf, "en", true)
            .expect("extract");
        // 0.95 is above the model gate.
        assert!((confidence - 0.9975).abs() < 1e-9);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn image_path_runs_recognition() {
        let backend = scripted(&[("Hello", 90.0), ("", -1.0), ("World", 80.0)]);
        let extractor = extractor(backend);
        let report = extractor
            .extract_bytes_with_report("scan.png", &png_page(), "en", false)
            .expect("extract");
        assert_eq!(report.result.text, "Hello World");
        assert!((report.result.confidence - 0.85).abs() < 1e-12);
        assert_eq!(report.file_kind, Some(FileKind::Image));
        assert!(report.tier.is_some());
        assert!(report.deskew_angle.is_some());
    }

    #[test]
    fn low_confidence_image_invokes_model() {
        let model = Arc::new(CountingModel::default());
        let extractor = extractor(scripted(&[("faint", 50.0)])).with_enhancer(model.clone());
        let (text, confidence) = extractor
            .extract_bytes("scan.png", &png_page(), "en", true)
            .expect("extract");
        assert_eq!(text, "faint");
        assert!(confidence <= 0.575 + 1e-12);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn undecodable_image_is_a_sentinel() {
        let extractor = extractor(scripted(&[("never", 99.0)]));
        let pair = extractor
            .extract_bytes("broken.jpg", b"not an image", "en", true)
            .expect("sentinel, not error");
        assert_eq!(pair, ("Image processing failed".to_string(), 0.0));
    }

    #[test]
    fn recognition_failure_on_image_is_a_sentinel() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let pair = extractor
            .extract_bytes("scan.png", &png_page(), "en", true)
            .expect("sentinel, not error");
        assert_eq!(pair, ("Image processing failed".to_string(), 0.0));
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let err = extractor
            .extract_file("/nonexistent/scan.png", "en", true)
            .expect_err("missing file");
        assert!(matches!(err, LektorError::Input(_)));
    }

    #[test]
    fn corrupt_pdf_is_an_input_error() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let err = extractor
            .extract_bytes("bad.pdf", b"%PDF-garbage", "en", true)
            .expect_err("corrupt pdf");
        assert!(matches!(err, LektorError::Input(_)));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("page.png");
        std::fs::write(&path, png_page()).expect("write png");

        let extractor = extractor(scripted(&[("On", 70.0), ("disk", 90.0)]));
        let (text, confidence) = extractor.extract_file(&path, "de", false).expect("extract");
        assert_eq!(text, "On disk");
        assert!((confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn blank_recognition_passes_through() {
        let extractor = extractor(scripted(&[("", -1.0)]));
        let (text, confidence) = extractor
            .extract_bytes("scan.png", &png_page(), "en", true)
            .expect("extract");
        assert_eq!(text, "");
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn failed_pdf_page_is_reported_as_fault() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let bytes = text_pdf(&[Some("Kept"), None]);

        let report = extractor
            .extract_bytes_with_report("mixed.pdf", &bytes, "en", false)
            .expect("extract");
        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[1].source, PageSource::Failed);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].stage, Stage::PageRecognition);
        assert!((report.result.confidence - 0.475).abs() < 1e-12);
    }

    #[test]
    fn request_uses_configured_default_language() {
        let extractor = extractor(scripted(&[("Hola", 80.0)]));
        let request = ExtractionRequest::for_bytes("scan.png", png_page()).with_enhance(false);
        let report = extractor.run(&request).expect("extract");
        assert_eq!(report.language, "eng");

        let request = request.with_language("es");
        assert_eq!(extractor.run(&request).expect("extract").language, "spa");
    }

    #[test]
    fn report_serializes_elapsed_as_millis() {
        let extractor = extractor(Arc::new(UnavailableBackend));
        let report = extractor
            .extract_bytes_with_report("notes.txt", b"", "en", true)
            .expect("sentinel");
        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json["elapsed"].is_u64());
        assert_eq!(json["result"]["text"], "Unsupported file type");
    }
}
