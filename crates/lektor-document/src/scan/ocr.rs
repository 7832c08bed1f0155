// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pure-Rust OCR backend built on the `ocrs` crate, with neural network models
// executed via `rten`.
//
// # Feature Gate
//
// This module is only available when the `ocr` feature is enabled:
//
// ```toml
// lektor-document = { path = "crates/lektor-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// The engine requires two model files:
//
// - **Detection model** (`text-detection.rten`): locates text regions in the image.
// - **Recognition model** (`text-recognition.rten`): decodes characters from detected regions.
//
// Running `ocrs-cli` once downloads both into `~/.cache/ocrs/`, which is the
// default model directory.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use lektor_core::error::LektorError;
use lektor_core::{RecognitionLanguage, WordToken};
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};

use crate::scan::backend::RecognitionBackend;

/// Default directory for cached OCR model files.
///
/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs` when
/// `XDG_CACHE_HOME` is unset.
fn default_model_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .map(|cache| cache.join("ocrs"))
        .unwrap_or_else(|| PathBuf::from("ocrs-models"))
}

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Where to find the model files, and what score to give each word.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
    /// `ocrs` does not score words; every word gets this raw confidence.
    pub assumed_word_confidence: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Expects the directory to contain `text-detection.rten` and
    /// `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
            assumed_word_confidence: 90.0,
        }
    }

    pub fn with_assumed_confidence(mut self, confidence: f64) -> Self {
        self.assumed_word_confidence = confidence;
        self
    }

    /// Verify that both model files exist.
    pub fn validate(&self) -> Result<(), LektorError> {
        for path in [&self.detection_model_path, &self.recognition_model_path] {
            if !path.exists() {
                return Err(LektorError::Recognition(format!(
                    "OCR model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// `ocrs`-backed recognition engine. Model loading is the expensive step, so
/// build one engine and share it.
pub struct OcrEngine {
    engine: OcrsEngine,
    assumed_word_confidence: f64,
}

impl OcrEngine {
    /// Load the detection and recognition models named in `config`.
    ///
    /// `ocrs` and `rten` are very slow in debug builds; use release mode.
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrConfig) -> Result<Self, LektorError> {
        config.validate()?;

        info!("Loading OCR detection model");
        let detection_model = load_model(&config.detection_model_path)?;
        info!("Loading OCR recognition model");
        let recognition_model = load_model(&config.recognition_model_path)?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| LektorError::Recognition(format!("failed to initialise OCR engine: {}", err)))?;

        info!("OCR engine initialised");
        Ok(Self {
            engine,
            assumed_word_confidence: config.assumed_word_confidence,
        })
    }
}

fn load_model(path: &Path) -> Result<Model, LektorError> {
    Model::load_file(path).map_err(|err| {
        LektorError::Recognition(format!("failed to load model from {}: {}", path.display(), err))
    })
}

impl RecognitionBackend for OcrEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(
        &self,
        image: &GrayImage,
        language: &RecognitionLanguage,
    ) -> Result<Vec<WordToken>, LektorError> {
        // The ocrs models are Latin-script only; the language code is advisory.
        debug!(lang = language.code, "Starting ocrs recognition");

        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            LektorError::Recognition(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;

        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| LektorError::Recognition(format!("OCR preprocessing failed: {}", err)))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| LektorError::Recognition(format!("word detection failed: {}", err)))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| LektorError::Recognition(format!("line recognition failed: {}", err)))?;

        let words: Vec<WordToken> = lines
            .iter()
            .flatten()
            .flat_map(|line| line.words())
            .map(|word| WordToken::new(word.to_string(), self.assumed_word_confidence))
            .collect();

        debug!(
            lines = line_rects.len(),
            words = words.len(),
            "ocrs recognition complete"
        );
        Ok(words)
    }
}
