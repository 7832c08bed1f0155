// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Lektor extraction pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::QualityThresholds;
use crate::error::LektorError;

/// Confidence assigned to text taken from a PDF's native text layer.
pub const NATIVE_TEXT_CONFIDENCE: f64 = 0.95;

/// Raw confidence a recognition backend reports for non-text regions.
pub const NON_TEXT_CONFIDENCE: f64 = -1.0;

/// Text returned when the input's extension is not supported.
pub const UNSUPPORTED_FILE_TEXT: &str = "Unsupported file type";

/// Text returned when the image path fails beyond recovery.
pub const IMAGE_FAILED_TEXT: &str = "Image processing failed";

/// Clamp a confidence value into `[0, 1]`. NaN maps to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Whether `text` is empty or contains only whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Supported input document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Image,
    Pdf,
}

impl FileKind {
    /// Infer the document kind from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "tif" | "gif" => Some(Self::Image),
            _ => None,
        }
    }

    /// Infer the document kind from a path or file name.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Pdf => f.write_str("pdf"),
        }
    }
}

/// How aggressively a page image is cleaned up before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnhancementTier {
    /// Sharp, high-contrast page: light touch only.
    Low,
    /// Middling quality: contrast boost and local binarization.
    Medium,
    /// Poor quality: denoise, sharpen, global binarization.
    High,
}

/// Sharpness and contrast measurements of a grayscale page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Variance of the Laplacian response.
    pub blur: f64,
    /// Standard deviation of pixel intensities.
    pub contrast: f64,
}

impl QualityMetrics {
    /// Pick the enhancement tier. Comparisons are strict: a metric sitting
    /// exactly on a threshold does not clear it.
    pub fn select_tier(&self, thresholds: &QualityThresholds) -> EnhancementTier {
        if self.blur > thresholds.low_blur && self.contrast > thresholds.low_contrast {
            EnhancementTier::Low
        } else if self.blur > thresholds.medium_blur && self.contrast > thresholds.medium_contrast {
            EnhancementTier::Medium
        } else {
            EnhancementTier::High
        }
    }
}

/// One word reported by a recognition backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    /// Raw score in `[0, 100]`, or [`NON_TEXT_CONFIDENCE`].
    pub confidence: f64,
}

impl WordToken {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// A word counts towards the page score when it has visible text and a
    /// real confidence.
    pub fn is_scored(&self) -> bool {
        !is_blank(&self.text) && self.confidence != NON_TEXT_CONFIDENCE
    }
}

/// Extracted text plus its reliability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
}

impl ExtractionResult {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// Sentinel for inputs whose extension is not handled.
    pub fn unsupported() -> Self {
        Self::new(UNSUPPORTED_FILE_TEXT, 0.0)
    }

    /// Sentinel for an image that could not be processed at all.
    pub fn image_failed() -> Self {
        Self::new(IMAGE_FAILED_TEXT, 0.0)
    }

    /// Consume into the `(text, confidence)` pair consumers expect.
    pub fn into_pair(self) -> (String, f64) {
        (self.text, self.confidence)
    }
}

/// Categories a linguistic capability can assign to a span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    Organization,
    GeoPoliticalEntity,
    Location,
    /// Any other label the recognizer produces; never re-cased.
    Other(String),
}

impl EntityKind {
    /// Whether spans of this kind are proper names that should be title-cased.
    pub fn is_proper_name(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// A span of text identified as a named entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub kind: EntityKind,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Pipeline stages that may fall back instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Deskew,
    PageRecognition,
    ModelCorrection,
    EntityRecasing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Deskew => "deskew",
            Self::PageRecognition => "page-recognition",
            Self::ModelCorrection => "model-correction",
            Self::EntityRecasing => "entity-recasing",
        };
        f.write_str(name)
    }
}

/// A non-fatal failure recorded while the pipeline carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFault {
    pub stage: Stage,
    pub message: String,
}

impl StageFault {
    pub fn new(stage: Stage, error: &LektorError) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

/// Output of a stage that never aborts the pipeline.
///
/// When `fault` is set, `output` is the stage's input, unmodified.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub output: T,
    pub fault: Option<StageFault>,
}

impl<T> Staged<T> {
    /// The stage ran to completion.
    pub fn clean(output: T) -> Self {
        Self {
            output,
            fault: None,
        }
    }

    /// The stage failed and handed its input back.
    pub fn fell_back(input: T, stage: Stage, error: &LektorError) -> Self {
        Self {
            output: input,
            fault: Some(StageFault::new(stage, error)),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.fault.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Staged<U> {
        Staged {
            output: f(self.output),
            fault: self.fault,
        }
    }

    /// Split into the output and the optional fault.
    pub fn into_parts(self) -> (T, Option<StageFault>) {
        (self.output, self.fault)
    }
}

/// Where a PDF page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSource {
    NativeText,
    Recognized,
    Failed,
}

/// Per-page outcome of PDF extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed page number.
    pub number: u32,
    pub source: PageSource,
    pub confidence: f64,
}
