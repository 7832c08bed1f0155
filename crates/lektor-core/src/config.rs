// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LektorError, Result};

/// Settings for one extraction pipeline instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub quality: QualityThresholds,
    pub enhancer: EnhancerConfig,
    pub deskew: DeskewConfig,
    pub recognition: RecognitionConfig,
    pub correction: CorrectionConfig,
    pub pool: PoolConfig,
}

impl ExtractionConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.enhancer.adaptive_window < 3 || self.enhancer.adaptive_window % 2 == 0 {
            return Err(LektorError::Input(format!(
                "adaptive window must be odd and at least 3, got {}",
                self.enhancer.adaptive_window
            )));
        }
        if self.enhancer.nlm_template_window % 2 == 0 || self.enhancer.nlm_search_window % 2 == 0 {
            return Err(LektorError::Input(
                "non-local-means windows must be odd".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.correction.model_gate) {
            return Err(LektorError::Input(format!(
                "model gate must lie in [0, 1], got {}",
                self.correction.model_gate
            )));
        }
        if self.pool.max_concurrent == 0 {
            return Err(LektorError::Input(
                "pool needs at least one worker".to_string(),
            ));
        }
        Ok(())
    }
}

/// Blur/contrast cut-offs for tier selection. All comparisons are strict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub low_blur: f64,
    pub low_contrast: f64,
    pub medium_blur: f64,
    pub medium_contrast: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            low_blur: 100.0,
            low_contrast: 50.0,
            medium_blur: 50.0,
            medium_contrast: 30.0,
        }
    }
}

/// How the local threshold is weighted in adaptive binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveMethod {
    /// Plain box mean over the window.
    Mean,
    /// Gaussian-weighted mean over the window.
    Gaussian,
}

/// Parameters of the tiered enhancement chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    pub low_gain: f32,
    pub medium_gain: f32,
    pub medium_offset: f32,
    pub high_gain: f32,
    pub high_offset: f32,
    /// Side length of the adaptive threshold window (odd).
    pub adaptive_window: u32,
    /// Subtracted from the local mean before comparison.
    pub adaptive_constant: i32,
    pub adaptive_method: AdaptiveMethod,
    /// Non-local-means filter strength.
    pub nlm_strength: f32,
    pub nlm_template_window: u32,
    pub nlm_search_window: u32,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            low_gain: 1.1,
            medium_gain: 1.3,
            medium_offset: 10.0,
            high_gain: 1.5,
            high_offset: 30.0,
            adaptive_window: 11,
            adaptive_constant: 2,
            adaptive_method: AdaptiveMethod::Gaussian,
            nlm_strength: 10.0,
            nlm_template_window: 7,
            nlm_search_window: 21,
        }
    }
}

/// Deskew settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    pub enabled: bool,
    /// Contours enclosing less area than this are treated as noise.
    pub min_contour_area: f64,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_contour_area: 100.0,
        }
    }
}

/// Recognition backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Language used when the caller passes no hint.
    pub default_language: String,
    /// Raw score given to words from engines that report none (0-100).
    pub assumed_word_confidence: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            default_language: "auto".to_string(),
            assumed_word_confidence: 90.0,
        }
    }
}

/// Confidence gate and boosts for model-based correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// The model runs only below this confidence.
    pub model_gate: f64,
    /// Multiplier after a successful model pass.
    pub model_boost: f64,
    /// Multiplier when the model is absent or not needed.
    pub rule_boost: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            model_gate: 0.85,
            model_boost: 1.15,
            rule_boost: 1.05,
        }
    }
}

/// Worker pool bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    /// Per-document timeout in seconds; `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            timeout_secs: Some(120),
        }
    }
}
