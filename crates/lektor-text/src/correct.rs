// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text correction: deterministic repair rules followed by an optional,
// confidence-gated model pass.

use std::sync::Arc;

use lektor_core::config::CorrectionConfig;
use lektor_core::error::LektorError;
use lektor_core::{ExtractionResult, Stage, Staged, clamp_confidence, is_blank};
use tracing::{debug, info, instrument, warn};

use crate::rules::{CorrectionRule, GlyphTable, OCR_REPAIR_RULES, apply_rules};

/// A model that rewrites recognized text.
///
/// Implementations are shared across threads and must be callable even when
/// their model failed to load; `is_ready` tells the corrector whether calling
/// `enhance` is worthwhile.
pub trait TextEnhancer: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Rewrite `text`. The returned confidence is the model's own estimate.
    fn enhance(&self, text: &str, confidence: f64) -> Result<(String, f64), LektorError>;
}

/// Enhancer used when no model is configured. Never ready; identity if called.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnhancer;

impl TextEnhancer for NoopEnhancer {
    fn is_ready(&self) -> bool {
        false
    }

    fn enhance(&self, text: &str, confidence: f64) -> Result<(String, f64), LektorError> {
        Ok((text.to_string(), confidence))
    }
}

/// Repairs common recognition errors and adjusts the confidence score.
#[derive(Clone)]
pub struct TextCorrector {
    rules: Vec<CorrectionRule>,
    glyphs: GlyphTable,
    enhancer: Arc<dyn TextEnhancer>,
    config: CorrectionConfig,
}

impl Default for TextCorrector {
    fn default() -> Self {
        Self::new(Arc::new(NoopEnhancer), CorrectionConfig::default())
    }
}

impl TextCorrector {
    pub fn new(enhancer: Arc<dyn TextEnhancer>, config: CorrectionConfig) -> Self {
        Self {
            rules: OCR_REPAIR_RULES.clone(),
            glyphs: GlyphTable::standard(),
            enhancer,
            config,
        }
    }

    pub fn model_ready(&self) -> bool {
        self.enhancer.is_ready()
    }

    /// The deterministic pass: ordered rules, then glyph substitutions.
    pub fn apply_rules(&self, text: &str) -> String {
        self.glyphs.apply(&apply_rules(&self.rules, text))
    }

    /// Correct `text` and return the adjusted score.
    ///
    /// Below the model gate, a ready model rewrites the rule output and the
    /// confidence gains `model_boost`. If the model fails, the rule output is
    /// kept, the confidence is left as it was, and the fault is attached.
    /// Otherwise only `rule_boost` is applied. Blank text passes through
    /// untouched.
    #[instrument(skip_all, fields(chars = text.len(), confidence))]
    pub fn correct(&self, text: &str, confidence: f64) -> Staged<ExtractionResult> {
        let confidence = clamp_confidence(confidence);
        if is_blank(text) {
            return Staged::clean(ExtractionResult::new(text, confidence));
        }

        let repaired = self.apply_rules(text);

        if self.enhancer.is_ready() && confidence < self.config.model_gate {
            match self.enhancer.enhance(&repaired, confidence) {
                Ok((enhanced, model_confidence)) => {
                    let boosted = clamp_confidence(confidence * self.config.model_boost);
                    info!(
                        before = confidence,
                        after = boosted,
                        model_confidence,
                        "Model correction applied"
                    );
                    Staged::clean(ExtractionResult::new(enhanced, boosted))
                }
                Err(err) => {
                    warn!(error = %err, "Model correction failed; keeping rule-based text");
                    Staged::fell_back(
                        ExtractionResult::new(repaired, confidence),
                        Stage::ModelCorrection,
                        &err,
                    )
                }
            }
        } else {
            let boosted = clamp_confidence(confidence * self.config.rule_boost);
            debug!(before = confidence, after = boosted, "Rule-based correction applied");
            Staged::clean(ExtractionResult::new(repaired, boosted))
        }
    }
}
