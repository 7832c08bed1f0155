// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lektor text: OCR repair rules, confidence-gated model correction, and
// formatting normalization.

pub mod correct;
pub mod normalize;
pub mod rules;

pub use correct::{NoopEnhancer, TextCorrector, TextEnhancer};
pub use normalize::{
    EntityRecognizer, GazetteerEntry, GazetteerRecognizer, NoEntityRecognizer, TextNormalizer,
    title_case,
};
pub use rules::{CorrectionRule, GlyphTable, OCR_REPAIR_RULES};
