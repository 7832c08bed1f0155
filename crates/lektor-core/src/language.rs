// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mapping from ISO 639-1 language hints to recognition-engine language codes.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Engine language used for `auto` and for any code the table lacks.
pub const DEFAULT_RECOGNITION_LANGUAGE: &str = "eng";

/// How a hint was turned into an engine code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// The hint is in the table.
    Mapped,
    /// The caller asked for detection; the default is used.
    Auto,
    /// The hint is not in the table; the default is used.
    Unmapped,
}

/// Engine language code selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionLanguage {
    pub code: &'static str,
    pub resolution: Resolution,
}

impl RecognitionLanguage {
    /// Resolve an ISO 639-1 hint (case-insensitive) or `"auto"`.
    pub fn resolve(hint: &str) -> Self {
        let normalised = hint.trim().to_ascii_lowercase();
        if normalised.is_empty() || normalised == "auto" {
            return Self {
                code: DEFAULT_RECOGNITION_LANGUAGE,
                resolution: Resolution::Auto,
            };
        }

        match engine_code(&normalised) {
            Some(code) => Self {
                code,
                resolution: Resolution::Mapped,
            },
            None => {
                warn!(
                    hint = normalised.as_str(),
                    fallback = DEFAULT_RECOGNITION_LANGUAGE,
                    "No recognition language for hint; using default"
                );
                Self {
                    code: DEFAULT_RECOGNITION_LANGUAGE,
                    resolution: Resolution::Unmapped,
                }
            }
        }
    }
}

/// The explicit table. Returns `None` for codes outside it.
fn engine_code(iso: &str) -> Option<&'static str> {
    let code = match iso {
        "en" => "eng",
        "es" => "spa",
        "fr" => "fra",
        "de" => "deu",
        "it" => "ita",
        "pt" => "por",
        "nl" => "nld",
        "ru" => "rus",
        "zh" => "chi_sim+chi_tra",
        "ja" => "jpn",
        "ko" => "kor",
        "ar" => "ara",
        "hi" => "hin",
        "bn" => "ben",
        "pa" => "pan",
        "te" => "tel",
        "ta" => "tam",
        "ur" => "urd",
        "fa" => "fas",
        "tr" => "tur",
        "pl" => "pol",
        "uk" => "ukr",
        "vi" => "vie",
        "th" => "tha",
        "id" => "ind",
        _ => return None,
    };
    Some(code)
}

/// ISO 639-1 codes accepted as hints, plus `auto`.
pub const SUPPORTED_HINTS: &[&str] = &[
    "auto", "en", "es", "fr", "de", "it", "pt", "nl", "ru", "zh", "ja", "ko", "ar", "hi", "bn",
    "pa", "te", "ta", "ur", "fa", "tr", "pl", "uk", "vi", "th", "id",
];
