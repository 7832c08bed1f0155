// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text normalization: spacing patterns, entity-aware re-casing, and
// paragraph fix-up.

use std::sync::{Arc, LazyLock};

use lektor_core::error::LektorError;
use lektor_core::{EntityKind, EntitySpan, Stage, Staged, is_blank};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::rules::CorrectionRule;

static SPACING_RULES: LazyLock<Vec<CorrectionRule>> = LazyLock::new(|| {
    [
        ("decimal-number", r"(\d+)\.(\d+)", "${1}.${2}"),
        ("comma-spacing", r"(\w+)\s+,\s+(\w+)", "${1}, ${2}"),
        ("period-spacing", r"(\w+)\s+\.\s+(\w+)", "${1}. ${2}"),
        ("collapse-spaces", r"\s{2,}", " "),
        ("split-camel-join", r"([a-z])([A-Z])", "${1} ${2}"),
    ]
    .into_iter()
    .map(|(name, pattern, replacement)| {
        CorrectionRule::new(name, pattern, replacement).expect("valid spacing rule")
    })
    .collect()
});

static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("valid newline regex"));

static BULLET_LEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[\s•-]*•").expect("valid bullet regex"));

/// Finds named-entity spans in text.
pub trait EntityRecognizer: Send + Sync {
    fn is_available(&self) -> bool;

    fn entities(&self, text: &str) -> Result<Vec<EntitySpan>, LektorError>;
}

/// No linguistic model: the entity pass is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEntityRecognizer;

impl EntityRecognizer for NoEntityRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn entities(&self, _text: &str) -> Result<Vec<EntitySpan>, LektorError> {
        Ok(Vec::new())
    }
}

/// A known name and its entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub name: String,
    pub kind: EntityKind,
}

/// Case-insensitive whole-word lookup over a fixed list of names.
///
/// Each hit is reported with the text exactly as it appears in the input, so
/// the re-casing pass can replace it literally.
#[derive(Debug, Clone)]
pub struct GazetteerRecognizer {
    entries: Vec<(Regex, EntityKind)>,
}

impl GazetteerRecognizer {
    pub fn new(entries: impl IntoIterator<Item = GazetteerEntry>) -> Result<Self, LektorError> {
        let entries = entries
            .into_iter()
            .filter(|entry| !is_blank(&entry.name))
            .map(|entry| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(entry.name.trim()));
                Regex::new(&pattern)
                    .map(|re| (re, entry.kind))
                    .map_err(|err| {
                        LektorError::Input(format!("invalid gazetteer entry {:?}: {err}", entry.name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Load entries from a JSON array of `{ "name": .., "kind": .. }`.
    pub fn from_json(raw: &str) -> Result<Self, LektorError> {
        let entries: Vec<GazetteerEntry> = serde_json::from_str(raw)?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityRecognizer for GazetteerRecognizer {
    fn is_available(&self) -> bool {
        !self.entries.is_empty()
    }

    fn entities(&self, text: &str) -> Result<Vec<EntitySpan>, LektorError> {
        Ok(self
            .entries
            .iter()
            .flat_map(|(pattern, kind)| {
                pattern
                    .find_iter(text)
                    .map(move |hit| EntitySpan::new(hit.as_str(), kind.clone()))
            })
            .collect())
    }
}

/// Upper-case the first character of each whitespace-separated token and
/// lower-case the rest.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formatting clean-up applied to every extraction.
#[derive(Clone)]
pub struct TextNormalizer {
    recognizer: Arc<dyn EntityRecognizer>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(NoEntityRecognizer))
    }
}

impl TextNormalizer {
    pub fn new(recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Spacing fixes, in order.
    pub fn fix_patterns(&self, text: &str) -> String {
        SPACING_RULES
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc).into_owned())
    }

    /// Title-case every proper-name entity the recognizer finds.
    ///
    /// Without an available recognizer this is the identity. A recognizer
    /// error hands the input back with the fault attached.
    pub fn recase_entities(&self, text: &str) -> Staged<String> {
        if !self.recognizer.is_available() {
            return Staged::clean(text.to_string());
        }
        match self.recognizer.entities(text) {
            Ok(spans) => {
                let recased = spans
                    .iter()
                    .filter(|span| span.kind.is_proper_name() && !is_blank(&span.text))
                    .fold(text.to_string(), |acc, span| {
                        acc.replace(&span.text, &title_case(&span.text))
                    });
                debug!(entities = spans.len(), "Entity re-casing applied");
                Staged::clean(recased)
            }
            Err(err) => {
                warn!(error = %err, "Entity recognition failed; skipping re-casing");
                Staged::fell_back(text.to_string(), Stage::EntityRecasing, &err)
            }
        }
    }

    /// Lone newlines become spaces, longer runs become one blank line, and
    /// whatever sits between a line start and a bullet marker is dropped.
    pub fn fix_paragraphs(&self, text: &str) -> String {
        let joined = NEWLINE_RUN.replace_all(text, |caps: &Captures| {
            if caps[0].len() == 1 { " " } else { "\n\n" }
        });
        BULLET_LEAD.replace_all(&joined, "\n•").into_owned()
    }

    /// Full normalization. Blank text passes through untouched.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub fn normalize(&self, text: &str) -> Staged<String> {
        if is_blank(text) {
            return Staged::clean(text.to_string());
        }
        let patterned = self.fix_patterns(text);
        self.recase_entities(&patterned)
            .map(|recased| self.fix_paragraphs(&recased))
    }
}
