// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deterministic OCR repair rules: ordered regex rewrites and a glyph
// substitution table.

use std::borrow::Cow;
use std::sync::LazyLock;

use lektor_core::error::LektorError;
use regex::Regex;

/// One ordered rewrite. Later rules see the output of earlier ones.
#[derive(Debug, Clone)]
pub struct CorrectionRule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl CorrectionRule {
    /// Compile a rule. `replacement` uses `${n}` group references.
    pub fn new(
        name: &'static str,
        pattern: &str,
        replacement: &'static str,
    ) -> Result<Self, LektorError> {
        let pattern = Regex::new(pattern).map_err(|err| {
            LektorError::Input(format!("invalid correction rule {name}: {err}"))
        })?;
        Ok(Self {
            name,
            pattern,
            replacement,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.pattern.replace_all(text, self.replacement)
    }
}

fn rule(name: &'static str, pattern: &str, replacement: &'static str) -> CorrectionRule {
    CorrectionRule::new(name, pattern, replacement).expect("valid built-in correction rule")
}

/// The built-in OCR repair passes, in application order.
pub static OCR_REPAIR_RULES: LazyLock<Vec<CorrectionRule>> = LazyLock::new(|| {
    vec![
        rule("digit-letter", r"([0-9])([A-Za-z])", "${1} ${2}"),
        rule("letter-digit", r"([A-Za-z])([0-9])", "${1} ${2}"),
        rule("lowercase-l-as-I", r"l([^a-z])", "I${1}"),
        rule("joined-sentences", r"(\w)\.(\w)", "${1}. ${2}"),
        rule("collapse-whitespace", r"\s{2,}", " "),
    ]
});

/// Run `rules` over `text` in order.
pub fn apply_rules(rules: &[CorrectionRule], text: &str) -> String {
    rules
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc).into_owned())
}

/// Substitutions for visually confusable glyphs and mis-decoded sequences.
///
/// Keys may span several characters (`Â´` is a UTF-8 acute accent read as
/// Latin-1). The table keeps identity entries (`O→O`, `l→l`, ...) as written;
/// they are skipped when applied, so only real substitutions change the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphTable {
    entries: Vec<(&'static str, &'static str)>,
}

impl Default for GlyphTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl GlyphTable {
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("0", "O"),
                ("O", "O"),
                ("l", "l"),
                ("I", "I"),
                (";", ";"),
                ("`", "'"),
                ("\u{00C2}\u{00B4}", "'"),
            ],
        }
    }

    pub fn entries(&self) -> &[(&'static str, &'static str)] {
        &self.entries
    }

    /// Entries that actually change text.
    pub fn substitutions(&self) -> impl Iterator<Item = &(&'static str, &'static str)> {
        self.entries.iter().filter(|(from, to)| from != to)
    }

    pub fn apply(&self, text: &str) -> String {
        self.substitutions()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_run_in_order() {
        let names: Vec<&str> = OCR_REPAIR_RULES.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            [
                "digit-letter",
                "letter-digit",
                "lowercase-l-as-I",
                "joined-sentences",
                "collapse-whitespace"
            ]
        );
    }

    #[test]
    fn repairs_stuck_tokens() {
        assert_eq!(apply_rules(&OCR_REPAIR_RULES, "l5Hello.World"), "I 5 Hello. World");
        assert_eq!(apply_rules(&OCR_REPAIR_RULES, "page12of30"), "page 12 of 30");
        assert_eq!(apply_rules(&OCR_REPAIR_RULES, "too    many  spaces"), "too many spaces");
    }

    #[test]
    fn lowercase_l_before_non_lowercase_becomes_capital_i() {
        assert_eq!(apply_rules(&OCR_REPAIR_RULES, "l am"), "I am");
        // Followed by a lowercase letter it stays.
        assert_eq!(apply_rules(&OCR_REPAIR_RULES, "hello"), "hello");
    }

    #[test]
    fn repeated_runs_are_deterministic() {
        let first = apply_rules(&OCR_REPAIR_RULES, "l5Hello.World");
        for _ in 0..10 {
            assert_eq!(apply_rules(&OCR_REPAIR_RULES, "l5Hello.World"), first);
        }
    }

    #[test]
    fn custom_rule_rejects_bad_pattern() {
        assert!(CorrectionRule::new("broken", "([a-z", "").is_err());
    }

    #[test]
    fn glyph_table_keeps_identity_entries_but_skips_them() {
        let table = GlyphTable::standard();
        assert_eq!(table.entries().len(), 7);
        assert_eq!(table.substitutions().count(), 3);
        assert_eq!(table.apply("It`s 2020"), "It's 2O2O");
        assert_eq!(table.apply("l I ; O"), "l I ; O");
    }

    #[test]
    fn mis_decoded_apostrophe_is_replaced_as_a_pair() {
        let table = GlyphTable::standard();
        assert_eq!(table.apply("It\u{00C2}\u{00B4}s"), "It's");
        assert_eq!(table.apply("caf\u{00E9} \u{00B4}"), "caf\u{00E9} \u{00B4}");
        assert_eq!(table.apply("\u{00C2} alone"), "\u{00C2} alone");
    }
}
