// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lektor: Core types, configuration, and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod language;
pub mod types;

pub use config::ExtractionConfig;
pub use error::LektorError;
pub use language::RecognitionLanguage;
pub use types::*;
