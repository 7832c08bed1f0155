// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Lektor.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Lektor operations.
#[derive(Debug, Error)]
pub enum LektorError {
    // -- Input errors --
    #[error("invalid input document: {0}")]
    Input(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    // -- Stage errors --
    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("text enhancement failed: {0}")]
    Enhancement(String),

    #[error("deskew failed: {0}")]
    Geometry(String),

    #[error("linguistic analysis failed: {0}")]
    Linguistic(String),

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Scheduling --
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LektorError {
    /// Whether the pipeline may continue past this error with the stage's
    /// input unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Enhancement(_) | Self::Geometry(_) | Self::Linguistic(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LektorError>;
