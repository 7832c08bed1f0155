// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lektor-pipeline: Sequences page processing, recognition, correction, and
// normalization for whole documents, and runs many documents concurrently.

pub mod orchestrator;
pub mod pool;

pub use orchestrator::{DocumentSource, ExtractionReport, ExtractionRequest, Extractor};
pub use pool::{ExtractionPool, PoolResult, PoolStats};
