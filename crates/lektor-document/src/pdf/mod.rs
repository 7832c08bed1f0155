// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: native text layers and page rasterization.

pub mod reader;

pub use reader::{EmbeddedImageRasterizer, PageRasterizer, PdfReader};
